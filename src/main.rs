mod api;
mod core;
mod error;
mod infra;
mod models;

use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::ask::{ask_database, ask_database_turn};
use crate::api::schema::list_schemas;
use crate::core::date_window::DateWindowResolver;
use crate::core::engine::AskEngine;
use crate::infra::config::{Backend, Settings};
use crate::infra::data_client::DataAccessClient;
use crate::infra::db_external::{self, PostgresClient};
use crate::infra::memory_store::InMemoryStore;
use crate::models::schema::SchemaRegistry;

pub mod ax_state {
    use crate::core::engine::AskEngine;
    pub struct AppState {
        pub engine: AskEngine,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    let client: Arc<dyn DataAccessClient> = match &settings.backend {
        Backend::Postgres { database_url, max_connections } => {
            let pool = db_external::connect(database_url, *max_connections).await?;
            info!("已连接仓库 Postgres 数据源");
            Arc::new(PostgresClient::new(pool))
        }
        Backend::Fixture { path } => {
            info!("使用内存夹具数据源: {}", path.display());
            Arc::new(InMemoryStore::from_json_file(path)?)
        }
    };

    let schemas = match &settings.schema_path {
        Some(path) => SchemaRegistry::from_json_file(path)?,
        None => SchemaRegistry::warehouse(),
    };

    let engine = AskEngine::new(
        client,
        Arc::new(schemas),
        DateWindowResolver::new(settings.timezone, settings.max_offset_days),
        settings.query_timeout,
    );
    let state = Arc::new(ax_state::AppState { engine });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/api/ask-database", post(ask_database))
        .route("/api/ask-database/turn", post(ask_database_turn))
        .route("/api/schemas", get(list_schemas))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!(
        "Ask Database 服务运行在 http://{} (时区 {}, 超时 {:?})",
        settings.bind_addr, settings.timezone, settings.query_timeout
    );
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
