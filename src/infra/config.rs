use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 数据源后端
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Postgres { database_url: String, max_connections: u32 },
    Fixture { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub schema_path: Option<PathBuf>,
    pub timezone: Tz,
    pub max_offset_days: i64,
    pub query_timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl Settings {
    /// 从进程环境读取 (main 中已先加载 .env)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let backend = match get("FIXTURE_PATH") {
            Some(path) => Backend::Fixture { path: PathBuf::from(path) },
            None => Backend::Postgres {
                database_url: get("DATABASE_URL")
                    .ok_or_else(|| anyhow!("DATABASE_URL must be set (or FIXTURE_PATH)"))?,
                max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 5)?,
            },
        };

        let timezone = match get("WAREHOUSE_TZ") {
            Some(name) => Tz::from_str(name.trim())
                .map_err(|e| anyhow!("invalid WAREHOUSE_TZ {name:?}: {e}"))?,
            None => chrono_tz::Europe::London,
        };

        let max_offset_days: i64 = parse_or(get("MAX_OFFSET_DAYS"), "MAX_OFFSET_DAYS", 365)?;
        if max_offset_days < 0 {
            return Err(anyhow!("MAX_OFFSET_DAYS must not be negative"));
        }

        let timeout_secs: u64 = parse_or(get("QUERY_TIMEOUT_SECS"), "QUERY_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(anyhow!("QUERY_TIMEOUT_SECS must be positive"));
        }

        Ok(Self {
            backend,
            schema_path: get("SCHEMA_PATH").map(PathBuf::from),
            timezone,
            max_offset_days,
            query_timeout: Duration::from_secs(timeout_secs),
            bind_addr: parse_or(get("BIND_ADDR"), "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {key}: {v:?}")),
        None => Ok(default),
    }
}
