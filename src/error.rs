use thiserror::Error;

/// 数据访问层 (Postgres / 内存夹具) 返回的错误
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown table at transport layer: {0}")]
    UnknownTable(String),

    #[error("unsupported filter on field {field}: {message}")]
    UnsupportedFilter { field: String, message: String },
}

/// 日期偏移超出允许范围，拒绝而不是截断
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("date offset {offset} days is outside the allowed range 0..={max}")]
pub struct RangeError {
    pub offset: i64,
    pub max: i64,
}

/// 单个提问的致命错误。条件分类问题不在此列，只记入 diagnostics。
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown target table: {0}")]
    UnknownTable(String),

    #[error("field {field} is not mapped for table {table}")]
    SchemaMismatch { table: String, field: String },

    #[error("query execution failed: {0}")]
    Execution(#[from] ClientError),

    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cannot aggregate field {field}: {message}")]
    Aggregate { field: String, message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
