use crate::error::ClientError;
use crate::models::context::Row;
use crate::models::filter::{FilterOperation, FilterValue};
use async_trait::async_trait;

/// 外部数据访问客户端：只暴露链式过滤接口，不接受原始 SQL
pub trait DataAccessClient: Send + Sync {
    fn from_table(&self, table: &str) -> Box<dyn FilterBuilder>;
}

/// 链式过滤构建器，每个 FilterOperation 对应一次调用，最后以 rows / count 结束
#[async_trait]
pub trait FilterBuilder: Send {
    fn gte(&mut self, field: &str, value: &FilterValue);
    fn lt(&mut self, field: &str, value: &FilterValue);
    fn like(&mut self, field: &str, pattern: &str);
    fn not_like(&mut self, field: &str, pattern: &str);
    fn ilike(&mut self, field: &str, value: &str);
    fn eq(&mut self, field: &str, value: &FilterValue);
    fn is_null(&mut self, field: &str);
    /// 一个完整的析取条件，不会被拆成多个 AND
    fn or(&mut self, clauses: &[FilterOperation]);

    /// columns 为 None 时返回全部列
    async fn rows(self: Box<Self>, columns: Option<Vec<String>>) -> Result<Vec<Row>, ClientError>;
    /// 服务端计数，不传输行数据
    async fn count(self: Box<Self>) -> Result<u64, ClientError>;
}
