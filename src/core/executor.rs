use crate::error::{ClientError, EngineError, EngineResult};
use crate::infra::data_client::{DataAccessClient, FilterBuilder};
use crate::models::context::Row;
use crate::models::filter::{FilterOperation, FilterPipeline, FilterValue, Operator};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Rows { columns: Option<Vec<String>> },
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutput {
    Rows(Vec<Row>),
    Count(u64),
}

/// 把过滤管线交给数据访问层执行。只读，无重试；超时视为执行失败。
pub struct QueryExecutor<'a> {
    client: &'a dyn DataAccessClient,
    timeout: Duration,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(client: &'a dyn DataAccessClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    #[instrument(skip(self, pipeline), fields(table = %pipeline.table(), ops = pipeline.len()))]
    pub async fn execute(&self, pipeline: FilterPipeline, mode: ExecutionMode) -> EngineResult<ExecutionOutput> {
        let (table, operations) = pipeline.into_parts();
        let mut builder = self.client.from_table(&table);
        for op in &operations {
            if let Err(e) = apply(builder.as_mut(), op) {
                warn!("过滤操作无法下发: {}", e);
                return Err(EngineError::Execution(e));
            }
        }

        let fut = async move {
            match mode {
                ExecutionMode::Rows { columns } => builder.rows(columns).await.map(ExecutionOutput::Rows),
                ExecutionMode::Count => builder.count().await.map(ExecutionOutput::Count),
            }
        };

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(output)) => {
                debug!("查询执行完成: {:?}", summary(&output));
                Ok(output)
            }
            Ok(Err(e)) => {
                warn!("查询执行失败: {}", e);
                Err(EngineError::Execution(e))
            }
            Err(_) => {
                warn!("查询超时: {:?}", self.timeout);
                Err(EngineError::Timeout(self.timeout))
            }
        }
    }
}

/// 每个操作恰好一次调用；OR 作为整体析取传入
fn apply(builder: &mut dyn FilterBuilder, op: &FilterOperation) -> Result<(), ClientError> {
    let text = || match &op.value {
        FilterValue::Text(s) => s.as_str(),
        _ => "",
    };
    match op.operator {
        Operator::Gte => builder.gte(&op.field, &op.value),
        Operator::Lt => builder.lt(&op.field, &op.value),
        Operator::Like => builder.like(&op.field, text()),
        Operator::NotLike => builder.not_like(&op.field, text()),
        Operator::Ilike => builder.ilike(&op.field, text()),
        Operator::Eq => builder.eq(&op.field, &op.value),
        Operator::IsNull => builder.is_null(&op.field),
        Operator::Or => match &op.value {
            FilterValue::Any(clauses) if !clauses.is_empty() => builder.or(clauses),
            _ => {
                return Err(ClientError::UnsupportedFilter {
                    field: op.field.clone(),
                    message: "OR requires at least one nested clause".to_string(),
                })
            }
        },
    }
    Ok(())
}

fn summary(output: &ExecutionOutput) -> String {
    match output {
        ExecutionOutput::Rows(rows) => format!("{} rows", rows.len()),
        ExecutionOutput::Count(n) => format!("count={n}"),
    }
}
