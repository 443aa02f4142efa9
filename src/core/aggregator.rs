use crate::core::executor::{ExecutionMode, ExecutionOutput};
use crate::error::{EngineError, EngineResult};
use crate::infra::utils::json_to_decimal;
use crate::models::aggregate::{AggregateRequest, AggregateResult, Metric};
use crate::models::context::Row;
use crate::models::schema::TableSchema;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;

pub const NULL_GROUP: &str = "(null)";

/// 已按 schema 解析好字段的聚合计划
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    request: AggregateRequest,
    sum_field: Option<String>,
    group_field: Option<String>,
}

impl AggregatePlan {
    pub fn new(request: &AggregateRequest, schema: &TableSchema) -> EngineResult<Self> {
        let resolve = |column: &str| {
            schema
                .field_for(column)
                .map(str::to_string)
                .ok_or_else(|| EngineError::SchemaMismatch {
                    table: schema.table.clone(),
                    field: column.to_string(),
                })
        };
        let sum_field = match &request.metric {
            Metric::Sum { field } => Some(resolve(field.as_str())?),
            Metric::Count => None,
        };
        let group_field = request.group_by.as_deref().map(resolve).transpose()?;
        Ok(Self {
            request: request.clone(),
            sum_field,
            group_field,
        })
    }

    /// 不分组的 COUNT 走服务端计数，其余拉取所需列在本地归约
    pub fn mode(&self) -> ExecutionMode {
        if self.sum_field.is_none() && self.group_field.is_none() {
            return ExecutionMode::Count;
        }
        let columns = self
            .sum_field
            .iter()
            .chain(self.group_field.iter())
            .cloned()
            .collect();
        ExecutionMode::Rows {
            columns: Some(columns),
        }
    }

    pub fn reduce(&self, output: ExecutionOutput) -> EngineResult<AggregateResult> {
        match output {
            ExecutionOutput::Count(n) => Ok(AggregateResult {
                metric: self.request.metric.clone(),
                total: Decimal::from(n),
                groups: None,
            }),
            ExecutionOutput::Rows(rows) => self.reduce_rows(&rows),
        }
    }

    fn reduce_rows(&self, rows: &[Row]) -> EngineResult<AggregateResult> {
        let mut total = Decimal::ZERO;
        let mut groups: BTreeMap<String, Decimal> = BTreeMap::new();

        for row in rows {
            let value = match &self.sum_field {
                None => Decimal::ONE,
                Some(field) => match row.get(field) {
                    // SUM 忽略 NULL
                    None | Some(Value::Null) => Decimal::ZERO,
                    Some(v) => json_to_decimal(v).ok_or_else(|| EngineError::Aggregate {
                        field: field.clone(),
                        message: format!("non-numeric value {v}"),
                    })?,
                },
            };
            total = checked(total, value, self.sum_field.as_deref())?;

            if let Some(group_field) = &self.group_field {
                let key = group_key(row.get(group_field));
                let slot = groups.entry(key).or_insert(Decimal::ZERO);
                *slot = checked(*slot, value, Some(group_field.as_str()))?;
            }
        }

        Ok(AggregateResult {
            metric: self.request.metric.clone(),
            total,
            groups: self.group_field.as_ref().map(|_| groups),
        })
    }
}

fn checked(acc: Decimal, value: Decimal, field: Option<&str>) -> EngineResult<Decimal> {
    acc.checked_add(value).ok_or_else(|| EngineError::Aggregate {
        field: field.unwrap_or("*").to_string(),
        message: "decimal overflow".to_string(),
    })
}

fn group_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NULL_GROUP.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
