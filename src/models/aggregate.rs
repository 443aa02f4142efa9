use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    Count,
    Sum { field: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub metric: Metric,
    #[serde(default)]
    pub group_by: Option<String>,
}

impl AggregateRequest {
    pub fn count() -> Self {
        Self {
            metric: Metric::Count,
            group_by: None,
        }
    }

    pub fn sum(field: &str) -> Self {
        Self {
            metric: Metric::Sum {
                field: field.to_string(),
            },
            group_by: None,
        }
    }

    pub fn grouped_by(mut self, field: &str) -> Self {
        self.group_by = Some(field.to_string());
        self
    }
}

/// 聚合结果：total 恒等于各分组之和
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub metric: Metric,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, Decimal>>,
}

/// 同一轮对话中，按问题下标引用的结果之间的关系
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "relation", rename_all = "camelCase")]
pub enum Relation {
    /// whole = Σ parts
    #[serde(rename_all = "camelCase")]
    SumOfParts { whole: usize, parts: Vec<usize> },
    /// larger >= smaller
    #[serde(rename_all = "camelCase")]
    AtLeast { larger: usize, smaller: usize },
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConsistencyOutcome {
    Consistent,
    Violated { detail: String },
}

impl ConsistencyOutcome {
    pub fn is_consistent(&self) -> bool {
        matches!(self, ConsistencyOutcome::Consistent)
    }
}
