use crate::models::aggregate::{AggregateRequest, AggregateResult, ConsistencyOutcome, Relation};
use crate::models::filter::FilterOperation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 数据访问层返回的一行数据
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub where_clause: String, // 上游模型生成的 WHERE 子句
    pub target_table: String,
    #[serde(default)]
    pub aggregate: Option<AggregateRequest>,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub unrecognized_conditions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyOutcome>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMeta {
    pub table: String,
    pub operations: Vec<FilterOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateResult>,
    pub diagnostics: Diagnostics,
    pub meta: AnswerMeta,
}

/// 同一轮对话的多个提问及其一致性校验
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub questions: Vec<AskRequest>,
    #[serde(default)]
    pub checks: Vec<Relation>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub answers: Vec<AskResponse>,
    pub consistency: Vec<ConsistencyOutcome>,
}
