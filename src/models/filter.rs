use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Gte,
    Lt,
    Like,
    NotLike,
    Ilike,
    Eq,
    IsNull,
    Or,
}

/// 过滤值。`Any` 只出现在 `Operator::Or` 上，承载析取的子操作。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    Any(Vec<FilterOperation>),
}

/// 与存储无关的原子过滤单元 (field, operator, value)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FilterOperation {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl FilterOperation {
    fn new(field: &str, operator: Operator, value: FilterValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    pub fn gte(field: &str, at: DateTime<Utc>) -> Self {
        Self::new(field, Operator::Gte, FilterValue::Timestamp(at))
    }

    pub fn lt(field: &str, at: DateTime<Utc>) -> Self {
        Self::new(field, Operator::Lt, FilterValue::Timestamp(at))
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Self::new(field, Operator::Like, FilterValue::Text(pattern.to_string()))
    }

    pub fn not_like(field: &str, pattern: &str) -> Self {
        Self::new(field, Operator::NotLike, FilterValue::Text(pattern.to_string()))
    }

    pub fn ilike(field: &str, value: &str) -> Self {
        Self::new(field, Operator::Ilike, FilterValue::Text(value.to_string()))
    }

    pub fn eq(field: &str, value: FilterValue) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn is_null(field: &str) -> Self {
        Self::new(field, Operator::IsNull, FilterValue::Null)
    }

    /// 析取：子操作整体作为一个条件交给数据访问层，不能拆成多次调用
    pub fn or(field: &str, clauses: Vec<FilterOperation>) -> Self {
        Self::new(field, Operator::Or, FilterValue::Any(clauses))
    }

    /// 本操作 (含嵌套子操作) 引用到的所有字段
    pub fn fields(&self) -> Vec<&str> {
        match &self.value {
            FilterValue::Any(clauses) => clauses.iter().flat_map(|c| c.fields()).collect(),
            _ => vec![self.field.as_str()],
        }
    }
}

/// 单次提问的过滤管线：只追加，交给执行器消费一次后丢弃
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPipeline {
    table: String,
    operations: Vec<FilterOperation>,
}

impl FilterPipeline {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            operations: Vec::new(),
        }
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = FilterOperation>) {
        self.operations.extend(ops);
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn operations(&self) -> &[FilterOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<FilterOperation>) {
        (self.table, self.operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_collects_nested_fields() {
        let op = FilterOperation::or(
            "plt_remark",
            vec![
                FilterOperation::is_null("plt_remark"),
                FilterOperation::not_like("plt_remark", "%Material GRN%"),
            ],
        );
        assert_eq!(op.operator, Operator::Or);
        assert_eq!(op.fields(), vec!["plt_remark", "plt_remark"]);
    }

    #[test]
    fn pipeline_is_append_only_and_ordered() {
        let mut pipeline = FilterPipeline::new("record_palletinfo");
        assert!(pipeline.is_empty());
        pipeline.extend([FilterOperation::like("plt_remark", "%GRN%")]);
        pipeline.extend([FilterOperation::ilike("product_code", "mep9090150")]);
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.operations()[0].operator, Operator::Like);
        assert_eq!(pipeline.operations()[1].operator, Operator::Ilike);
        assert_eq!(pipeline.table(), "record_palletinfo");
    }

    #[test]
    fn operator_serializes_in_wire_form() {
        let json = serde_json::to_string(&Operator::NotLike).unwrap();
        assert_eq!(json, "\"NOT_LIKE\"");
    }
}
