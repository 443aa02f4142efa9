use rust_decimal::Decimal;
use serde::Serialize;

/// 从 WHERE 子句顶层 AND 切分出的一个原子条件，原文保留
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCondition(String);

impl RawCondition {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RawCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 条件分类结果。列名一律为小写的逻辑列名，尚未经过 schema 映射。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifiedPredicate {
    DateEquals {
        field: String,
        offset_days: i64,
    },
    /// start_offset_days >= end_offset_days，窗口从较早的一天覆盖到较晚的一天
    DateRange {
        field: String,
        start_offset_days: i64,
        end_offset_days: i64,
    },
    /// 本周 (周一起) 或本月第一天至今天结束
    DatePeriodToDate {
        field: String,
        period: CalendarPeriod,
    },
    PatternExclude {
        field: String,
        pattern: String,
    },
    PatternInclude {
        field: String,
        pattern: String,
    },
    CaseInsensitiveEquals {
        field: String,
        value: String,
    },
    Equals {
        field: String,
        value: EqualsValue,
    },
    Unrecognized {
        raw_text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarPeriod {
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EqualsValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
}

impl ClassifiedPredicate {
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, ClassifiedPredicate::Unrecognized { .. })
    }
}
