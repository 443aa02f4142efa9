use crate::core::date_window::{DateWindow, DateWindowResolver};
use crate::error::RangeError;
use crate::models::filter::{FilterOperation, FilterValue};
use crate::models::predicate::{ClassifiedPredicate, EqualsValue};
use crate::models::schema::TableSchema;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// 条件被降级 (不产生任何过滤) 的原因
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    #[error("condition does not match any known shape")]
    Unrecognized,

    #[error("column {column} is not mapped for this table")]
    SchemaMismatch { column: String },

    #[error(transparent)]
    OffsetOutOfRange(#[from] RangeError),
}

/// 一次翻译共享的上下文：当前时刻只在创建时读取一次
pub struct Translator<'a> {
    resolver: &'a DateWindowResolver,
    now: DateTime<Utc>,
}

impl<'a> Translator<'a> {
    pub fn new(resolver: &'a DateWindowResolver, now: DateTime<Utc>) -> Self {
        Self { resolver, now }
    }

    pub fn translate(
        &self,
        predicate: &ClassifiedPredicate,
        schema: &TableSchema,
    ) -> Result<Vec<FilterOperation>, DegradeReason> {
        let field = |column: &String| field_of(schema, column);

        let ops = match predicate {
            ClassifiedPredicate::DateEquals { field: col, offset_days } => {
                let f = field(col)?;
                let window = self.resolver.resolve(*offset_days, self.now)?;
                window_ops(&f, window)
            }
            ClassifiedPredicate::DateRange {
                field: col,
                start_offset_days,
                end_offset_days,
            } => {
                let f = field(col)?;
                let window =
                    self.resolver
                        .resolve_span(*start_offset_days, *end_offset_days, self.now)?;
                window_ops(&f, window)
            }
            ClassifiedPredicate::DatePeriodToDate { field: col, period } => {
                let f = field(col)?;
                let window = self.resolver.resolve_period_to_date(*period, self.now)?;
                window_ops(&f, window)
            }
            ClassifiedPredicate::PatternExclude { field: col, pattern } => {
                let f = field(col)?;
                // 必须是一个 OR 操作；拆成两个 AND 条件语义完全不同
                vec![FilterOperation::or(
                    &f,
                    vec![
                        FilterOperation::is_null(&f),
                        FilterOperation::not_like(&f, pattern),
                    ],
                )]
            }
            ClassifiedPredicate::PatternInclude { field: col, pattern } => {
                vec![FilterOperation::like(&field(col)?, pattern)]
            }
            ClassifiedPredicate::CaseInsensitiveEquals { field: col, value } => {
                // 精确匹配，不加通配符
                vec![FilterOperation::ilike(&field(col)?, &escape_like(value))]
            }
            ClassifiedPredicate::Equals { field: col, value } => {
                let v = match value {
                    EqualsValue::Text(s) => FilterValue::Text(s.clone()),
                    EqualsValue::Integer(n) => FilterValue::Integer(*n),
                    EqualsValue::Decimal(d) => FilterValue::Decimal(*d),
                };
                vec![FilterOperation::eq(&field(col)?, v)]
            }
            ClassifiedPredicate::Unrecognized { .. } => return Err(DegradeReason::Unrecognized),
        };
        Ok(ops)
    }
}

fn field_of(schema: &TableSchema, column: &str) -> Result<String, DegradeReason> {
    schema
        .field_for(column)
        .map(str::to_string)
        .ok_or_else(|| DegradeReason::SchemaMismatch {
            column: column.to_string(),
        })
}

fn window_ops(field: &str, window: DateWindow) -> Vec<FilterOperation> {
    vec![
        FilterOperation::gte(field, window.start),
        FilterOperation::lt(field, window.end),
    ]
}

/// ILIKE 值里出现的 % _ \ 需转义，才能保证是整值匹配
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
