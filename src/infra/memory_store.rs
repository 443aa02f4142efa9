use crate::error::ClientError;
use crate::infra::data_client::{DataAccessClient, FilterBuilder};
use crate::infra::utils::{json_to_decimal, parse_timestamp};
use crate::models::context::Row;
use crate::models::filter::{FilterOperation, FilterValue, Operator};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 内存数据源：按 SQL 的 NULL 语义在 JSON 行上求值过滤条件。
/// 用于测试夹具与本地演示 (FIXTURE_PATH)。
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<HashMap<String, Vec<Row>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl InMemoryStore {
    pub fn new(tables: HashMap<String, Vec<Row>>) -> Self {
        Self {
            tables: Arc::new(tables),
            calls: Arc::default(),
        }
    }

    /// 夹具文件格式: { "<table>": [ { 列: 值, ... }, ... ] }
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let tables: HashMap<String, Vec<Row>> = serde_json::from_str(&text)?;
        Ok(Self::new(tables))
    }

    /// 构建器收到的调用记录，按顺序，形如 "gte:generate_time"
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DataAccessClient for InMemoryStore {
    fn from_table(&self, table: &str) -> Box<dyn FilterBuilder> {
        Box::new(MemoryFilterBuilder {
            store: self.clone(),
            table: table.to_string(),
            ops: Vec::new(),
        })
    }
}

struct MemoryFilterBuilder {
    store: InMemoryStore,
    table: String,
    ops: Vec<FilterOperation>,
}

impl MemoryFilterBuilder {
    fn record(&mut self, op: FilterOperation) {
        if let Ok(mut calls) = self.store.calls.lock() {
            calls.push(format!("{}:{}", call_name(op.operator), op.field));
        }
        self.ops.push(op);
    }

    fn matching_rows(&self) -> Result<Vec<&Row>, ClientError> {
        let rows = self
            .store
            .tables
            .get(&self.table)
            .ok_or_else(|| ClientError::UnknownTable(self.table.clone()))?;
        let checks = self
            .ops
            .iter()
            .map(Check::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let matched: Vec<&Row> = rows
            .iter()
            .filter(|row| checks.iter().all(|c| c.eval(row)))
            .collect();
        debug!("内存数据源 {} 命中 {}/{} 行", self.table, matched.len(), rows.len());
        Ok(matched)
    }
}

fn call_name(op: Operator) -> &'static str {
    match op {
        Operator::Gte => "gte",
        Operator::Lt => "lt",
        Operator::Like => "like",
        Operator::NotLike => "not_like",
        Operator::Ilike => "ilike",
        Operator::Eq => "eq",
        Operator::IsNull => "is_null",
        Operator::Or => "or",
    }
}

#[async_trait]
impl FilterBuilder for MemoryFilterBuilder {
    fn gte(&mut self, field: &str, value: &FilterValue) {
        self.record(FilterOperation {
            field: field.to_string(),
            operator: Operator::Gte,
            value: value.clone(),
        });
    }

    fn lt(&mut self, field: &str, value: &FilterValue) {
        self.record(FilterOperation {
            field: field.to_string(),
            operator: Operator::Lt,
            value: value.clone(),
        });
    }

    fn like(&mut self, field: &str, pattern: &str) {
        self.record(FilterOperation::like(field, pattern));
    }

    fn not_like(&mut self, field: &str, pattern: &str) {
        self.record(FilterOperation::not_like(field, pattern));
    }

    fn ilike(&mut self, field: &str, value: &str) {
        self.record(FilterOperation::ilike(field, value));
    }

    fn eq(&mut self, field: &str, value: &FilterValue) {
        self.record(FilterOperation::eq(field, value.clone()));
    }

    fn is_null(&mut self, field: &str) {
        self.record(FilterOperation::is_null(field));
    }

    fn or(&mut self, clauses: &[FilterOperation]) {
        let field = clauses.first().map(|c| c.field.as_str()).unwrap_or_default();
        self.record(FilterOperation::or(field, clauses.to_vec()));
    }

    async fn rows(self: Box<Self>, columns: Option<Vec<String>>) -> Result<Vec<Row>, ClientError> {
        let matched = self.matching_rows()?;
        Ok(matched
            .into_iter()
            .map(|row| match &columns {
                Some(cols) => row
                    .iter()
                    .filter(|(k, _)| cols.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => row.clone(),
            })
            .collect())
    }

    async fn count(self: Box<Self>) -> Result<u64, ClientError> {
        Ok(self.matching_rows()?.len() as u64)
    }
}

/// 预编译的过滤条件
enum Check {
    Compare {
        field: String,
        value: FilterValue,
        accept: fn(Ordering) -> bool,
    },
    Pattern {
        field: String,
        regex: Regex,
        negate: bool,
    },
    IsNull {
        field: String,
    },
    Any(Vec<Check>),
}

impl Check {
    fn compile(op: &FilterOperation) -> Result<Self, ClientError> {
        let field = op.field.clone();
        let text = |value: &FilterValue| match value {
            FilterValue::Text(s) => Ok(s.clone()),
            other => Err(ClientError::UnsupportedFilter {
                field: op.field.clone(),
                message: format!("pattern must be text, got {other:?}"),
            }),
        };
        Ok(match op.operator {
            Operator::Gte => Check::Compare {
                field,
                value: op.value.clone(),
                accept: |o| o != Ordering::Less,
            },
            Operator::Lt => Check::Compare {
                field,
                value: op.value.clone(),
                accept: |o| o == Ordering::Less,
            },
            Operator::Eq => Check::Compare {
                field,
                value: op.value.clone(),
                accept: |o| o == Ordering::Equal,
            },
            Operator::Like | Operator::NotLike | Operator::Ilike => Check::Pattern {
                regex: like_regex(&text(&op.value)?, op.operator == Operator::Ilike).map_err(|e| {
                    ClientError::UnsupportedFilter {
                        field: field.clone(),
                        message: e.to_string(),
                    }
                })?,
                negate: op.operator == Operator::NotLike,
                field,
            },
            Operator::IsNull => Check::IsNull { field },
            Operator::Or => match &op.value {
                FilterValue::Any(clauses) => {
                    Check::Any(clauses.iter().map(Check::compile).collect::<Result<_, _>>()?)
                }
                other => {
                    return Err(ClientError::UnsupportedFilter {
                        field,
                        message: format!("OR requires nested clauses, got {other:?}"),
                    })
                }
            },
        })
    }

    fn eval(&self, row: &Row) -> bool {
        let get = |field: &str| row.get(field).filter(|v| !v.is_null());
        match self {
            Check::Compare { field, value, accept } => get(field)
                .and_then(|v| compare(v, value))
                .map(accept)
                .unwrap_or(false),
            Check::Pattern { field, regex, negate } => match get(field) {
                // NULL 既不 LIKE 也不 NOT LIKE
                None => false,
                Some(v) => regex.is_match(&json_text(v)) != *negate,
            },
            Check::IsNull { field } => get(field).is_none(),
            Check::Any(checks) => checks.iter().any(|c| c.eval(row)),
        }
    }
}

fn json_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(left: &Value, right: &FilterValue) -> Option<Ordering> {
    match right {
        FilterValue::Timestamp(t) => parse_timestamp(left.as_str()?).map(|l| l.cmp(t)),
        FilterValue::Text(s) => Some(json_text(left).as_str().cmp(s.as_str())),
        FilterValue::Integer(n) => json_to_decimal(left).map(|l| l.cmp(&(*n).into())),
        FilterValue::Decimal(d) => json_to_decimal(left).map(|l| l.cmp(d)),
        FilterValue::Null | FilterValue::Any(_) => None,
    }
}

/// LIKE 模式转正则：% -> .*，_ -> .，反斜杠转义下一个字符
fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut re = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}
