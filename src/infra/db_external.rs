use crate::error::ClientError;
use crate::infra::data_client::{DataAccessClient, FilterBuilder};
use crate::infra::utils::pg_row_to_json;
use crate::models::context::Row;
use crate::models::filter::{FilterOperation, FilterValue, Operator};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row as _};
use tracing::debug;

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 仓库 Postgres 数据源。过滤操作渲染为参数化查询，值一律 bind。
#[derive(Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DataAccessClient for PostgresClient {
    fn from_table(&self, table: &str) -> Box<dyn FilterBuilder> {
        Box::new(PgFilterBuilder {
            pool: self.pool.clone(),
            table: table.to_string(),
            ops: Vec::new(),
        })
    }
}

struct PgFilterBuilder {
    pool: PgPool,
    table: String,
    ops: Vec<FilterOperation>,
}

/// 标识符只来自 schema 映射，仍然做双引号转义
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &FilterValue) -> Result<(), ClientError> {
    match value {
        FilterValue::Text(s) => {
            qb.push_bind(s.clone());
        }
        FilterValue::Integer(n) => {
            qb.push_bind(*n);
        }
        FilterValue::Decimal(d) => {
            qb.push_bind(*d);
        }
        FilterValue::Timestamp(t) => {
            qb.push_bind(*t);
        }
        FilterValue::Null | FilterValue::Any(_) => {
            return Err(ClientError::UnsupportedFilter {
                field: String::new(),
                message: format!("{value:?} cannot be bound as a comparison value"),
            })
        }
    }
    Ok(())
}

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, op: &FilterOperation) -> Result<(), ClientError> {
    let col = quote_ident(&op.field);
    let binary = |qb: &mut QueryBuilder<'static, Postgres>, sql_op: &str| {
        qb.push(format!("{col} {sql_op} "));
        push_value(qb, &op.value)
    };
    match op.operator {
        Operator::Gte => binary(qb, ">=")?,
        Operator::Lt => binary(qb, "<")?,
        Operator::Like => binary(qb, "LIKE")?,
        Operator::NotLike => binary(qb, "NOT LIKE")?,
        Operator::Ilike => binary(qb, "ILIKE")?,
        Operator::Eq => binary(qb, "=")?,
        Operator::IsNull => {
            qb.push(format!("{col} IS NULL"));
        }
        Operator::Or => {
            let FilterValue::Any(clauses) = &op.value else {
                return Err(ClientError::UnsupportedFilter {
                    field: op.field.clone(),
                    message: "OR requires nested clauses".to_string(),
                });
            };
            qb.push("(");
            for (i, clause) in clauses.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_condition(qb, clause)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}

impl PgFilterBuilder {
    fn build(&self, select: &str) -> Result<QueryBuilder<'static, Postgres>, ClientError> {
        let mut qb = QueryBuilder::new(format!("SELECT {select} FROM {}", quote_ident(&self.table)));
        for (i, op) in self.ops.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            push_condition(&mut qb, op)?;
        }
        debug!("Postgres 查询: {}", qb.sql());
        Ok(qb)
    }

    fn record(&mut self, operator: Operator, field: &str, value: FilterValue) {
        self.ops.push(FilterOperation {
            field: field.to_string(),
            operator,
            value,
        });
    }
}

#[async_trait]
impl FilterBuilder for PgFilterBuilder {
    fn gte(&mut self, field: &str, value: &FilterValue) {
        self.record(Operator::Gte, field, value.clone());
    }

    fn lt(&mut self, field: &str, value: &FilterValue) {
        self.record(Operator::Lt, field, value.clone());
    }

    fn like(&mut self, field: &str, pattern: &str) {
        self.record(Operator::Like, field, FilterValue::Text(pattern.to_string()));
    }

    fn not_like(&mut self, field: &str, pattern: &str) {
        self.record(Operator::NotLike, field, FilterValue::Text(pattern.to_string()));
    }

    fn ilike(&mut self, field: &str, value: &str) {
        self.record(Operator::Ilike, field, FilterValue::Text(value.to_string()));
    }

    fn eq(&mut self, field: &str, value: &FilterValue) {
        self.record(Operator::Eq, field, value.clone());
    }

    fn is_null(&mut self, field: &str) {
        self.record(Operator::IsNull, field, FilterValue::Null);
    }

    fn or(&mut self, clauses: &[FilterOperation]) {
        let field = clauses.first().map(|c| c.field.clone()).unwrap_or_default();
        self.record(Operator::Or, &field, FilterValue::Any(clauses.to_vec()));
    }

    async fn rows(self: Box<Self>, columns: Option<Vec<String>>) -> Result<Vec<Row>, ClientError> {
        let select = match &columns {
            Some(cols) if !cols.is_empty() => {
                cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
            }
            _ => "*".to_string(),
        };
        let mut qb = self.build(&select)?;
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(pg_row_to_json).collect()
    }

    async fn count(self: Box<Self>) -> Result<u64, ClientError> {
        let mut qb = self.build("COUNT(*) AS total")?;
        let row = qb.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(ops: Vec<FilterOperation>) -> String {
        let builder = PgFilterBuilder {
            pool: PgPoolOptions::new()
                .connect_lazy("postgres://localhost/warehouse")
                .unwrap(),
            table: "record_palletinfo".to_string(),
            ops,
        };
        builder.build("*").unwrap().sql().to_string()
    }

    #[tokio::test]
    async fn or_renders_as_one_parenthesized_disjunction() {
        let sql = render(vec![
            FilterOperation::like("series", "PM%"),
            FilterOperation::or(
                "plt_remark",
                vec![
                    FilterOperation::is_null("plt_remark"),
                    FilterOperation::not_like("plt_remark", "%Material GRN%"),
                ],
            ),
        ]);
        assert_eq!(
            sql,
            r#"SELECT * FROM "record_palletinfo" WHERE "series" LIKE $1 AND ("plt_remark" IS NULL OR "plt_remark" NOT LIKE $2)"#
        );
    }

    #[tokio::test]
    async fn no_operations_means_no_where() {
        assert_eq!(render(vec![]), r#"SELECT * FROM "record_palletinfo""#);
    }

    #[test]
    fn identifiers_are_escaped() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }
}
