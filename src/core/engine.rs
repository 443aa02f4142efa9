use crate::core::aggregator::AggregatePlan;
use crate::core::classifier::classify;
use crate::core::consistency;
use crate::core::date_window::DateWindowResolver;
use crate::core::executor::{ExecutionMode, ExecutionOutput, QueryExecutor};
use crate::core::splitter::split;
use crate::core::translator::Translator;
use crate::error::{EngineError, EngineResult};
use crate::infra::data_client::DataAccessClient;
use crate::models::aggregate::{ConsistencyOutcome, Relation};
use crate::models::context::{AnswerMeta, AskRequest, AskResponse, Diagnostics, TurnRequest, TurnResponse};
use crate::models::filter::FilterPipeline;
use crate::models::schema::{SchemaProvider, TableSchema};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// WHERE 子句翻译结果：过滤管线 + 被丢弃的条件原文
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub pipeline: FilterPipeline,
    pub unrecognized: Vec<String>,
}

/// "Ask Database" 的翻译与执行引擎。
///
/// 每个提问从零开始解析，引擎本身不保存任何跨提问的可变状态，
/// 并发提问之间互不影响。
pub struct AskEngine {
    client: Arc<dyn DataAccessClient>,
    schemas: Arc<dyn SchemaProvider>,
    resolver: DateWindowResolver,
    timeout: Duration,
}

impl AskEngine {
    pub fn new(
        client: Arc<dyn DataAccessClient>,
        schemas: Arc<dyn SchemaProvider>,
        resolver: DateWindowResolver,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            schemas,
            resolver,
            timeout,
        }
    }

    pub fn schemas(&self) -> &dyn SchemaProvider {
        self.schemas.as_ref()
    }

    fn schema(&self, table: &str) -> EngineResult<&TableSchema> {
        self.schemas
            .schema(table)
            .ok_or_else(|| EngineError::UnknownTable(table.to_string()))
    }

    /// 切分 -> 分类 -> 翻译。每个原子条件独立处理，互不短路。
    pub fn translate(&self, where_clause: &str, schema: &TableSchema, now: DateTime<Utc>) -> Translation {
        let translator = Translator::new(&self.resolver, now);
        let mut pipeline = FilterPipeline::new(&schema.table);
        let mut unrecognized = Vec::new();

        let conditions = split(where_clause);
        for condition in &conditions {
            let predicate = classify(condition, &schema.table);
            debug!("条件分类: {} -> {:?}", condition, predicate);
            match translator.translate(&predicate, schema) {
                Ok(ops) => {
                    debug_assert!(ops.iter().flat_map(|o| o.fields()).all(|f| schema.has_field(f)));
                    pipeline.extend(ops)
                }
                Err(reason) => {
                    warn!("丢弃无法翻译的条件 [{}]: {}", condition, reason);
                    unrecognized.push(condition.as_str().to_string());
                }
            }
        }

        info!(
            "WHERE 子句翻译完成: {} 个条件, {} 个过滤操作, {} 个被丢弃",
            conditions.len(),
            pipeline.len(),
            unrecognized.len()
        );
        Translation {
            pipeline,
            unrecognized,
        }
    }

    pub async fn ask(&self, request: &AskRequest) -> EngineResult<AskResponse> {
        self.ask_at(request, Utc::now()).await
    }

    /// `now` 为本次提问唯一一次读取的时钟
    pub async fn ask_at(&self, request: &AskRequest, now: DateTime<Utc>) -> EngineResult<AskResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("ask", request_id = %request_id, table = %request.target_table);
        self.run(request, now, request_id).instrument(span).await
    }

    async fn run(&self, request: &AskRequest, now: DateTime<Utc>, request_id: Uuid) -> EngineResult<AskResponse> {
        info!("开始处理提问: {}", request.where_clause);
        let schema = self.schema(&request.target_table)?;
        let Translation {
            pipeline,
            unrecognized,
        } = self.translate(&request.where_clause, schema, now);

        let meta_ops = pipeline.operations().to_vec();
        let executor = QueryExecutor::new(self.client.as_ref(), self.timeout);

        let (rows, aggregate) = match &request.aggregate {
            Some(agg) => {
                let plan = AggregatePlan::new(agg, schema)?;
                let output = executor.execute(pipeline, plan.mode()).await?;
                (None, Some(plan.reduce(output)?))
            }
            None => match executor.execute(pipeline, ExecutionMode::Rows { columns: None }).await? {
                ExecutionOutput::Rows(rows) => (Some(rows), None),
                ExecutionOutput::Count(_) => (None, None),
            },
        };

        Ok(AskResponse {
            request_id,
            meta: AnswerMeta {
                table: schema.table.clone(),
                operations: meta_ops,
                row_count: rows.as_ref().map(Vec::len),
            },
            rows,
            aggregate,
            diagnostics: Diagnostics {
                unrecognized_conditions: unrecognized,
                consistency: None,
            },
        })
    }

    /// 同一轮对话的多个提问：共享同一时钟读数、并发执行，之后做一致性校验
    pub async fn ask_turn(&self, turn: &TurnRequest) -> EngineResult<TurnResponse> {
        let now = Utc::now();
        self.ask_turn_at(turn, now).await
    }

    pub async fn ask_turn_at(&self, turn: &TurnRequest, now: DateTime<Utc>) -> EngineResult<TurnResponse> {
        let mut answers = try_join_all(turn.questions.iter().map(|q| self.ask_at(q, now))).await?;

        let outcomes: Vec<ConsistencyOutcome> = {
            let results: Vec<_> = answers.iter().map(|a| a.aggregate.as_ref()).collect();
            turn.checks
                .iter()
                .map(|relation| consistency::check(&results, relation))
                .collect()
        };

        // 校验结果挂到关系左侧的那个回答上；已有违例时不覆盖
        for (relation, outcome) in turn.checks.iter().zip(&outcomes) {
            let anchor = match relation {
                Relation::SumOfParts { whole, .. } => *whole,
                Relation::AtLeast { larger, .. } => *larger,
            };
            if let Some(answer) = answers.get_mut(anchor) {
                let slot = &mut answer.diagnostics.consistency;
                if !matches!(slot, Some(ConsistencyOutcome::Violated { .. })) {
                    *slot = Some(outcome.clone());
                }
            }
        }

        Ok(TurnResponse {
            answers,
            consistency: outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory_store::InMemoryStore;
    use crate::models::aggregate::AggregateRequest;
    use crate::models::context::Row;
    use crate::models::filter::{FilterValue, Operator};
    use crate::models::schema::SchemaRegistry;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::HashMap;

    const TODAY_CLAUSE: &str = r#"DATE("generate_time") = CURRENT_DATE"#;
    const GRN_INCLUDE: &str = r#""plt_remark" LIKE '%Material GRN%'"#;
    const GRN_EXCLUDE: &str = r#"("plt_remark" IS NULL OR "plt_remark" NOT LIKE '%Material GRN%')"#;

    fn now() -> DateTime<Utc> {
        // 伦敦 2025-06-15 11:00 (BST)
        DateTime::parse_from_rfc3339("2025-06-15T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn pallet(n: usize, time: &str, remark: Option<&str>, qty: i64) -> serde_json::Value {
        json!({
            "plt_num": format!("150625/{n}"),
            "generate_time": time,
            "plt_remark": remark,
            "product_code": if n % 2 == 0 { "MEP9090150" } else { "ME4545150" },
            "product_qty": qty,
        })
    }

    /// 今天 28 板：14 板 GRN，7 板无备注，7 板生产备注；另有 5 板昨天的
    fn fixture() -> InMemoryStore {
        let mut rows = Vec::new();
        for n in 0..14 {
            // 第一板落在 UTC 前一天、伦敦当天 00:30
            let time = if n == 0 { "2025-06-14T23:30:00+00:00" } else { "2025-06-15T08:00:00+00:00" };
            rows.push(pallet(n, time, Some(&format!("Material GRN- {}", 1000 + n)), 10));
        }
        for n in 14..21 {
            rows.push(pallet(n, "2025-06-15T09:15:00+00:00", None, 20));
        }
        for n in 21..28 {
            rows.push(pallet(n, "2025-06-15T06:45:00+00:00", Some("Production"), 30));
        }
        for n in 28..33 {
            // 伦敦昨天 23:30 与昨天中午
            let time = if n == 28 { "2025-06-14T22:30:00+00:00" } else { "2025-06-14T12:00:00+00:00" };
            rows.push(pallet(n, time, Some("Material GRN- 999"), 40));
        }
        let rows: Vec<Row> = serde_json::from_value(serde_json::Value::Array(rows)).unwrap();
        InMemoryStore::new(HashMap::from([("record_palletinfo".to_string(), rows)]))
    }

    fn engine(store: InMemoryStore) -> AskEngine {
        AskEngine::new(
            Arc::new(store),
            Arc::new(SchemaRegistry::warehouse()),
            DateWindowResolver::new(chrono_tz::Europe::London, 365),
            Duration::from_secs(5),
        )
    }

    fn ask(clause: &str, aggregate: Option<AggregateRequest>) -> AskRequest {
        AskRequest {
            where_clause: clause.to_string(),
            target_table: "record_palletinfo".to_string(),
            aggregate,
        }
    }

    fn and(parts: &[&str]) -> String {
        parts.join(" AND ")
    }

    #[tokio::test]
    async fn today_round_trip_returns_only_local_today_rows() {
        let e = engine(fixture());
        let resp = e.ask_at(&ask(TODAY_CLAUSE, None), now()).await.unwrap();
        let rows = resp.rows.unwrap();
        assert_eq!(rows.len(), 28);
        assert!(rows.iter().any(|r| r["plt_num"] == "150625/0"));
        assert!(!rows.iter().any(|r| r["plt_num"] == "150625/28"));
        assert_eq!(resp.meta.row_count, Some(28));
        assert!(resp.diagnostics.unrecognized_conditions.is_empty());
    }

    #[tokio::test]
    async fn exclude_shape_becomes_exactly_one_or_operation() {
        let e = engine(fixture());
        let schema = e.schema("record_palletinfo").unwrap();
        let t = e.translate(GRN_EXCLUDE, schema, now());
        assert_eq!(t.pipeline.len(), 1);
        let op = &t.pipeline.operations()[0];
        assert_eq!(op.operator, Operator::Or);
        let FilterValue::Any(inner) = &op.value else {
            panic!("expected a nested disjunction");
        };
        assert_eq!(
            inner.iter().map(|o| o.operator).collect::<Vec<_>>(),
            vec![Operator::IsNull, Operator::NotLike]
        );
    }

    #[tokio::test]
    async fn today_total_equals_grn_plus_non_grn() {
        let store = fixture();
        let e = engine(store.clone());
        let turn = TurnRequest {
            questions: vec![
                ask(TODAY_CLAUSE, Some(AggregateRequest::count())),
                ask(&and(&[TODAY_CLAUSE, GRN_INCLUDE]), Some(AggregateRequest::count())),
                ask(&and(&[TODAY_CLAUSE, GRN_EXCLUDE]), Some(AggregateRequest::count())),
            ],
            checks: vec![Relation::SumOfParts { whole: 0, parts: vec![1, 2] }],
        };
        let resp = e.ask_turn_at(&turn, now()).await.unwrap();

        let totals: Vec<Decimal> = resp
            .answers
            .iter()
            .map(|a| a.aggregate.as_ref().unwrap().total)
            .collect();
        assert_eq!(totals, vec![Decimal::from(28), Decimal::from(14), Decimal::from(14)]);
        assert_eq!(resp.consistency, vec![ConsistencyOutcome::Consistent]);
        assert_eq!(resp.answers[0].diagnostics.consistency, Some(ConsistencyOutcome::Consistent));

        // 日期条件与模式条件各自独立翻译，不会互相吞掉
        assert_eq!(resp.answers[1].meta.operations.len(), 3);
        assert_eq!(resp.answers[1].meta.operations[2].operator, Operator::Like);
        assert_eq!(resp.answers[2].meta.operations.len(), 3);
        assert_eq!(resp.answers[2].meta.operations[2].operator, Operator::Or);
    }

    #[tokio::test]
    async fn contradiction_is_reported_but_answers_are_kept() {
        let e = engine(fixture());
        let turn = TurnRequest {
            questions: vec![
                ask(TODAY_CLAUSE, Some(AggregateRequest::count())),
                ask(&and(&[TODAY_CLAUSE, GRN_INCLUDE]), Some(AggregateRequest::count())),
                // 条件写成了 NOT LIKE 单独出现，不在模板集里，被降级
                ask(
                    &and(&[TODAY_CLAUSE, r#""plt_remark" NOT LIKE '%Material GRN%'"#]),
                    Some(AggregateRequest::count()),
                ),
            ],
            checks: vec![Relation::SumOfParts { whole: 0, parts: vec![1, 2] }],
        };
        let resp = e.ask_turn_at(&turn, now()).await.unwrap();
        assert_eq!(resp.answers.len(), 3);
        assert!(!resp.consistency[0].is_consistent());
        assert_eq!(resp.answers[2].diagnostics.unrecognized_conditions.len(), 1);
        assert_eq!(resp.answers[2].aggregate.as_ref().unwrap().total, Decimal::from(28));
    }

    #[tokio::test]
    async fn garbage_condition_is_dropped_and_reported() {
        let e = engine(fixture());
        let resp = e
            .ask_at(&ask(&and(&[TODAY_CLAUSE, "foo ~~ bar"]), Some(AggregateRequest::count())), now())
            .await
            .unwrap();
        assert_eq!(resp.meta.operations.len(), 2);
        assert_eq!(resp.diagnostics.unrecognized_conditions, vec!["foo ~~ bar".to_string()]);
        assert_eq!(resp.aggregate.unwrap().total, Decimal::from(28));
    }

    #[tokio::test]
    async fn same_clause_twice_gives_identical_results() {
        let e = engine(fixture());
        let clause = and(&[TODAY_CLAUSE, GRN_EXCLUDE]);
        let first = e.ask_at(&ask(&clause, None), now()).await.unwrap();
        let second = e.ask_at(&ask(&clause, None), now()).await.unwrap();
        assert_eq!(first.rows, second.rows);
        assert_eq!(first.meta, second.meta);
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn grouped_sum_over_filtered_rows() {
        let e = engine(fixture());
        let resp = e
            .ask_at(
                &ask(
                    &and(&[TODAY_CLAUSE, GRN_EXCLUDE]),
                    Some(AggregateRequest::sum("product_qty").grouped_by("product_code")),
                ),
                now(),
            )
            .await
            .unwrap();
        let agg = resp.aggregate.unwrap();
        // 14 板非 GRN：7 板 qty 20，7 板 qty 30
        assert_eq!(agg.total, Decimal::from(7 * 20 + 7 * 30));
        let groups = agg.groups.unwrap();
        assert_eq!(groups.values().copied().sum::<Decimal>(), agg.total);
        assert!(resp.rows.is_none());
    }

    #[tokio::test]
    async fn empty_clause_matches_all_rows() {
        let e = engine(fixture());
        let resp = e.ask_at(&ask("  ", Some(AggregateRequest::count())), now()).await.unwrap();
        assert!(resp.meta.operations.is_empty());
        assert_eq!(resp.aggregate.unwrap().total, Decimal::from(33));
    }

    #[tokio::test]
    async fn decimal_equality_matches_integer_column_values() {
        let e = engine(fixture());
        let resp = e
            .ask_at(&ask(&and(&[TODAY_CLAUSE, r#""product_qty" = 10.0"#]), Some(AggregateRequest::count())), now())
            .await
            .unwrap();
        assert_eq!(resp.meta.operations[2].value, FilterValue::Decimal(Decimal::new(100, 1)));
        assert_eq!(resp.aggregate.unwrap().total, Decimal::from(14));
    }

    #[tokio::test]
    async fn calendar_month_and_week_to_date() {
        let e = engine(fixture());
        for period in ["month", "week"] {
            let clause = format!(r#"DATE("generate_time") >= DATE_TRUNC('{period}', CURRENT_DATE)"#);
            let resp = e.ask_at(&ask(&clause, Some(AggregateRequest::count())), now()).await.unwrap();
            assert!(resp.diagnostics.unrecognized_conditions.is_empty());
            assert_eq!(resp.meta.operations.len(), 2);
            assert_eq!(resp.aggregate.unwrap().total, Decimal::from(33));
        }
    }

    #[tokio::test]
    async fn yesterday_and_week_windows() {
        let e = engine(fixture());
        let yesterday = e
            .ask_at(
                &ask(
                    r#"DATE("generate_time") = CURRENT_DATE - INTERVAL '1 day'"#,
                    Some(AggregateRequest::count()),
                ),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(yesterday.aggregate.unwrap().total, Decimal::from(5));

        let week = e
            .ask_at(
                &ask(
                    r#"DATE("generate_time") >= CURRENT_DATE - INTERVAL '7 days'"#,
                    Some(AggregateRequest::count()),
                ),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(week.aggregate.unwrap().total, Decimal::from(33));
    }

    #[tokio::test]
    async fn unknown_table_and_unmapped_aggregate_are_fatal() {
        let e = engine(fixture());
        let mut req = ask(TODAY_CLAUSE, None);
        req.target_table = "data_code".to_string();
        assert!(matches!(e.ask_at(&req, now()).await, Err(EngineError::UnknownTable(_))));

        let req = ask(TODAY_CLAUSE, Some(AggregateRequest::sum("net_weight")));
        assert!(matches!(e.ask_at(&req, now()).await, Err(EngineError::SchemaMismatch { .. })));
    }

    #[tokio::test]
    async fn unmapped_column_degrades_instead_of_failing() {
        let e = engine(fixture());
        let resp = e
            .ask_at(&ask(&and(&[TODAY_CLAUSE, r#""t_loc" = 'Fold Mill'"#]), None), now())
            .await
            .unwrap();
        assert_eq!(resp.diagnostics.unrecognized_conditions, vec![r#""t_loc" = 'Fold Mill'"#.to_string()]);
        assert_eq!(resp.rows.unwrap().len(), 28);
    }
}
