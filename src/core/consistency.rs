use crate::models::aggregate::{AggregateResult, ConsistencyOutcome, Relation};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// 校验同一轮对话中相关结果的逻辑一致性。仅作提示，不阻断回答。
///
/// `results[i]` 为 None 表示第 i 个提问没有聚合结果。
pub fn check(results: &[Option<&AggregateResult>], relation: &Relation) -> ConsistencyOutcome {
    let outcome = match relation {
        Relation::SumOfParts { whole, parts } => check_sum_of_parts(results, *whole, parts),
        Relation::AtLeast { larger, smaller } => check_at_least(results, *larger, *smaller),
    };
    if let ConsistencyOutcome::Violated { detail } = &outcome {
        warn!("一致性校验未通过: {}", detail);
    }
    outcome
}

fn lookup<'a>(results: &[Option<&'a AggregateResult>], index: usize) -> Result<&'a AggregateResult, String> {
    match results.get(index) {
        Some(Some(r)) => Ok(r),
        Some(None) => Err(format!("question #{index} has no aggregate result")),
        None => Err(format!("question #{index} does not exist")),
    }
}

fn check_sum_of_parts(results: &[Option<&AggregateResult>], whole: usize, parts: &[usize]) -> ConsistencyOutcome {
    let resolved = (|| {
        let w = lookup(results, whole)?;
        let ps = parts
            .iter()
            .map(|&i| lookup(results, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, String>((w, ps))
    })();
    let (w, ps) = match resolved {
        Ok(v) => v,
        Err(detail) => return ConsistencyOutcome::Violated { detail },
    };

    let Some(sum) = checked_sum(ps.iter().map(|p| p.total)) else {
        return ConsistencyOutcome::Violated {
            detail: format!("part sum overflow for #{whole}"),
        };
    };
    if w.total != sum {
        let part_list = parts
            .iter()
            .zip(&ps)
            .map(|(i, p)| format!("#{i}={}", p.total))
            .collect::<Vec<_>>()
            .join(" + ");
        return ConsistencyOutcome::Violated {
            detail: format!("#{whole}={} but {part_list} = {sum}", w.total),
        };
    }

    // 全部分组时逐组核对
    if let (Some(wg), Some(pgs)) = (&w.groups, ps.iter().map(|p| p.groups.as_ref()).collect::<Option<Vec<_>>>()) {
        let keys: BTreeSet<&String> = wg.keys().chain(pgs.iter().flat_map(|g| g.keys())).collect();
        for key in keys {
            let expected = group_value(wg, key);
            let Some(actual) = checked_sum(pgs.iter().map(|g| group_value(g, key))) else {
                return ConsistencyOutcome::Violated {
                    detail: format!("group {key:?}: part sum overflow"),
                };
            };
            if expected != actual {
                return ConsistencyOutcome::Violated {
                    detail: format!("group {key:?}: #{whole}={expected} but parts sum to {actual}"),
                };
            }
        }
    }
    ConsistencyOutcome::Consistent
}

fn check_at_least(results: &[Option<&AggregateResult>], larger: usize, smaller: usize) -> ConsistencyOutcome {
    let (a, b) = match (lookup(results, larger), lookup(results, smaller)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(detail), _) | (_, Err(detail)) => return ConsistencyOutcome::Violated { detail },
    };
    if a.total >= b.total {
        ConsistencyOutcome::Consistent
    } else {
        ConsistencyOutcome::Violated {
            detail: format!("#{larger}={} is less than #{smaller}={}", a.total, b.total),
        }
    }
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

fn group_value(groups: &BTreeMap<String, Decimal>, key: &str) -> Decimal {
    groups.get(key).copied().unwrap_or(Decimal::ZERO)
}
