//! WHERE 子句原子条件分类器。
//!
//! 上游模型只会从一小组固定模板里生成条件，这里按模板做模式匹配，
//! 不实现完整的 SQL 语法。模板列表按优先级排列：复合形状先于简单 LIKE，
//! LIKE 先于裸等值，避免具体形状被更一般的形状抢先匹配。
//! 模板集带版本号，新增形状时递增。

use crate::models::predicate::{CalendarPeriod, ClassifiedPredicate, EqualsValue, RawCondition};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

pub const SHAPE_SET_VERSION: u32 = 3;

type Build = fn(&Captures, &str) -> Option<ClassifiedPredicate>;

struct Shape {
    name: &'static str,
    regex: Regex,
    build: Build,
}

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";

/// 列引用，可带双引号与表名前缀: "record_palletinfo"."plt_remark"
fn col(name: &str) -> String {
    format!(r#"(?:"?(?P<{name}_tbl>{IDENT})"?\s*\.\s*)?"?(?P<{name}>{IDENT})"?"#)
}

/// 单引号字面量，'' 为转义
fn lit(name: &str) -> String {
    format!(r"'(?P<{name}>(?:[^']|'')*)'")
}

/// CURRENT_DATE [- INTERVAL 'N day(s)|week(s)' | - N]
fn date_expr(name: &str) -> String {
    format!(
        r"current_date(?:\s*\(\s*\))?(?:\s*-\s*(?:interval\s*'\s*(?P<{name}_n>\d+)\s*(?P<{name}_unit>days?|weeks?)\s*'|(?P<{name}_bare>\d+)))?"
    )
}

fn shape(name: &'static str, pattern: String, build: Build) -> Shape {
    Shape {
        name,
        regex: Regex::new(&format!("(?i)^{pattern}$")).expect("static classifier pattern"),
        build,
    }
}

static SHAPES: Lazy<Vec<Shape>> = Lazy::new(|| {
    let date_col = format!(r"date\s*\(\s*{}\s*\)", col("c"));
    vec![
        shape(
            "pattern_exclude",
            format!(r"{}\s+is\s+null\s+or\s+{}\s+not\s+like\s+{}", col("a"), col("b"), lit("p")),
            build_pattern_exclude,
        ),
        shape(
            "pattern_exclude_swapped",
            format!(r"{}\s+not\s+like\s+{}\s+or\s+{}\s+is\s+null", col("b"), lit("p"), col("a")),
            build_pattern_exclude,
        ),
        shape(
            "date_between",
            format!(r"{date_col}\s+between\s+{}\s+and\s+{}", date_expr("lo"), date_expr("hi")),
            build_date_between,
        ),
        shape(
            "date_since_period_start",
            format!(
                r"{date_col}\s*>=\s*date_trunc\s*\(\s*'(?P<period>week|month)'\s*,\s*current_date(?:\s*\(\s*\))?\s*\)"
            ),
            build_date_period_to_date,
        ),
        shape(
            "date_since",
            format!(r"{date_col}\s*>=\s*{}", date_expr("d")),
            build_date_since,
        ),
        shape(
            "date_equals",
            format!(r"{date_col}\s*=\s*{}", date_expr("d")),
            build_date_equals,
        ),
        shape(
            "case_insensitive_equals",
            format!(r"upper\s*\(\s*{}\s*\)\s*=\s*upper\s*\(\s*{}\s*\)", col("c"), lit("v")),
            build_case_insensitive_equals,
        ),
        shape(
            "pattern_include",
            format!(r"{}\s+like\s+{}", col("c"), lit("p")),
            build_pattern_include,
        ),
        shape(
            "equals",
            format!(r"{}\s*=\s*(?:{}|(?P<num>-?\d+(?:\.\d+)?))", col("c"), lit("v")),
            build_equals,
        ),
    ]
});

/// 把一个原子条件归入已知谓词种类；无法识别时返回 Unrecognized，从不报错
pub fn classify(condition: &RawCondition, target_table: &str) -> ClassifiedPredicate {
    let text = normalize(condition.as_str());
    for shape in SHAPES.iter() {
        if let Some(caps) = shape.regex.captures(&text) {
            if let Some(predicate) = (shape.build)(&caps, target_table) {
                debug!("条件命中模板 {} (v{}): {}", shape.name, SHAPE_SET_VERSION, text);
                return predicate;
            }
        }
    }
    ClassifiedPredicate::Unrecognized {
        raw_text: condition.as_str().to_string(),
    }
}

/// 折叠字面量之外的空白，并剥掉包裹整个条件的多余括号
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_quote = false;
    let mut last_space = false;
    for c in text.trim().chars() {
        if c == '\'' {
            in_quote = !in_quote;
        }
        if !in_quote && c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
            continue;
        }
        last_space = false;
        out.push(c);
    }

    let mut s = out.trim();
    while wrapped_in_parens(s) {
        s = s[1..s.len() - 1].trim();
    }
    s.to_string()
}

/// 首个 '(' 恰好在末尾闭合
fn wrapped_in_parens(s: &str) -> bool {
    if !(s.starts_with('(') && s.ends_with(')')) {
        return false;
    }
    let mut depth = 0usize;
    let mut in_quote = false;
    let last = s.len() - 1;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// 取列名；带表名前缀时必须是目标表
fn column(caps: &Captures, name: &str, target_table: &str) -> Option<String> {
    if let Some(tbl) = caps.name(&format!("{name}_tbl")) {
        if !tbl.as_str().eq_ignore_ascii_case(target_table) {
            return None;
        }
    }
    caps.name(name).map(|m| m.as_str().to_lowercase())
}

fn literal(caps: &Captures, name: &str) -> Option<String> {
    caps.name(name).map(|m| m.as_str().replace("''", "'"))
}

fn offset(caps: &Captures, name: &str) -> Option<i64> {
    if let Some(n) = caps.name(&format!("{name}_n")) {
        let n: i64 = n.as_str().parse().ok()?;
        let unit = caps.name(&format!("{name}_unit"))?.as_str().to_lowercase();
        return if unit.starts_with("week") {
            n.checked_mul(7)
        } else {
            Some(n)
        };
    }
    if let Some(n) = caps.name(&format!("{name}_bare")) {
        return n.as_str().parse().ok();
    }
    Some(0)
}

fn build_pattern_exclude(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    let a = column(caps, "a", table)?;
    let b = column(caps, "b", table)?;
    // IS NULL 与 NOT LIKE 必须作用于同一列，否则不是同一个语义谓词
    if a != b {
        return None;
    }
    Some(ClassifiedPredicate::PatternExclude {
        field: a,
        pattern: literal(caps, "p")?,
    })
}

fn build_date_between(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    let lo = offset(caps, "lo")?;
    let hi = offset(caps, "hi")?;
    Some(ClassifiedPredicate::DateRange {
        field: column(caps, "c", table)?,
        start_offset_days: lo.max(hi),
        end_offset_days: lo.min(hi),
    })
}

fn build_date_since(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    Some(ClassifiedPredicate::DateRange {
        field: column(caps, "c", table)?,
        start_offset_days: offset(caps, "d")?,
        end_offset_days: 0,
    })
}

fn build_date_period_to_date(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    let period = match caps.name("period")?.as_str().to_lowercase().as_str() {
        "week" => CalendarPeriod::Week,
        "month" => CalendarPeriod::Month,
        _ => return None,
    };
    Some(ClassifiedPredicate::DatePeriodToDate {
        field: column(caps, "c", table)?,
        period,
    })
}

fn build_date_equals(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    Some(ClassifiedPredicate::DateEquals {
        field: column(caps, "c", table)?,
        offset_days: offset(caps, "d")?,
    })
}

fn build_case_insensitive_equals(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    Some(ClassifiedPredicate::CaseInsensitiveEquals {
        field: column(caps, "c", table)?,
        value: literal(caps, "v")?,
    })
}

fn build_pattern_include(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    Some(ClassifiedPredicate::PatternInclude {
        field: column(caps, "c", table)?,
        pattern: literal(caps, "p")?,
    })
}

fn build_equals(caps: &Captures, table: &str) -> Option<ClassifiedPredicate> {
    let value = match (literal(caps, "v"), caps.name("num")) {
        (Some(text), _) => EqualsValue::Text(text),
        (None, Some(num)) if num.as_str().contains('.') => {
            EqualsValue::Decimal(Decimal::from_str(num.as_str()).ok()?)
        }
        (None, Some(num)) => EqualsValue::Integer(num.as_str().parse().ok()?),
        (None, None) => return None,
    };
    Some(ClassifiedPredicate::Equals {
        field: column(caps, "c", table)?,
        value,
    })
}
