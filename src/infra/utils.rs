use crate::error::ClientError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use sqlx::{postgres::PgRow, Column, Row, TypeInfo};
use std::str::FromStr;

/// 按数据库原生类型名 (如 "INT4", "NUMERIC") 选择解码方式。
/// sqlx 只接受精确类型，INT2 必须按 i16 取，FLOAT4 必须按 f32 取。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Bool,
    Date,
    Timestamp,
    TimestampTz,
    Json,
    Other,
}

impl ColumnKind {
    pub fn of(type_name: &str) -> Self {
        match type_name {
            "INT2" => Self::SmallInt,
            "INT4" => Self::Int,
            "INT8" => Self::BigInt,
            "FLOAT4" => Self::Real,
            "FLOAT8" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UUID" => Self::Text,
            "BOOL" => Self::Bool,
            "DATE" => Self::Date,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "JSON" | "JSONB" => Self::Json,
            _ => Self::Other,
        }
    }
}

/// 行转 JSON。任何列解码失败都返回错误，不会把值悄悄变成 null。
pub fn pg_row_to_json(row: &PgRow) -> Result<Map<String, Value>, ClientError> {
    let mut map = Map::new();

    for col in row.columns() {
        let name = col.name();
        let val = match ColumnKind::of(col.type_info().name()) {
            ColumnKind::SmallInt => json!(row.try_get::<Option<i16>, _>(name)?),
            ColumnKind::Int => json!(row.try_get::<Option<i32>, _>(name)?),
            ColumnKind::BigInt => json!(row.try_get::<Option<i64>, _>(name)?),
            ColumnKind::Real => json!(row.try_get::<Option<f32>, _>(name)?),
            ColumnKind::Double => json!(row.try_get::<Option<f64>, _>(name)?),
            ColumnKind::Numeric => {
                // 重量、数量转字符串保持精度，聚合时再按 Decimal 解析
                let v: Option<Decimal> = row.try_get(name)?;
                json!(v.map(|d| d.to_string()))
            }
            ColumnKind::Text | ColumnKind::Other => json!(row.try_get::<Option<String>, _>(name)?),
            ColumnKind::Bool => json!(row.try_get::<Option<bool>, _>(name)?),
            ColumnKind::Date => {
                let v: Option<NaiveDate> = row.try_get(name)?;
                json!(v.map(|d| d.to_string()))
            }
            ColumnKind::Timestamp => {
                let v: Option<NaiveDateTime> = row.try_get(name)?;
                json!(v.map(|dt| dt.and_utc().to_rfc3339()))
            }
            ColumnKind::TimestampTz => {
                let v: Option<DateTime<Utc>> = row.try_get(name)?;
                json!(v.map(|dt| dt.to_rfc3339()))
            }
            ColumnKind::Json => row.try_get::<Option<Value>, _>(name)?.unwrap_or(Value::Null),
        };

        map.insert(name.to_string(), val);
    }

    Ok(map)
}

/// JSON 数值或数字字符串转 Decimal，不经过 f64
pub fn json_to_decimal(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// 解析 RFC 3339 或 Postgres 文本格式的时间戳；无时区的按 UTC 处理
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_column_types_use_exact_rust_types() {
        assert_eq!(ColumnKind::of("INT2"), ColumnKind::SmallInt);
        assert_eq!(ColumnKind::of("INT4"), ColumnKind::Int);
        assert_eq!(ColumnKind::of("FLOAT4"), ColumnKind::Real);
        assert_eq!(ColumnKind::of("FLOAT8"), ColumnKind::Double);
        assert_eq!(ColumnKind::of("NUMERIC"), ColumnKind::Numeric);
        assert_eq!(ColumnKind::of("INTERVAL"), ColumnKind::Other);
    }

    #[test]
    fn column_decode_failure_becomes_a_client_error() {
        let decode = sqlx::Error::ColumnDecode {
            index: "\"product_qty\"".to_string(),
            source: "mismatched types; Rust type `i32` is not compatible with SQL type `INT2`".into(),
        };
        let err: ClientError = decode.into();
        assert!(matches!(err, ClientError::Database(sqlx::Error::ColumnDecode { .. })));
        assert!(err.to_string().contains("product_qty"));
    }

    #[test]
    fn decimals_parse_exactly() {
        assert_eq!(json_to_decimal(&json!(0.1)), Decimal::from_str("0.1").ok());
        assert_eq!(json_to_decimal(&json!("12.345")), Decimal::from_str("12.345").ok());
        assert_eq!(json_to_decimal(&json!(40)), Some(Decimal::from(40)));
        assert_eq!(json_to_decimal(&json!("abc")), None);
        assert_eq!(json_to_decimal(&Value::Null), None);
    }

    #[test]
    fn timestamps_in_supported_formats() {
        let expected = DateTime::parse_from_rfc3339("2025-01-10T08:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(parse_timestamp("2025-01-10T08:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-10T09:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-10 08:00:00+00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-10 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
