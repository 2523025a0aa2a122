//! Conversion of PostgreSQL rows into loosely-typed JSON records
//!
//! Results arrive in the binary wire format, so every type is decoded through
//! its sqlx codec and rendered the way PostgreSQL prints it. Types without a
//! codec here are rendered as `\x`-prefixed hex of their wire bytes.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use quad_core::Record;
use serde_json::{Value, json};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::types::BigDecimal;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::mac_address::MacAddress;
use sqlx::{Column, Row, TypeInfo, ValueRef};

pub fn row_to_record(row: &PgRow) -> Record {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), decode_value(row, index));
    }
    record
}

fn decode_value(row: &PgRow, index: usize) -> Value {
    let value_ref = match row.try_get_raw(index) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };

    if value_ref.is_null() {
        return Value::Null;
    }

    let type_info = value_ref.type_info().into_owned();
    let type_name = type_info.name();

    match type_name {
        "BOOL" => json!(row.try_get::<bool, _>(index).ok()),
        "INT2" => json!(row.try_get::<i16, _>(index).ok()),
        "INT4" => json!(row.try_get::<i32, _>(index).ok()),
        "INT8" => json!(row.try_get::<i64, _>(index).ok()),
        "OID" => json!(row.try_get::<Oid, _>(index).ok().map(|oid| oid.0)),
        "FLOAT4" => json!(row.try_get::<f32, _>(index).ok()),
        "FLOAT8" => json!(row.try_get::<f64, _>(index).ok()),
        "NUMERIC" => decode_numeric(row, index, &value_ref),
        "MONEY" => row
            .try_get::<PgMoney, _>(index)
            .map(|m| Value::String(format_money(m.0)))
            .unwrap_or(Value::Null),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "BPCHAR" | "CITEXT" => {
            json!(row.try_get::<String, _>(index).ok())
        }
        "UUID" => row
            .try_get::<uuid::Uuid, _>(index)
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "TIMETZ" => row
            .try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index)
            .map(|t| Value::String(format!("{}{}", t.time, format_offset(&t.offset))))
            .unwrap_or(Value::Null),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(index)
            .map(|i| Value::String(format_interval(&i)))
            .unwrap_or(Value::Null),
        "INET" | "CIDR" => row
            .try_get::<IpNetwork, _>(index)
            .map(|net| Value::String(format_network(&net, type_name == "CIDR")))
            .unwrap_or(Value::Null),
        "MACADDR" => row
            .try_get::<MacAddress, _>(index)
            .map(|mac| Value::String(mac.to_string().to_lowercase()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index).unwrap_or(Value::Null),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|b| Value::String(hex_literal(&b)))
            .unwrap_or(Value::Null),
        "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "BPCHAR[]" | "NAME[]" => {
            json!(row.try_get::<Vec<String>, _>(index).ok())
        }
        "INT2[]" => json!(row.try_get::<Vec<i16>, _>(index).ok()),
        "INT4[]" => json!(row.try_get::<Vec<i32>, _>(index).ok()),
        "INT8[]" => json!(row.try_get::<Vec<i64>, _>(index).ok()),
        "FLOAT4[]" => json!(row.try_get::<Vec<f32>, _>(index).ok()),
        "FLOAT8[]" => json!(row.try_get::<Vec<f64>, _>(index).ok()),
        "BOOL[]" => json!(row.try_get::<Vec<bool>, _>(index).ok()),
        "NUMERIC[]" => json!(
            row.try_get::<Vec<BigDecimal>, _>(index)
                .ok()
                .map(|items| items.iter().map(numeric_text).collect::<Vec<_>>())
        ),
        "UUID[]" => json!(
            row.try_get::<Vec<uuid::Uuid>, _>(index)
                .ok()
                .map(|items| items.iter().map(|u| u.to_string()).collect::<Vec<_>>())
        ),
        "JSON[]" | "JSONB[]" => json!(row.try_get::<Vec<Value>, _>(index).ok()),
        _ => decode_opaque(&value_ref, type_info.kind()),
    }
}

/// Types without a codec: text-format values and enum labels are already
/// text, anything else is shown as its wire bytes.
fn decode_opaque(value_ref: &PgValueRef<'_>, kind: &PgTypeKind) -> Value {
    if value_ref.format() == PgValueFormat::Text || matches!(kind, PgTypeKind::Enum(_)) {
        if let Ok(text) = value_ref.as_str() {
            return Value::String(text.to_string());
        }
    }
    match value_ref.as_bytes() {
        Ok(bytes) => Value::String(hex_literal(bytes)),
        Err(_) => Value::Null,
    }
}

/// Numeric rendered at its display scale, with the special values by name
fn decode_numeric(row: &PgRow, index: usize, value_ref: &PgValueRef<'_>) -> Value {
    if value_ref.format() == PgValueFormat::Text {
        if let Ok(text) = value_ref.as_str() {
            return Value::String(text.to_string());
        }
    }

    let header = binary_numeric_header(value_ref);

    if let Ok(decimal) = row.try_get::<BigDecimal, _>(index) {
        let rendered = match header {
            Some((_, display_scale)) => decimal
                .with_scale(i64::from(display_scale))
                .to_plain_string(),
            None => numeric_text(&decimal),
        };
        return Value::String(rendered);
    }

    match header.map(|(sign, _)| sign) {
        Some(NUMERIC_NAN) => Value::String("NaN".to_string()),
        Some(NUMERIC_PINF) => Value::String("Infinity".to_string()),
        Some(NUMERIC_NINF) => Value::String("-Infinity".to_string()),
        _ => Value::Null,
    }
}

const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// `(sign, dscale)` from the binary numeric header
/// `ndigits:i16 weight:i16 sign:u16 dscale:u16`
fn binary_numeric_header(value_ref: &PgValueRef<'_>) -> Option<(u16, u16)> {
    if value_ref.format() != PgValueFormat::Binary {
        return None;
    }
    parse_numeric_header(value_ref.as_bytes().ok()?)
}

fn parse_numeric_header(bytes: &[u8]) -> Option<(u16, u16)> {
    let header = bytes.get(..8)?;
    let sign = u16::from_be_bytes([header[4], header[5]]);
    let display_scale = u16::from_be_bytes([header[6], header[7]]);
    Some((sign, display_scale))
}

/// Plain decimal text without trailing fractional zeros
fn numeric_text(decimal: &BigDecimal) -> String {
    trim_fraction(&decimal.to_plain_string())
}

fn trim_fraction(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Cents as a plain decimal amount, which casts back to `money`
fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// `+02`, `-05:30`, `+05:45:10` as PostgreSQL prints zone offsets
fn format_offset(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    let (hours, minutes, secs) = (abs / 3600, abs % 3600 / 60, abs % 60);

    let mut out = format!("{}{:02}", sign, hours);
    if minutes != 0 || secs != 0 {
        out.push_str(&format!(":{:02}", minutes));
    }
    if secs != 0 {
        out.push_str(&format!(":{:02}", secs));
    }
    out
}

/// PostgreSQL's default `postgres` interval style,
/// e.g. `1 year 2 mons 3 days 04:05:06.5`
fn format_interval(interval: &PgInterval) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut seen_negative = false;
    let mut field = |value: i64, unit: &str, parts: &mut Vec<String>| {
        if value == 0 {
            return;
        }
        let plural = if value == 1 { "" } else { "s" };
        let sign = if value > 0 && seen_negative { "+" } else { "" };
        parts.push(format!("{}{} {}{}", sign, value, unit, plural));
        seen_negative |= value < 0;
    };

    let months = i64::from(interval.months);
    field(months / 12, "year", &mut parts);
    field(months % 12, "mon", &mut parts);
    field(i64::from(interval.days), "day", &mut parts);

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 {
            "-"
        } else if seen_negative {
            "+"
        } else {
            ""
        };
        let abs = micros.unsigned_abs();
        let total_secs = abs / 1_000_000;
        let fraction = abs % 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            total_secs / 3600,
            total_secs % 3600 / 60,
            total_secs % 60
        );
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// `inet` omits a full-length prefix, `cidr` always shows it
fn format_network(net: &IpNetwork, always_prefix: bool) -> String {
    let full = match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if always_prefix || net.prefix() != full {
        format!("{}/{}", net.ip(), net.prefix())
    } else {
        net.ip().to_string()
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{PgExecutor, SqlExecutor};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn interval(months: i32, days: i32, microseconds: i64) -> String {
        format_interval(&PgInterval {
            months,
            days,
            microseconds,
        })
    }

    #[test]
    fn test_interval_text() {
        assert_eq!(interval(0, 0, 0), "00:00:00");
        assert_eq!(
            interval(14, 3, 14_706_500_000),
            "1 year 2 mons 3 days 04:05:06.5"
        );
        assert_eq!(interval(0, 1, 0), "1 day");
        assert_eq!(interval(-12, 0, 0), "-1 years");
        assert_eq!(interval(0, -1, 7_200_000_000), "-1 days +02:00:00");
        assert_eq!(interval(0, 0, -90_000_000), "-00:01:30");
    }

    #[test]
    fn test_offset_text() {
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let west = FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(format_offset(&east), "+02");
        assert_eq!(format_offset(&west), "-05:30");
    }

    #[test]
    fn test_money_text() {
        assert_eq!(format_money(1234), "12.34");
        assert_eq!(format_money(-5), "-0.05");
        assert_eq!(format_money(0), "0.00");
    }

    #[test]
    fn test_numeric_header() {
        // 1.25: ndigits 2, weight 0, sign +, dscale 2, digits [1, 2500]
        let bytes = [0, 2, 0, 0, 0, 0, 0, 2, 0, 1, 0x09, 0xC4];
        assert_eq!(parse_numeric_header(&bytes), Some((0, 2)));
        let nan = [0, 0, 0, 0, 0xC0, 0, 0, 0];
        assert_eq!(parse_numeric_header(&nan), Some((NUMERIC_NAN, 0)));
        assert_eq!(parse_numeric_header(&[0, 1]), None);
    }

    #[test]
    fn test_numeric_text_trims_padding() {
        let padded: BigDecimal = "1.2500".parse().unwrap();
        assert_eq!(numeric_text(&padded), "1.25");
        let whole: BigDecimal = "100".parse().unwrap();
        assert_eq!(numeric_text(&whole), "100");
        assert_eq!(trim_fraction("3.000"), "3");
    }

    #[test]
    fn test_network_text() {
        let host: IpNetwork = "10.1.2.3/32".parse().unwrap();
        let block: IpNetwork = "10.1.0.0/16".parse().unwrap();
        assert_eq!(format_network(&host, false), "10.1.2.3");
        assert_eq!(format_network(&host, true), "10.1.2.3/32");
        assert_eq!(format_network(&block, false), "10.1.0.0/16");
    }

    /// Executor against `DATABASE_URL`, for the tests that need real wire values
    fn live_executor() -> PgExecutor {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(&url)
            .unwrap();
        PgExecutor::new(Arc::new(pool))
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_decodes_wire_values() {
        let executor = live_executor();
        let rows = executor
            .run(
                "SELECT '10.1.2.3'::inet AS addr, '10.1.0.0/16'::cidr AS block, \
                 '08:00:2b:01:02:03'::macaddr AS mac, \
                 '1 year 2 mons 3 days 04:05:06.5'::interval AS span, \
                 '10:30:00+02'::timetz AS ts, '12.34'::money AS price, \
                 1.25::numeric AS amount, 'NaN'::numeric AS missing, \
                 ARRAY[1.5, 2.25]::numeric[] AS amounts, \
                 'pg_class'::regclass::oid AS rel, \
                 '\\xdeadbeef'::bytea AS raw, '(1,2)'::point AS pos",
                vec![],
            )
            .await
            .unwrap();

        let row = &rows.rows[0];
        assert_eq!(row["addr"], json!("10.1.2.3"));
        assert_eq!(row["block"], json!("10.1.0.0/16"));
        assert_eq!(row["mac"], json!("08:00:2b:01:02:03"));
        assert_eq!(row["span"], json!("1 year 2 mons 3 days 04:05:06.5"));
        assert_eq!(row["ts"], json!("10:30:00+02"));
        assert_eq!(row["price"], json!("12.34"));
        assert_eq!(row["amount"], json!("1.25"));
        assert_eq!(row["missing"], json!("NaN"));
        assert_eq!(row["amounts"], json!(["1.5", "2.25"]));
        assert_eq!(row["rel"], json!(1259));
        assert_eq!(row["raw"], json!("\\xdeadbeef"));
        // point has no codec: hex of the binary form, never raw bytes as text
        let pos = row["pos"].as_str().unwrap();
        assert!(pos.starts_with("\\x"));
        assert!(pos[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_decodes_enum_labels() {
        let executor = live_executor();
        executor
            .run(
                "DO $$ BEGIN CREATE TYPE quad_mood AS ENUM ('sad', 'happy'); \
                 EXCEPTION WHEN duplicate_object THEN NULL; END $$",
                vec![],
            )
            .await
            .unwrap();

        let rows = executor
            .run("SELECT 'happy'::quad_mood AS mood", vec![])
            .await
            .unwrap();
        assert_eq!(rows.rows[0]["mood"], json!("happy"));
    }
}
