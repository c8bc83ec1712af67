//! Value mappers
//!
//! Conversions between contract values and sea-orm bind values, decoded
//! rows, and the placeholder syntax of each backend.

use crate::contract::{Row, Value};
use base64::Engine;
use sea_orm::prelude::{Date, DateTime, DateTimeWithTimeZone, Decimal, Json, Time, Uuid};
use sea_orm::{DbBackend, QueryResult, Statement};
use tracing::warn;

// ===== Bind values =====

/// Bind value for a non-null contract value
fn to_sea_value(value: &Value) -> sea_orm::Value {
    match value {
        // Not reached through `statement`, which inlines nulls
        Value::Null => sea_orm::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else if let Some(f) = n.as_f64() {
                f.into()
            } else {
                n.to_string().into()
            }
        }
        Value::String(s) => s.clone().into(),
        // Structured values are stored as JSON text
        other => other.to_string().into(),
    }
}

/// Statement with placeholders adapted to `backend`
///
/// Null parameters are written as a `NULL` literal instead of being bound,
/// so the database infers their type from the surrounding expression.
pub fn statement(backend: DbBackend, sql: &str, params: &[Value]) -> Statement {
    let numbered = backend == DbBackend::Postgres;
    let mut params = params.iter();
    let mut values = Vec::new();
    let sql = map_placeholders(sql, |out| match params.next() {
        Some(Value::Null) => out.push_str("NULL"),
        Some(value) => {
            values.push(to_sea_value(value));
            if numbered {
                out.push('$');
                out.push_str(&values.len().to_string());
            } else {
                out.push('?');
            }
        }
        // Missing parameters are left to the database to report
        None => out.push('?'),
    });
    Statement::from_sql_and_values(backend, sql, values)
}

// ===== Placeholders =====

/// Copy `sql`, letting `placeholder` write each `?`; quoted text is left untouched
fn map_placeholders(sql: &str, mut placeholder: impl FnMut(&mut String)) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '?' => placeholder(&mut out),
            None => out.push(c),
        }
    }
    out
}

// ===== Rows =====

/// Decoded row; column order is kept
pub fn decode_row(result: &QueryResult) -> Row {
    result
        .column_names()
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let value = decode_value(result, index, &name);
            (name, value)
        })
        .collect()
}

/// Decode one column, trying the narrowest representation first
///
/// SQLite reports the storage class of the value itself for columns without
/// a declared type (pragma results, aggregates), so the attempts below are
/// checked against what was actually stored.
fn decode_value(result: &QueryResult, index: usize, name: &str) -> Value {
    macro_rules! attempt {
        ($ty:ty, $convert:expr) => {
            match result.try_get_by_index::<Option<$ty>>(index) {
                Ok(Some(v)) => return $convert(v),
                Ok(None) => return Value::Null,
                Err(_) => {}
            }
        };
    }

    attempt!(i64, Value::from);
    attempt!(i32, Value::from);
    attempt!(i16, Value::from);
    attempt!(f64, float);
    attempt!(f32, |f: f32| float(f64::from(f)));
    attempt!(bool, Value::Bool);
    attempt!(String, Value::String);
    attempt!(Decimal, |d: Decimal| d
        .to_string()
        .parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(d.to_string())));
    attempt!(DateTimeWithTimeZone, |t: DateTimeWithTimeZone| Value::String(t.to_rfc3339()));
    attempt!(DateTime, |t: DateTime| Value::String(t.to_string()));
    attempt!(Date, |d: Date| Value::String(d.to_string()));
    attempt!(Time, |t: Time| Value::String(t.to_string()));
    attempt!(Uuid, |u: Uuid| Value::String(u.to_string()));
    attempt!(Json, |j: Json| j);
    attempt!(Vec<u8>, |b: Vec<u8>| Value::String(
        base64::engine::general_purpose::STANDARD.encode(b)
    ));

    warn!(column = name, "undecodable column value read as null");
    Value::Null
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
