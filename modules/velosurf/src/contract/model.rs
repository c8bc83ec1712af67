//! Contract models for rows and keys
//!
//! Column values are JSON values so that any SQL scalar can be carried
//! without a static row type. Rows keep their column order.

use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// A single column value
pub type Value = serde_json::Value;

/// One materialized row, in column order
pub type Row = IndexMap<String, Value>;

/// What an attribute yields when evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultKind {
    /// Declared without a result kind; cannot be evaluated
    #[default]
    Undefined,
    /// At most one row
    Row,
    /// Any number of rows
    RowSet,
    /// A single value (first column of the first row)
    Scalar,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::Row => "row",
            Self::RowSet => "rowset",
            Self::Scalar => "scalar",
        };
        f.write_str(name)
    }
}

impl FromStr for ResultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "undefined" => Ok(Self::Undefined),
            "row" => Ok(Self::Row),
            "rowset" | "row_set" => Ok(Self::RowSet),
            "scalar" => Ok(Self::Scalar),
            other => Err(format!("unknown result kind '{}'", other)),
        }
    }
}

/// Storage class of a column, inferred from its declared SQL type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
    #[default]
    Other,
}

impl ColumnType {
    /// Infer the column type from a declared SQL type name
    ///
    /// Follows the SQLite affinity rules, which also cover the common
    /// PostgreSQL type names.
    pub fn from_sql_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("BOOL") {
            Self::Boolean
        } else if upper.contains("INT") || upper.contains("SERIAL") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("NUMERIC")
            || upper.contains("DECIMAL")
        {
            Self::Real
        } else {
            Self::Other
        }
    }

    /// Convert an externally supplied value to this column's storage class
    ///
    /// Values that cannot be converted are returned unchanged and left to the
    /// database to reject.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (Self::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::from(i),
                Err(_) => Value::String(s),
            },
            (Self::Real, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) => serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::String(s)),
                Err(_) => Value::String(s),
            },
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Value::Bool(true),
                "false" | "f" | "no" | "0" => Value::Bool(false),
                _ => Value::String(s),
            },
            (Self::Text, Value::Number(n)) => Value::String(n.to_string()),
            (Self::Text, Value::Bool(b)) => Value::String(b.to_string()),
            (_, value) => value,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Canonical text rendering of a value; `None` for SQL NULL
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Primary-key tuple identifying one cached row
///
/// Parts are compared through their canonical rendering, so the string
/// `"42"` and the number `42` address the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// Build a key from values in key-column order; `None` if any part is null
    pub fn from_values(values: &[Value]) -> Option<Self> {
        values
            .iter()
            .map(render_value)
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
