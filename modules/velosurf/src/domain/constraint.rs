//! Field constraints checked before a row is written

use crate::config::ConstraintConfig;
use crate::contract::{render_value, Result, Value, VelosurfError};
use super::repository::RowRepository;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").ok()
});

/// One validation rule
#[derive(Debug, Clone)]
pub enum Constraint {
    NotNull,
    NotEmpty,
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    DateRange {
        after: Option<NaiveDate>,
        before: Option<NaiveDate>,
        format: String,
    },
    Pattern(Regex),
    OneOf(Vec<String>),
    /// Value must exist in `table.column`
    Reference {
        table: String,
        column: String,
    },
    Email,
}

impl Constraint {
    pub fn pattern(column: &str, pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| VelosurfError::InvalidConstraint {
                column: column.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn date_range(
        column: &str,
        after: Option<&str>,
        before: Option<&str>,
        format: &str,
    ) -> Result<Self> {
        let parse = |text: &str| {
            NaiveDate::parse_from_str(text, format).map_err(|e| VelosurfError::InvalidConstraint {
                column: column.to_string(),
                reason: format!("bad date '{}': {}", text, e),
            })
        };
        Ok(Self::DateRange {
            after: after.map(&parse).transpose()?,
            before: before.map(&parse).transpose()?,
            format: format.to_string(),
        })
    }

    /// Build from configuration; regexes and dates are checked here
    pub fn from_config(column: &str, config: &ConstraintConfig) -> Result<Self> {
        Ok(match config {
            ConstraintConfig::NotNull => Self::NotNull,
            ConstraintConfig::NotEmpty => Self::NotEmpty,
            ConstraintConfig::Length { min, max } => Self::Length {
                min: *min,
                max: *max,
            },
            ConstraintConfig::Range { min, max } => Self::Range {
                min: *min,
                max: *max,
            },
            ConstraintConfig::DateRange {
                after,
                before,
                format,
            } => Self::date_range(column, after.as_deref(), before.as_deref(), format)?,
            ConstraintConfig::Regex(pattern) => Self::pattern(column, pattern)?,
            ConstraintConfig::OneOf(values) => Self::OneOf(values.clone()),
            ConstraintConfig::Reference { table, column } => Self::Reference {
                table: table.clone(),
                column: column.clone(),
            },
            ConstraintConfig::Email => Self::Email,
        })
    }

    /// Whether `value` satisfies the rule
    ///
    /// Null passes every rule except `NotNull` and `NotEmpty`.
    pub async fn check(&self, repository: &dyn RowRepository, value: &Value) -> Result<bool> {
        let Some(text) = render_value(value) else {
            return Ok(!matches!(self, Self::NotNull | Self::NotEmpty));
        };
        let ok = match self {
            Self::NotNull => true,
            Self::NotEmpty => !text.trim().is_empty(),
            Self::Length { min, max } => {
                let len = text.chars().count();
                min.map_or(true, |m| len >= m) && max.map_or(true, |m| len <= m)
            }
            Self::Range { min, max } => match value.as_f64().or_else(|| text.trim().parse().ok()) {
                Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
                None => false,
            },
            Self::DateRange {
                after,
                before,
                format,
            } => match NaiveDate::parse_from_str(text.trim(), format) {
                Ok(date) => {
                    after.map_or(true, |a| date >= a) && before.map_or(true, |b| date <= b)
                }
                Err(_) => false,
            },
            Self::Pattern(regex) => regex.is_match(&text),
            Self::OneOf(values) => values.iter().any(|v| *v == text),
            Self::Reference { table, column } => {
                let sql = format!("select 1 from {} where {}=? limit 1", table, column);
                !repository
                    .query_rows(&sql, std::slice::from_ref(value))
                    .await?
                    .is_empty()
            }
            Self::Email => EMAIL.as_ref().is_some_and(|r| r.is_match(text.trim())),
        };
        Ok(ok)
    }

    /// Human-readable reason used in validation messages
    pub fn describe(&self) -> String {
        match self {
            Self::NotNull => "cannot be null".to_string(),
            Self::NotEmpty => "cannot be empty".to_string(),
            Self::Length { min, max } => match (min, max) {
                (Some(a), Some(b)) => format!("length must be between {} and {}", a, b),
                (Some(a), None) => format!("length must be at least {}", a),
                (None, Some(b)) => format!("length must be at most {}", b),
                (None, None) => "has an invalid length".to_string(),
            },
            Self::Range { min, max } => match (min, max) {
                (Some(a), Some(b)) => format!("must be a number between {} and {}", a, b),
                (Some(a), None) => format!("must be a number not less than {}", a),
                (None, Some(b)) => format!("must be a number not greater than {}", b),
                (None, None) => "must be a number".to_string(),
            },
            Self::DateRange { after, before, format } => match (after, before) {
                (Some(a), Some(b)) => format!(
                    "must be a date between {} and {}",
                    a.format(format),
                    b.format(format)
                ),
                (Some(a), None) => format!("must be a date not before {}", a.format(format)),
                (None, Some(b)) => format!("must be a date not after {}", b.format(format)),
                (None, None) => format!("must be a date ({})", format),
            },
            Self::Pattern(_) => "has an invalid format".to_string(),
            Self::OneOf(values) => format!("must be one of: {}", values.join(", ")),
            Self::Reference { table, column } => {
                format!("does not reference an existing {}.{}", table, column)
            }
            Self::Email => "is not a valid email address".to_string(),
        }
    }
}

/// A constraint bound to a column
#[derive(Debug, Clone)]
pub struct FieldConstraint {
    pub column: String,
    pub constraint: Constraint,
}

impl FieldConstraint {
    pub fn new(column: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            column: column.into(),
            constraint,
        }
    }

    pub fn message(&self) -> String {
        format!("{}: {}", self.column, self.constraint.describe())
    }
}
