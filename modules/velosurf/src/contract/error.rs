//! Contract error types
//!
//! One error enum covers schema definition problems, query-shape mismatches,
//! integrity violations and database failures. Soft anomalies (null
//! parameters, zero affected rows) are only logged and never surface here.

use super::model::ResultKind;

/// Velosurf errors
#[derive(Debug, thiserror::Error)]
pub enum VelosurfError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("no database opened as '{0}'")]
    UnknownDatabase(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown attribute '{attribute}' on entity '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("unknown action '{action}' on entity '{entity}'")]
    UnknownAction { entity: String, action: String },

    #[error("attribute '{attribute}' yields a {actual}, it cannot be used as a {expected}")]
    KindMismatch {
        attribute: String,
        expected: ResultKind,
        actual: ResultKind,
    },

    #[error("entity '{entity}': missing value for key column '{column}'")]
    MissingKey { entity: String, column: String },

    #[error("entity '{entity}' has {count} key column(s), single-value access needs exactly one")]
    KeyArity { entity: String, count: usize },

    #[error("entity '{entity}': {operation} affected {affected} rows, expected at most one")]
    IntegrityViolation {
        entity: String,
        operation: &'static str,
        affected: u64,
    },

    #[error("entity '{0}' is read-only")]
    ReadOnly(String),

    #[error("cannot de-obfuscate value: {0}")]
    Obfuscation(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid constraint on column '{column}': {reason}")]
    InvalidConstraint { column: String, reason: String },

    #[error("row mapping failed: {0}")]
    Mapping(String),
}

impl From<figment::Error> for VelosurfError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, VelosurfError>;
