//! Repository trait for SQL execution
//!
//! The domain layer builds SQL with `?` placeholders; implementations adapt
//! it to their dialect and run it. Implementations are in
//! infra/storage/repositories.rs

use crate::contract::{Result, Row, Value};
use super::query::BoundStatement;
use async_trait::async_trait;

/// Column description read from the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
}

/// Foreign key from the described table to `target_table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub target_table: String,
    /// Referencing columns, in constraint order
    pub columns: Vec<String>,
    /// Referenced column of each referencing column; empty when the catalog
    /// leaves them implied (the target's primary key)
    pub target_columns: Vec<String>,
}

/// Table description read from the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Outcome of an insert
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub affected: u64,
    /// Value of the generated key column, when one was requested
    pub generated_key: Option<Value>,
}

/// SQL execution backend
#[async_trait]
pub trait RowRepository: Send + Sync {
    /// Run a query and decode every row, preserving column order
    async fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// First row of a query, if any
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query_rows(sql, params).await?.into_iter().next())
    }

    /// First column of the first row; `Null` when the query returns nothing
    async fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        Ok(self
            .query_one(sql, params)
            .await?
            .and_then(|row| row.into_iter().next().map(|(_, v)| v))
            .unwrap_or(Value::Null))
    }

    /// Run a statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run an insert, reading back `generated_key` when given
    async fn insert(
        &self,
        sql: &str,
        params: &[Value],
        generated_key: Option<&str>,
    ) -> Result<InsertOutcome>;

    /// Run statements atomically, serialized against other transactions
    async fn execute_transaction(&self, statements: &[BoundStatement]) -> Result<u64>;

    /// Describe every user table
    async fn describe_tables(&self) -> Result<Vec<TableInfo>>;

    /// Number of statements issued so far
    fn statements_issued(&self) -> u64;

    /// Close the underlying connections
    async fn close(&self) -> Result<()>;
}
