//! Native client trait for in-process data access
//!
//! Callers that only need rows (not live instances) go through this trait.
//! Rows are returned in their external form: obfuscated columns come back
//! obfuscated. Failures are returned and also recorded on the user context.

use super::context::UserContext;
use super::error::Result;
use super::model::{Row, Value};
use async_trait::async_trait;

/// Row-level data access API
#[async_trait]
pub trait VelosurfApi: Send + Sync {
    /// Fetch one row of `entity` by its primary-key values
    async fn fetch_row(
        &self,
        entity: &str,
        key: &[Value],
        ctx: &UserContext,
    ) -> Result<Option<Row>>;

    /// All rows of `entity`, optionally refined and ordered
    async fn query_rows(
        &self,
        entity: &str,
        refinements: &[String],
        order: Option<&str>,
        ctx: &UserContext,
    ) -> Result<Vec<Row>>;

    /// Evaluate a scalar attribute; `entity` of `None` targets the root
    async fn evaluate(
        &self,
        entity: Option<&str>,
        attribute: &str,
        params: &Row,
        ctx: &UserContext,
    ) -> Result<Value>;

    /// Validate then insert a row; `Ok(false)` when validation failed
    async fn insert_row(&self, entity: &str, row: Row, ctx: &UserContext) -> Result<bool>;

    /// Update the row identified by the key columns present in `row`
    async fn update_row(&self, entity: &str, row: Row, ctx: &UserContext) -> Result<()>;

    /// Delete the row identified by the key columns present in `row`
    async fn delete_row(&self, entity: &str, row: Row, ctx: &UserContext) -> Result<()>;

    /// Perform an action; `entity` of `None` targets the root
    async fn perform(
        &self,
        entity: Option<&str>,
        action: &str,
        params: &Row,
        ctx: &UserContext,
    ) -> Result<u64>;
}
