//! Native client implementation - wraps the database model for in-process calls

use crate::contract::{
    Result, Row, UserContext, Value, VelosurfApi, VelosurfError,
};
use crate::domain::{Attribute, Database, Entity};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Native client that calls the database model directly
///
/// Every failure is also recorded on the caller's `UserContext` so a
/// rendering layer can show it.
#[derive(Clone)]
pub struct NativeClient {
    db: Arc<Database>,
}

impl NativeClient {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn report<T>(result: Result<T>, ctx: &UserContext) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, "velosurf call failed");
            ctx.set_error(e.to_string());
        }
        result
    }

    fn owner(&self, entity: Option<&str>) -> Result<&Arc<Entity>> {
        match entity {
            Some(name) => self.db.entity(name),
            None => Ok(self.db.root()),
        }
    }

    fn attribute<'a>(&'a self, entity: Option<&str>, name: &str) -> Result<&'a Arc<Attribute>> {
        let owner = self.owner(entity)?;
        owner
            .attribute(name)
            .ok_or_else(|| VelosurfError::UnknownAttribute {
                entity: owner.name().to_string(),
                attribute: name.to_string(),
            })
    }

    async fn fetch(&self, entity: &str, key: &[Value]) -> Result<Option<Row>> {
        let entity = self.db.entity(entity)?;
        if key.len() != entity.key_columns().len() {
            return Err(VelosurfError::KeyArity {
                entity: entity.name().to_string(),
                count: entity.key_columns().len(),
            });
        }
        let key_row: Row = entity
            .key_columns()
            .iter()
            .cloned()
            .zip(key.iter().cloned())
            .collect();
        Ok(entity
            .fetch_by_row(&self.db, &key_row)
            .await?
            .map(|instance| instance.to_external_row()))
    }

    async fn query(
        &self,
        entity: &str,
        refinements: &[String],
        order: Option<&str>,
    ) -> Result<Vec<Row>> {
        let rowset = self.db.entity(entity)?.all();
        for predicate in refinements {
            rowset.refine(predicate.clone());
        }
        if let Some(order) = order {
            rowset.order_by(order);
        }
        Ok(rowset
            .rows(&self.db)
            .await?
            .map(|instance| instance.to_external_row())
            .collect())
    }

    async fn perform_action(&self, entity: Option<&str>, action: &str, params: &Row) -> Result<u64> {
        let owner = self.owner(entity)?;
        let action = owner
            .action(action)
            .ok_or_else(|| VelosurfError::UnknownAction {
                entity: owner.name().to_string(),
                action: action.to_string(),
            })?;
        action.perform(&self.db, params).await
    }
}

#[async_trait]
impl VelosurfApi for NativeClient {
    async fn fetch_row(
        &self,
        entity: &str,
        key: &[Value],
        ctx: &UserContext,
    ) -> Result<Option<Row>> {
        Self::report(self.fetch(entity, key).await, ctx)
    }

    async fn query_rows(
        &self,
        entity: &str,
        refinements: &[String],
        order: Option<&str>,
        ctx: &UserContext,
    ) -> Result<Vec<Row>> {
        Self::report(self.query(entity, refinements, order).await, ctx)
    }

    async fn evaluate(
        &self,
        entity: Option<&str>,
        attribute: &str,
        params: &Row,
        ctx: &UserContext,
    ) -> Result<Value> {
        let result = match self.attribute(entity, attribute) {
            Ok(attribute) => attribute.evaluate(&self.db, params).await,
            Err(e) => Err(e),
        };
        Self::report(result, ctx)
    }

    async fn insert_row(&self, entity: &str, row: Row, ctx: &UserContext) -> Result<bool> {
        let result = match self.db.entity(entity) {
            Ok(entity) => entity.insert(&self.db, row, ctx).await,
            Err(e) => Err(e),
        };
        Self::report(result, ctx)
    }

    async fn update_row(&self, entity: &str, row: Row, ctx: &UserContext) -> Result<()> {
        let result = match self.db.entity(entity) {
            Ok(entity) => entity.update(&self.db, row).await,
            Err(e) => Err(e),
        };
        Self::report(result, ctx)
    }

    async fn delete_row(&self, entity: &str, row: Row, ctx: &UserContext) -> Result<()> {
        let result = match self.db.entity(entity) {
            Ok(entity) => entity.delete(&self.db, row).await,
            Err(e) => Err(e),
        };
        Self::report(result, ctx)
    }

    async fn perform(
        &self,
        entity: Option<&str>,
        action: &str,
        params: &Row,
        ctx: &UserContext,
    ) -> Result<u64> {
        Self::report(self.perform_action(entity, action, params).await, ctx)
    }
}
