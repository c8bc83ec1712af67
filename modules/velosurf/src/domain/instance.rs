//! Instances: materialized rows, optionally owned by an entity
//!
//! Values are stored under column names. Aliases and obfuscation are applied
//! at the accessors so the stored row is always what the database holds.

use crate::config::CasePolicy;
use crate::contract::{
    render_value, CacheKey, Result, ResultKind, Row, UserContext, Value, VelosurfError,
};
use super::database::Database;
use super::entity::Entity;
use super::query::ParamSource;
use super::rowset::RowSet;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of the generic getter
#[derive(Clone)]
pub enum Resolved {
    /// Stored column or scalar attribute
    Value(Value),
    /// Row attribute
    Row(Option<Arc<Instance>>),
    /// Row-set attribute, memoized per instance
    RowSet(Arc<RowSet>),
    /// Rows affected by a performed action
    Affected(u64),
    /// Entity looked up by name on the database
    Entity(Arc<Entity>),
}

impl Resolved {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_instance(self) -> Option<Arc<Instance>> {
        match self {
            Self::Row(instance) => instance,
            _ => None,
        }
    }

    pub fn into_rowset(self) -> Option<Arc<RowSet>> {
        match self {
            Self::RowSet(rowset) => Some(rowset),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Row(i) => f.debug_tuple("Row").field(&i.as_ref().map(|i| i.to_row())).finish(),
            Self::RowSet(r) => f.debug_tuple("RowSet").field(&r.sql()).finish(),
            Self::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
            Self::Entity(e) => f.debug_tuple("Entity").field(&e.name()).finish(),
        }
    }
}

/// One row of values
pub struct Instance {
    entity: Option<Arc<Entity>>,
    values: RwLock<Row>,
    rowsets: Mutex<HashMap<String, Arc<RowSet>>>,
    // Serializes update/insert/delete on this instance
    write_lock: tokio::sync::Mutex<()>,
}

impl Instance {
    /// Instance with no entity: a plain bag of values
    pub fn detached(row: Row) -> Self {
        Self {
            entity: None,
            values: RwLock::new(row),
            rowsets: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Instance of `entity`; known columns come first, in entity order
    pub(crate) fn bound(entity: Arc<Entity>, row: Row) -> Self {
        // Catalog names come back as stored; entity columns follow the case policy
        let mut row: Row = match entity.case_policy() {
            CasePolicy::Sensitive => row,
            case => row.into_iter().map(|(k, v)| (case.adapt(&k), v)).collect(),
        };
        let mut ordered = Row::with_capacity(row.len());
        for column in entity.columns() {
            if let Some(value) = row.shift_remove(&column.name) {
                ordered.insert(column.name.clone(), value);
            }
        }
        ordered.extend(row);
        Self {
            entity: Some(entity),
            values: RwLock::new(ordered),
            rowsets: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn entity(&self) -> Option<&Arc<Entity>> {
        self.entity.as_ref()
    }

    fn column_name(&self, name: &str) -> String {
        match &self.entity {
            Some(entity) => entity.resolve_column(name),
            None => name.to_string(),
        }
    }

    /// Stored value of a column, as read from the database
    pub fn raw(&self, column: &str) -> Option<Value> {
        self.values.read().get(column).cloned()
    }

    pub fn set_raw(&self, column: impl Into<String>, value: Value) {
        self.values.write().insert(column.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        let column = self.column_name(name);
        self.values.read().contains_key(&column)
    }

    /// Value by column or alias name; obfuscated columns come out obfuscated
    pub fn get_value(&self, name: &str) -> Option<Value> {
        let column = self.column_name(name);
        let value = self.raw(&column)?;
        match &self.entity {
            Some(entity) if entity.is_obfuscated(&column) && !value.is_null() => {
                Some(Value::String(entity.obfuscate(&value)))
            }
            _ => Some(value),
        }
    }

    /// Set a value by column or alias name
    ///
    /// Obfuscated columns are de-obfuscated and values are coerced to the
    /// column type.
    pub fn put(&self, name: &str, value: Value) -> Result<()> {
        let column = self.column_name(name);
        let value = match &self.entity {
            Some(entity) => {
                let value = match value {
                    Value::String(s) if entity.is_obfuscated(&column) => {
                        Value::String(entity.deobfuscate(&s)?)
                    }
                    other => other,
                };
                entity.column_type(&column).coerce(value)
            }
            None => value,
        };
        self.set_raw(column, value);
        Ok(())
    }

    /// Snapshot of the stored values
    pub fn to_row(&self) -> Row {
        self.values.read().clone()
    }

    /// Snapshot with obfuscated columns obfuscated, for callers outside the
    /// application
    pub fn to_external_row(&self) -> Row {
        let row = self.to_row();
        let Some(entity) = &self.entity else {
            return row;
        };
        row.into_iter()
            .map(|(column, value)| {
                if entity.is_obfuscated(&column) && !value.is_null() {
                    let hidden = Value::String(entity.obfuscate(&value));
                    (column, hidden)
                } else {
                    (column, value)
                }
            })
            .collect()
    }

    /// Key tuple, if the entity has key columns and all of them are set
    pub fn primary_key(&self) -> Option<CacheKey> {
        let entity = self.entity.as_ref()?;
        if entity.key_columns().is_empty() {
            return None;
        }
        let values = self.values.read();
        let parts = entity
            .key_columns()
            .iter()
            .map(|k| values.get(k).cloned().unwrap_or(Value::Null))
            .collect::<Vec<_>>();
        CacheKey::from_values(&parts)
    }

    /// Display text of a column, translated through the context when the
    /// column is localized
    pub fn localized(&self, name: &str, ctx: &UserContext) -> Option<String> {
        let column = self.column_name(name);
        let text = render_value(&self.raw(&column)?)?;
        match &self.entity {
            Some(entity) if entity.is_localized(&column) => Some(ctx.localize(&text)),
            _ => Some(text),
        }
    }

    /// Generic getter: stored value, then entity attribute, then entity action
    pub async fn get(&self, db: &Database, name: &str) -> Result<Option<Resolved>> {
        if self.contains(name) {
            return Ok(self.get_value(name).map(Resolved::Value));
        }
        let Some(entity) = &self.entity else {
            return Ok(None);
        };
        if let Some(attribute) = entity.attribute(name) {
            if attribute.kind() == ResultKind::RowSet {
                return self.memoized_rowset(name, || attribute.query(db, self)).map(Some);
            }
            return attribute.resolve(db, self).await.map(Some);
        }
        if let Some(action) = entity.action(name) {
            return action.perform(db, self).await.map(|n| Some(Resolved::Affected(n)));
        }
        Ok(None)
    }

    fn memoized_rowset(
        &self,
        name: &str,
        build: impl FnOnce() -> Result<RowSet>,
    ) -> Result<Resolved> {
        let mut rowsets = self.rowsets.lock();
        if let Some(rowset) = rowsets.get(name) {
            return Ok(Resolved::RowSet(rowset.clone()));
        }
        let rowset = Arc::new(build()?);
        rowsets.insert(name.to_string(), rowset.clone());
        Ok(Resolved::RowSet(rowset))
    }

    /// Drop memoized row sets so the next access re-reads them
    pub fn forget_rowsets(&self) {
        self.rowsets.lock().clear();
    }

    fn require_entity(&self, operation: &str) -> Result<&Arc<Entity>> {
        self.entity.as_ref().ok_or_else(|| {
            VelosurfError::Schema(format!("cannot {} an instance without entity", operation))
        })
    }

    /// Key values in key order; fails before any SQL when one is missing
    fn key_values(&self, entity: &Entity) -> Result<Vec<Value>> {
        if entity.key_columns().is_empty() {
            return Err(VelosurfError::Schema(format!(
                "entity '{}' has no key columns",
                entity.name()
            )));
        }
        let values = self.values.read();
        entity
            .key_columns()
            .iter()
            .map(|column| match values.get(column) {
                Some(value) if !value.is_null() => Ok(value.clone()),
                _ => Err(entity.missing_key(column)),
            })
            .collect()
    }

    fn key_predicate(entity: &Entity) -> String {
        entity
            .key_columns()
            .iter()
            .map(|k| format!("{}=?", k))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Write non-null, non-key values back to the row identified by the key
    pub async fn update(&self, db: &Database) -> Result<()> {
        let entity = self.require_entity("update")?;
        entity.ensure_writable()?;
        let _guard = self.write_lock.lock().await;

        let keys = self.key_values(entity)?;
        let (assignments, mut params) = {
            let values = self.values.read();
            let mut assignments = Vec::new();
            let mut params = Vec::new();
            for (column, value) in values.iter() {
                if value.is_null()
                    || entity.key_columns().contains(column)
                    || !entity.has_column(column)
                {
                    continue;
                }
                assignments.push(format!("{}=?", column));
                params.push(value.clone());
            }
            (assignments, params)
        };
        if assignments.is_empty() {
            debug!(entity = %entity.name(), "nothing to update");
            return Ok(());
        }
        params.extend(keys.iter().cloned());

        let sql = format!(
            "update {} set {} where {}",
            entity.table(),
            assignments.join(", "),
            Self::key_predicate(entity)
        );
        let affected = db.repository().execute(&sql, &params).await?;
        entity.check_affected("update", affected)?;
        if let Some(key) = CacheKey::from_values(&keys) {
            entity.cache().invalidate(&key);
        }
        // Row sets bound to the old values are stale
        self.forget_rowsets();
        Ok(())
    }

    /// Delete the row identified by the key
    pub async fn delete(&self, db: &Database) -> Result<()> {
        let entity = self.require_entity("delete")?;
        entity.ensure_writable()?;
        let _guard = self.write_lock.lock().await;

        let keys = self.key_values(entity)?;
        let sql = format!(
            "delete from {} where {}",
            entity.table(),
            Self::key_predicate(entity)
        );
        let affected = db.repository().execute(&sql, &keys).await?;
        entity.check_affected("delete", affected)?;
        if let Some(key) = CacheKey::from_values(&keys) {
            entity.cache().invalidate(&key);
        }
        Ok(())
    }

    /// Validate, then insert non-null values
    ///
    /// Returns `Ok(false)` without issuing the insert when validation fails;
    /// the messages are on `ctx`. A generated single-column key is read back
    /// into the instance.
    pub async fn insert(self: &Arc<Self>, db: &Database, ctx: &UserContext) -> Result<bool> {
        let entity = self.require_entity("insert")?;
        entity.ensure_writable()?;
        let _guard = self.write_lock.lock().await;

        let row = self.to_row();
        let generated_key = match entity.key_columns() {
            [key] if row.get(key).map_or(true, Value::is_null) => Some(key.as_str()),
            _ => None,
        };
        // Only a single-column key can be left to the database
        for column in entity.key_columns() {
            if Some(column.as_str()) != generated_key && row.get(column).map_or(true, Value::is_null) {
                return Err(entity.missing_key(column));
            }
        }

        if !entity.validate(db, &row, ctx).await? {
            debug!(entity = %entity.name(), "insert rejected by validation");
            return Ok(false);
        }

        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (column, value) in row.iter() {
            if value.is_null() || !entity.has_column(column) {
                continue;
            }
            columns.push(column.as_str());
            params.push(value.clone());
        }

        let sql = if columns.is_empty() {
            format!("insert into {} default values", entity.table())
        } else {
            format!(
                "insert into {} ({}) values ({})",
                entity.table(),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };
        let outcome = db.repository().insert(&sql, &params, generated_key).await?;
        entity.check_affected("insert", outcome.affected)?;
        if let (Some(column), Some(value)) = (generated_key, outcome.generated_key) {
            self.set_raw(column, value);
        }
        self.forget_rowsets();
        if let Some(key) = self.primary_key() {
            entity.cache().put(key, self.clone());
        }
        Ok(true)
    }
}

impl ParamSource for Instance {
    /// Parameters are bound from stored values, never obfuscated ones
    fn param(&self, name: &str) -> Option<Value> {
        self.raw(&self.column_name(name))
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("entity", &self.entity.as_ref().map(|e| e.name().to_string()))
            .field("values", &*self.values.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detached_instance_is_a_value_bag() {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(7));
        let instance = Instance::detached(row);
        assert_eq!(instance.get_value("id"), Some(json!(7)));
        assert!(instance.put("name", json!("Ann")).is_ok());
        assert_eq!(instance.raw("name"), Some(json!("Ann")));
        assert!(instance.primary_key().is_none());
        assert_eq!(instance.param("id"), Some(json!(7)));
    }

    #[test]
    fn test_resolved_accessors() {
        let value = Resolved::Value(json!(3));
        assert_eq!(value.as_value(), Some(&json!(3)));
        assert!(value.clone().into_instance().is_none());
        assert!(Resolved::Affected(1).into_rowset().is_none());
    }
}
