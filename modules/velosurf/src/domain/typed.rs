//! Typed row binding
//!
//! Application structs implement `RowBackedObject` (usually through the
//! serde helpers below) and are read and written through a `TypedEntity`.

use crate::contract::{Result, Row, UserContext, Value, VelosurfError};
use super::database::Database;
use super::entity::Entity;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// A struct backed by one row of an entity
pub trait RowBackedObject: Sized + Send + Sync {
    fn from_row(row: &Row) -> Result<Self>;

    fn to_row(&self) -> Result<Row>;

    /// Called before the object is inserted
    fn before_insert(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called before the object is written back
    fn before_update(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Deserialize a struct from a row; columns map to fields by name
pub fn row_to_struct<T: DeserializeOwned>(row: &Row) -> Result<T> {
    let object = Value::Object(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(object).map_err(|e| VelosurfError::Mapping(e.to_string()))
}

/// Serialize a struct into a row; the struct must serialize as a map
pub fn struct_to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value).map_err(|e| VelosurfError::Mapping(e.to_string()))? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(VelosurfError::Mapping(format!(
            "expected a map of columns, got {}",
            other
        ))),
    }
}

/// Entity bound to a row-backed type
pub struct TypedEntity<T> {
    entity: Arc<Entity>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RowBackedObject> TypedEntity<T> {
    pub(crate) fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            _marker: PhantomData,
        }
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    pub async fn fetch(&self, db: &Database, key: &[Value]) -> Result<Option<T>> {
        match self.entity.fetch(db, key).await? {
            Some(instance) => T::from_row(&instance.to_row()).map(Some),
            None => Ok(None),
        }
    }

    pub async fn fetch_by_value(&self, db: &Database, key: Value) -> Result<Option<T>> {
        match self.entity.fetch_by_value(db, key).await? {
            Some(instance) => T::from_row(&instance.to_row()).map(Some),
            None => Ok(None),
        }
    }

    /// Insert `object`; on success it is refreshed with the stored values
    /// (generated key included)
    pub async fn insert(&self, db: &Database, object: &mut T, ctx: &UserContext) -> Result<bool> {
        object.before_insert()?;
        let instance = self.entity.new_instance_from(object.to_row()?)?;
        if !instance.insert(db, ctx).await? {
            return Ok(false);
        }
        *object = T::from_row(&instance.to_row())?;
        Ok(true)
    }

    pub async fn update(&self, db: &Database, object: &mut T) -> Result<()> {
        object.before_update()?;
        self.entity.update(db, object.to_row()?).await
    }

    pub async fn delete(&self, db: &Database, object: &T) -> Result<()> {
        self.entity.delete(db, object.to_row()?).await
    }

    /// Every row of the entity
    pub async fn all(&self, db: &Database) -> Result<Vec<T>> {
        self.entity
            .all()
            .rows(db)
            .await?
            .map(|instance| T::from_row(&instance.to_row()))
            .collect()
    }
}
