//! Entities: metadata of one mapped table and the operations over its rows
//!
//! An entity is mutable while the database is being built and frozen behind
//! an `Arc` afterwards. Everything that creates instances takes
//! `self: &Arc<Self>` so the instances can point back at their entity.

use crate::config::CasePolicy;
use crate::contract::{
    render_value, CacheKey, ColumnType, Result, Row, UserContext, Value, VelosurfError,
};
use super::action::Action;
use super::attribute::Attribute;
use super::cache::{Cache, CachingPolicy};
use super::constraint::FieldConstraint;
use super::cryptograph::{Cryptograph, KeystreamCryptograph};
use super::database::Database;
use super::instance::Instance;
use super::rowset::RowSet;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, warn};

/// A mapped column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

pub struct Entity {
    name: String,
    table: String,
    columns: Vec<Column>,
    key_columns: Vec<String>,
    // alias -> column
    aliases: IndexMap<String, String>,
    read_only: bool,
    cache: Cache,
    obfuscated: HashSet<String>,
    localized: HashSet<String>,
    attributes: IndexMap<String, Arc<Attribute>>,
    actions: IndexMap<String, Arc<Action>>,
    constraints: Vec<FieldConstraint>,
    fetch_query: OnceCell<String>,
    cryptograph: Arc<dyn Cryptograph>,
    case: CasePolicy,
}

impl Entity {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            key_columns: Vec::new(),
            aliases: IndexMap::new(),
            read_only: true,
            cache: Cache::new(CachingPolicy::None),
            obfuscated: HashSet::new(),
            localized: HashSet::new(),
            attributes: IndexMap::new(),
            actions: IndexMap::new(),
            constraints: Vec::new(),
            fetch_query: OnceCell::new(),
            cryptograph: Arc::new(KeystreamCryptograph::default()),
            case: CasePolicy::Sensitive,
        }
    }

    // ---- schema loading ----

    pub fn add_column(&mut self, name: impl Into<String>, column_type: ColumnType) {
        let name = name.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.column_type = column_type,
            None => self.columns.push(Column { name, column_type }),
        }
    }

    /// Keep exactly `names`, in that order; known column types are kept
    pub fn replace_columns(&mut self, names: &[String]) {
        self.columns = names
            .iter()
            .map(|name| Column {
                name: name.clone(),
                column_type: self.column_type(name),
            })
            .collect();
    }

    pub fn add_key_column(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.key_columns.contains(&name) {
            self.key_columns.push(name);
        }
    }

    pub fn clear_key_columns(&mut self) {
        self.key_columns.clear();
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, column: impl Into<String>) {
        self.aliases.insert(alias.into(), column.into());
    }

    /// Register an attribute; a second definition of the same name is ignored
    pub fn add_attribute(&mut self, mut attribute: Attribute) -> bool {
        if self.attributes.contains_key(attribute.name()) {
            warn!(
                entity = %self.name,
                attribute = %attribute.name(),
                "attribute already defined, keeping the first definition"
            );
            return false;
        }
        attribute.owner = self.name.clone();
        self.attributes
            .insert(attribute.name().to_string(), Arc::new(attribute));
        true
    }

    /// Register an action; a second definition of the same name is ignored
    pub fn add_action(&mut self, mut action: Action) -> bool {
        if self.actions.contains_key(action.name()) {
            warn!(
                entity = %self.name,
                action = %action.name(),
                "action already defined, keeping the first definition"
            );
            return false;
        }
        action.owner = self.name.clone();
        self.actions.insert(action.name().to_string(), Arc::new(action));
        true
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn set_caching(&mut self, policy: CachingPolicy) {
        self.cache = Cache::new(policy);
    }

    pub fn add_obfuscated(&mut self, column: impl Into<String>) {
        self.obfuscated.insert(column.into());
    }

    pub fn add_localized(&mut self, column: impl Into<String>) {
        self.localized.insert(column.into());
    }

    pub fn add_constraint(&mut self, constraint: FieldConstraint) {
        self.constraints.push(constraint);
    }

    pub fn set_cryptograph(&mut self, cryptograph: Arc<dyn Cryptograph>) {
        self.cryptograph = cryptograph;
    }

    pub fn set_case_policy(&mut self, case: CasePolicy) {
        self.case = case;
    }

    // ---- metadata ----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn case_policy(&self) -> CasePolicy {
        self.case
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn aliases(&self) -> &IndexMap<String, String> {
        &self.aliases
    }

    /// Aliases defined for one column
    pub fn aliases_of(&self, column: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(_, c)| c.as_str() == column)
            .map(|(a, _)| a.as_str())
            .collect()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn caching(&self) -> CachingPolicy {
        self.cache.policy()
    }

    pub fn is_obfuscated(&self, column: &str) -> bool {
        self.obfuscated.contains(column)
    }

    pub fn is_localized(&self, column: &str) -> bool {
        self.localized.contains(column)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Arc<Attribute>> {
        self.attributes.values()
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.attributes
            .get(name)
            .or_else(|| self.attributes.get(&self.case.adapt(name)))
    }

    pub fn actions(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values()
    }

    pub fn action(&self, name: &str) -> Option<&Arc<Action>> {
        self.actions
            .get(name)
            .or_else(|| self.actions.get(&self.case.adapt(name)))
    }

    pub fn constraints(&self) -> &[FieldConstraint] {
        &self.constraints
    }

    /// Whether `column` can be written; entities without declared columns
    /// accept any column
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c.name == column)
    }

    pub fn column_type(&self, column: &str) -> ColumnType {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.column_type)
            .unwrap_or_default()
    }

    /// Column name for a column or alias name
    pub fn resolve_column(&self, name: &str) -> String {
        if let Some(column) = self.aliases.get(name) {
            return column.clone();
        }
        if self.columns.iter().any(|c| c.name == name) {
            return name.to_string();
        }
        self.case.adapt(name)
    }

    /// `select * from <table> where <k1>=? and <k2>=?`, built once
    pub fn fetch_query(&self) -> &str {
        self.fetch_query.get_or_init(|| {
            let predicate = self
                .key_columns
                .iter()
                .map(|k| format!("{}=?", k))
                .collect::<Vec<_>>()
                .join(" and ");
            format!("select * from {} where {}", self.table, predicate)
        })
    }

    // ---- obfuscation ----

    /// Obfuscated text of a value; non-string values are rendered first
    pub fn obfuscate(&self, value: &Value) -> String {
        self.cryptograph
            .obfuscate(&render_value(value).unwrap_or_default())
    }

    pub fn deobfuscate(&self, value: &str) -> Result<String> {
        self.cryptograph.deobfuscate(value)
    }

    // ---- integrity helpers ----

    pub(crate) fn missing_key(&self, column: &str) -> VelosurfError {
        error!(entity = %self.name, column, "missing value for key column");
        VelosurfError::MissingKey {
            entity: self.name.clone(),
            column: column.to_string(),
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(VelosurfError::ReadOnly(self.name.clone()));
        }
        Ok(())
    }

    /// More than one affected row is an error; none is only logged
    pub(crate) fn check_affected(&self, operation: &'static str, affected: u64) -> Result<()> {
        match affected {
            0 => {
                warn!(entity = %self.name, operation, "no row affected");
                Ok(())
            }
            1 => Ok(()),
            _ => {
                error!(entity = %self.name, operation, affected, "integrity violation");
                Err(VelosurfError::IntegrityViolation {
                    entity: self.name.clone(),
                    operation,
                    affected,
                })
            }
        }
    }

    fn single_key(&self) -> Result<&str> {
        match self.key_columns.as_slice() {
            [key] => Ok(key),
            keys => Err(VelosurfError::KeyArity {
                entity: self.name.clone(),
                count: keys.len(),
            }),
        }
    }

    /// Key values in key order, looked up by column or alias name
    pub fn key_values(&self, row: &Row) -> Vec<Value> {
        self.key_columns
            .iter()
            .map(|column| {
                row.get(column)
                    .or_else(|| {
                        self.aliases_of(column)
                            .into_iter()
                            .find_map(|alias| row.get(alias))
                    })
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    // ---- instances ----

    /// Unsaved instance with no values
    pub fn new_instance(self: &Arc<Self>) -> Arc<Instance> {
        Arc::new(Instance::bound(self.clone(), Row::new()))
    }

    /// Unsaved instance from external values (alias names, obfuscated keys
    /// and string-typed numbers accepted)
    pub fn new_instance_from(self: &Arc<Self>, row: Row) -> Result<Arc<Instance>> {
        let instance = Instance::bound(self.clone(), Row::new());
        for (name, value) in row {
            instance.put(&name, value)?;
        }
        Ok(Arc::new(instance))
    }

    /// Instance for a row read from the database, resolved through the cache
    ///
    /// An instance already cached under the same key is returned as-is.
    pub fn instance_from_row(self: &Arc<Self>, row: Row) -> Arc<Instance> {
        let instance = Instance::bound(self.clone(), row);
        if !self.cache.is_enabled() {
            return Arc::new(instance);
        }
        let Some(key) = instance.primary_key() else {
            return Arc::new(instance);
        };
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }
        let instance = Arc::new(instance);
        self.cache.put(key, instance.clone());
        instance
    }

    // ---- fetching ----

    /// Fetch by key values in key order; the cache is consulted first
    pub async fn fetch(
        self: &Arc<Self>,
        db: &Database,
        key_values: &[Value],
    ) -> Result<Option<Arc<Instance>>> {
        if key_values.len() != self.key_columns.len() || self.key_columns.is_empty() {
            return Err(VelosurfError::KeyArity {
                entity: self.name.clone(),
                count: self.key_columns.len(),
            });
        }
        let params = self
            .key_columns
            .iter()
            .zip(key_values)
            .map(|(column, value)| {
                if value.is_null() {
                    return Err(self.missing_key(column));
                }
                Ok(self.column_type(column).coerce(value.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(key) = CacheKey::from_values(&params) {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(Some(cached));
            }
        }

        let row = db.repository().query_one(self.fetch_query(), &params).await?;
        Ok(row.map(|row| self.instance_from_row(row)))
    }

    /// Fetch by the value of the single key column
    pub async fn fetch_by_value(
        self: &Arc<Self>,
        db: &Database,
        value: Value,
    ) -> Result<Option<Arc<Instance>>> {
        let key = self.single_key()?;
        let value = self.external_key_value(key, value)?;
        self.fetch(db, &[value]).await
    }

    /// Fetch by the key columns found in `row` (column or alias names)
    pub async fn fetch_by_row(
        self: &Arc<Self>,
        db: &Database,
        row: &Row,
    ) -> Result<Option<Arc<Instance>>> {
        let values = self
            .key_columns
            .iter()
            .zip(self.key_values(row))
            .map(|(column, value)| self.external_key_value(column, value))
            .collect::<Result<Vec<_>>>()?;
        self.fetch(db, &values).await
    }

    fn external_key_value(&self, key: &str, value: Value) -> Result<Value> {
        match value {
            Value::String(s) if self.is_obfuscated(key) => {
                Ok(Value::String(self.deobfuscate(&s)?))
            }
            other => Ok(other),
        }
    }

    /// Every row of the table, as a lazy row set
    pub fn all(&self) -> RowSet {
        RowSet::new(
            format!("select * from {}", self.table),
            Vec::new(),
            Some(self.name.clone()),
        )
    }

    // ---- mutations ----

    pub async fn insert(self: &Arc<Self>, db: &Database, row: Row, ctx: &UserContext) -> Result<bool> {
        self.ensure_writable()?;
        let instance = self.new_instance_from(row)?;
        instance.insert(db, ctx).await
    }

    pub async fn update(self: &Arc<Self>, db: &Database, row: Row) -> Result<()> {
        self.ensure_writable()?;
        self.new_instance_from(row)?.update(db).await
    }

    pub async fn delete(self: &Arc<Self>, db: &Database, row: Row) -> Result<()> {
        self.ensure_writable()?;
        self.new_instance_from(row)?.delete(db).await
    }

    /// Update the row whose single key column equals `key`
    pub async fn update_by_value(
        self: &Arc<Self>,
        db: &Database,
        key: Value,
        changes: Row,
    ) -> Result<()> {
        self.ensure_writable()?;
        let column = self.single_key()?.to_string();
        let instance = self.new_instance_from(changes)?;
        instance.put(&column, key)?;
        instance.update(db).await
    }

    /// Delete the row whose single key column equals `key`
    pub async fn delete_by_value(self: &Arc<Self>, db: &Database, key: Value) -> Result<()> {
        self.ensure_writable()?;
        let column = self.single_key()?.to_string();
        let instance = self.new_instance();
        instance.put(&column, key)?;
        instance.delete(db).await
    }

    /// Check every constraint against `row`; violations are recorded on `ctx`
    pub async fn validate(&self, db: &Database, row: &Row, ctx: &UserContext) -> Result<bool> {
        let mut valid = true;
        for field in &self.constraints {
            let value = row
                .get(&field.column)
                .or_else(|| {
                    self.aliases_of(&field.column)
                        .into_iter()
                        .find_map(|alias| row.get(alias))
                })
                .cloned()
                .unwrap_or(Value::Null);
            if !field
                .constraint
                .check(&**db.repository(), &value)
                .await?
            {
                ctx.add_validation_error(field.column.clone(), &field.message());
                valid = false;
            }
        }
        Ok(valid)
    }

    // ---- cache ----

    pub fn invalidate(&self, key: &[Value]) -> bool {
        CacheKey::from_values(key).is_some_and(|k| self.cache.invalidate(&k))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("key_columns", &self.key_columns)
            .field("read_only", &self.read_only)
            .field("caching", &self.cache.policy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ResultKind;
    use serde_json::json;

    fn book() -> Entity {
        let mut entity = Entity::new("book", "book");
        entity.add_column("book_id", ColumnType::Integer);
        entity.add_column("title", ColumnType::Text);
        entity.add_column("author_id", ColumnType::Integer);
        entity.add_key_column("book_id");
        entity.add_alias("id", "book_id");
        entity
    }

    #[test]
    fn test_fetch_query_follows_key_order() {
        let mut entity = Entity::new("loan", "loan");
        entity.add_key_column("book_id");
        entity.add_key_column("member_id");
        assert_eq!(
            entity.fetch_query(),
            "select * from loan where book_id=? and member_id=?"
        );
    }

    #[test]
    fn test_first_attribute_definition_wins() {
        let mut entity = book();
        assert!(entity.add_attribute(Attribute::new("n", ResultKind::Scalar, "select 1")));
        assert!(!entity.add_attribute(Attribute::new("n", ResultKind::Row, "select 2")));
        let kept = entity.attribute("n").unwrap();
        assert_eq!(kept.kind(), ResultKind::Scalar);
        assert_eq!(kept.owner(), "book");
    }

    #[test]
    fn test_alias_resolution_and_key_values() {
        let entity = book();
        assert_eq!(entity.resolve_column("id"), "book_id");
        assert_eq!(entity.resolve_column("title"), "title");

        let mut row = Row::new();
        row.insert("id".to_string(), json!(5));
        assert_eq!(entity.key_values(&row), vec![json!(5)]);
    }

    #[test]
    fn test_new_instance_coerces_and_orders() {
        let entity = Arc::new(book());
        let mut row = Row::new();
        row.insert("title".to_string(), json!("Dune"));
        row.insert("id".to_string(), json!("12"));
        let instance = entity.new_instance_from(row).unwrap();
        let stored = instance.to_row();
        assert_eq!(stored.get("book_id"), Some(&json!(12)));
        assert_eq!(instance.primary_key().map(|k| k.to_string()), Some("[12]".to_string()));
    }

    #[test]
    fn test_obfuscated_column_round_trip() {
        let mut entity = book();
        entity.add_obfuscated("book_id");
        let entity = Arc::new(entity);
        let hidden = entity.obfuscate(&json!(12));
        let mut row = Row::new();
        row.insert("book_id".to_string(), json!(hidden.clone()));
        let instance = entity.new_instance_from(row).unwrap();
        assert_eq!(instance.raw("book_id"), Some(json!(12)));
        assert_eq!(instance.get_value("id"), Some(json!(hidden)));
    }

    #[test]
    fn test_check_affected() {
        let entity = book();
        assert!(entity.check_affected("update", 0).is_ok());
        assert!(entity.check_affected("update", 1).is_ok());
        assert!(matches!(
            entity.check_affected("delete", 2),
            Err(VelosurfError::IntegrityViolation { affected: 2, .. })
        ));
    }

    #[test]
    fn test_read_only_by_default() {
        let mut entity = book();
        assert!(matches!(entity.ensure_writable(), Err(VelosurfError::ReadOnly(_))));
        entity.set_read_only(false);
        assert!(entity.ensure_writable().is_ok());
    }
}
