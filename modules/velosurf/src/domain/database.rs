//! Database: the frozen model of entities over one connection pool
//!
//! `DatabaseBuilder` reads the catalog, overlays the configured schema,
//! derives keys from foreign keys, checks that every referenced entity
//! exists, freezes the entities and preloads fully cached tables.

use crate::config::{CasePolicy, Config, DatabaseConfig, ReverseMode, SchemaConfig};
use crate::contract::{ColumnType, Result, Row, Value, VelosurfError};
use crate::infra::storage::SeaOrmRowRepository;
use super::action::Action;
use super::attribute::{Attribute, AttributeSource};
use super::cache::CachingPolicy;
use super::cryptograph::{Cryptograph, KeystreamCryptograph};
use super::entity::Entity;
use super::instance::{Instance, Resolved};
use super::repository::{ForeignKeyInfo, RowRepository, TableInfo};
use super::schema;
use super::typed::{RowBackedObject, TypedEntity};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name of the pseudo-entity holding database-level attributes and actions
pub const ROOT_ENTITY: &str = "velosurf.root";

pub struct Database {
    repository: Arc<dyn RowRepository>,
    entities: IndexMap<String, Arc<Entity>>,
    root: Arc<Entity>,
    case: CasePolicy,
    cryptograph: Arc<dyn Cryptograph>,
}

impl Database {
    pub fn builder(repository: Arc<dyn RowRepository>) -> DatabaseBuilder {
        DatabaseBuilder::new(repository)
    }

    /// Connect with `config.database` and build the configured model
    pub async fn connect(config: &Config) -> Result<Self> {
        let repository = SeaOrmRowRepository::connect(&config.database).await?;
        DatabaseBuilder::new(Arc::new(repository))
            .with_config(&config.database)
            .schema(config.schema.clone())
            .build()
            .await
    }

    pub fn repository(&self) -> &Arc<dyn RowRepository> {
        &self.repository
    }

    pub fn case_policy(&self) -> CasePolicy {
        self.case
    }

    pub fn cryptograph(&self) -> &Arc<dyn Cryptograph> {
        &self.cryptograph
    }

    /// Entity by name; names go through the case policy
    pub fn entity(&self, name: &str) -> Result<&Arc<Entity>> {
        self.find_entity(name)
            .ok_or_else(|| VelosurfError::UnknownEntity(name.to_string()))
    }

    pub fn find_entity(&self, name: &str) -> Option<&Arc<Entity>> {
        if name == ROOT_ENTITY {
            return Some(&self.root);
        }
        self.entities
            .get(name)
            .or_else(|| self.entities.get(&self.case.adapt(name)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    /// Pseudo-entity holding database-level attributes and actions
    pub fn root(&self) -> &Arc<Entity> {
        &self.root
    }

    /// Root attribute, root action or entity, in that order
    pub async fn get(&self, name: &str, params: &Row) -> Result<Option<Resolved>> {
        if let Some(attribute) = self.root.attribute(name) {
            return attribute.resolve(self, params).await.map(Some);
        }
        if let Some(action) = self.root.action(name) {
            return action
                .perform(self, params)
                .await
                .map(|n| Some(Resolved::Affected(n)));
        }
        Ok(self
            .find_entity(name)
            .map(|entity| Resolved::Entity(entity.clone())))
    }

    /// Root attribute by name
    pub fn attribute(&self, name: &str) -> Result<&Arc<Attribute>> {
        self.root
            .attribute(name)
            .ok_or_else(|| VelosurfError::UnknownAttribute {
                entity: ROOT_ENTITY.to_string(),
                attribute: name.to_string(),
            })
    }

    /// Root action by name
    pub fn action(&self, name: &str) -> Result<&Arc<Action>> {
        self.root
            .action(name)
            .ok_or_else(|| VelosurfError::UnknownAction {
                entity: ROOT_ENTITY.to_string(),
                action: name.to_string(),
            })
    }

    /// Number of SQL statements issued through this database
    pub fn statements_issued(&self) -> u64 {
        self.repository.statements_issued()
    }

    /// Typed view of an entity
    pub fn typed<T: RowBackedObject>(&self, name: &str) -> Result<TypedEntity<T>> {
        Ok(TypedEntity::new(self.entity(name)?.clone()))
    }

    /// Instance for a row read by a query; rows of a known entity go through
    /// its cache
    pub(crate) fn instance_for(&self, entity: Option<&str>, row: Row) -> Result<Arc<Instance>> {
        match entity {
            Some(name) => Ok(self.entity(name)?.instance_from_row(row)),
            None => Ok(Arc::new(Instance::detached(row))),
        }
    }

    /// Clear every cache and close the pool
    ///
    /// Cached instances point back at their entity, so caches must be
    /// cleared for the model to be dropped.
    pub async fn close(&self) -> Result<()> {
        for entity in self.entities.values() {
            entity.clear_cache();
        }
        self.repository.close().await?;
        info!("database closed");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("case", &self.case)
            .finish()
    }
}

/// Builds a `Database` from the catalog and the configured schema
pub struct DatabaseBuilder {
    repository: Arc<dyn RowRepository>,
    reverse: ReverseMode,
    case: CasePolicy,
    read_only: bool,
    caching: CachingPolicy,
    cryptograph: Arc<dyn Cryptograph>,
    schema: SchemaConfig,
    entities: Vec<Entity>,
    root_attributes: Vec<Attribute>,
    root_actions: Vec<Action>,
}

impl DatabaseBuilder {
    pub fn new(repository: Arc<dyn RowRepository>) -> Self {
        Self {
            repository,
            reverse: ReverseMode::Full,
            case: CasePolicy::Sensitive,
            read_only: true,
            caching: CachingPolicy::None,
            cryptograph: Arc::new(KeystreamCryptograph::default()),
            schema: SchemaConfig::default(),
            entities: Vec::new(),
            root_attributes: Vec::new(),
            root_actions: Vec::new(),
        }
    }

    /// Model-wide settings from the `database` section
    pub fn with_config(self, config: &DatabaseConfig) -> Self {
        self.reverse(config.reverse)
            .case_policy(config.case)
            .read_only(config.read_only)
            .caching(config.caching.into())
            .cryptograph(Arc::new(KeystreamCryptograph::new(&config.seed)))
    }

    pub fn reverse(mut self, mode: ReverseMode) -> Self {
        self.reverse = mode;
        self
    }

    pub fn case_policy(mut self, case: CasePolicy) -> Self {
        self.case = case;
        self
    }

    /// Default read-only flag of every entity
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Default caching policy of every entity
    pub fn caching(mut self, policy: CachingPolicy) -> Self {
        self.caching = policy;
        self
    }

    pub fn cryptograph(mut self, cryptograph: Arc<dyn Cryptograph>) -> Self {
        self.cryptograph = cryptograph;
        self
    }

    pub fn schema(mut self, schema: SchemaConfig) -> Self {
        self.schema = schema;
        self
    }

    /// Entity defined in code, overlaid after the configured schema
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn root_attribute(mut self, attribute: Attribute) -> Self {
        self.root_attributes.push(attribute);
        self
    }

    pub fn root_action(mut self, action: Action) -> Self {
        self.root_actions.push(action);
        self
    }

    pub async fn build(self) -> Result<Database> {
        let case = self.case;
        let mut entities: IndexMap<String, Entity> = IndexMap::new();

        let tables = self.describe().await?;
        for table in &tables {
            let name = case.adapt(&table.name);
            entities.insert(name.clone(), self.entity_from_table(&name, table));
        }

        let configured: HashSet<String> = self
            .schema
            .entities
            .iter()
            .map(|config| case.adapt(&config.name))
            .collect();
        for config in &self.schema.entities {
            let name = case.adapt(&config.name);
            if !entities.contains_key(&name) {
                let table = config.table.as_deref().unwrap_or(&config.name);
                let entity = match tables.iter().find(|t| case.adapt(&t.name) == case.adapt(table)) {
                    Some(described) => {
                        // The table's own entity is superseded unless configured too
                        let table_entity = case.adapt(&described.name);
                        if !configured.contains(&table_entity) {
                            entities.shift_remove(&table_entity);
                        }
                        self.entity_from_table(&name, described)
                    }
                    None => self.new_entity(&name, table),
                };
                entities.insert(name.clone(), entity);
            }
            if let Some(entity) = entities.get_mut(&name) {
                schema::apply_entity_config(entity, config)?;
            }
        }

        if self.reverse == ReverseMode::Full {
            derive_foreign_keys(&mut entities, &tables, case);
        }

        let mut root = self.new_entity(ROOT_ENTITY, "");
        for attribute in &self.schema.root.attributes {
            root.add_attribute(schema::attribute_from_config(ROOT_ENTITY, attribute)?);
        }
        for action in &self.schema.root.actions {
            root.add_action(schema::action_from_config(action));
        }
        for attribute in self.root_attributes {
            root.add_attribute(attribute);
        }
        for action in self.root_actions {
            root.add_action(action);
        }

        for mut entity in self.entities {
            entity.set_cryptograph(self.cryptograph.clone());
            entity.set_case_policy(case);
            let name = entity.name().to_string();
            if entities.insert(name.clone(), entity).is_some() {
                warn!(entity = %name, "entity defined in code replaces the configured one");
            }
        }

        check_references(&entities, &root, case)?;

        let entities: IndexMap<String, Arc<Entity>> = entities
            .into_iter()
            .map(|(name, entity)| (name, Arc::new(entity)))
            .collect();
        let db = Database {
            repository: self.repository,
            entities,
            root: Arc::new(root),
            case,
            cryptograph: self.cryptograph,
        };
        info!(
            entities = db.entities.len(),
            root_attributes = db.root.attributes().count(),
            "database model built"
        );

        preload_full_caches(&db).await;
        Ok(db)
    }

    fn new_entity(&self, name: &str, table: &str) -> Entity {
        let mut entity = Entity::new(name, table);
        entity.set_read_only(self.read_only);
        entity.set_caching(self.caching);
        entity.set_cryptograph(self.cryptograph.clone());
        entity.set_case_policy(self.case);
        entity
    }

    fn entity_from_table(&self, name: &str, table: &TableInfo) -> Entity {
        let mut entity = self.new_entity(name, &table.name);
        for column in &table.columns {
            entity.add_column(
                self.case.adapt(&column.name),
                ColumnType::from_sql_type(&column.sql_type),
            );
        }
        for key in &table.primary_key {
            entity.add_key_column(self.case.adapt(key));
        }
        entity
    }

    /// Catalog tables selected by the reverse-engineering mode
    async fn describe(&self) -> Result<Vec<TableInfo>> {
        if self.reverse == ReverseMode::None {
            return Ok(Vec::new());
        }
        let tables = self.repository.describe_tables().await?;
        debug!(tables = tables.len(), mode = ?self.reverse, "catalog read");
        if self.reverse != ReverseMode::Partial {
            return Ok(tables);
        }
        let configured = self
            .schema
            .entities
            .iter()
            .map(|e| self.case.adapt(e.table.as_deref().unwrap_or(&e.name)))
            .collect::<Vec<_>>();
        let mut selected = Vec::new();
        for table in tables {
            if configured.contains(&self.case.adapt(&table.name)) {
                selected.push(table);
            }
        }
        Ok(selected)
    }
}

/// Imported and exported keys for every catalog foreign key; configured
/// keys of the same name take precedence
fn derive_foreign_keys(entities: &mut IndexMap<String, Entity>, tables: &[TableInfo], case: CasePolicy) {
    for table in tables {
        for fk in &table.foreign_keys {
            let Some(target) = entities_on_table(entities, &fk.target_table, case).into_iter().next() else {
                warn!(table = %table.name, target = %fk.target_table, "foreign key to unmapped table ignored");
                continue;
            };
            let Some(columns) = entities
                .get(&target)
                .and_then(|entity| align_foreign_key(fk, entity.key_columns(), case))
            else {
                warn!(
                    table = %table.name,
                    target = %fk.target_table,
                    "foreign key does not match the target's key columns, ignored"
                );
                continue;
            };

            for source in entities_on_table(entities, &table.name, case) {
                let imported = schema::imported_key_name(&columns, &target);
                if let Some(entity) = entities.get_mut(&source) {
                    if entity.attribute(&imported).is_none() {
                        entity.add_attribute(Attribute::imported_key(
                            imported,
                            target.clone(),
                            columns.clone(),
                        ));
                    }
                }

                let exported = case.adapt(&schema::plural(&source));
                if let Some(entity) = entities.get_mut(&target) {
                    if entity.attribute(&exported).is_none() {
                        entity.add_attribute(Attribute::exported_key(
                            exported,
                            source.clone(),
                            columns.clone(),
                        ));
                    }
                }
            }
        }
    }
}

/// Names of the entities mapped on `table`
fn entities_on_table(entities: &IndexMap<String, Entity>, table: &str, case: CasePolicy) -> Vec<String> {
    let table = case.adapt(table);
    entities
        .values()
        .filter(|entity| case.adapt(entity.table()) == table)
        .map(|entity| entity.name().to_string())
        .collect()
}

/// Referencing columns reordered to follow the target's key columns
///
/// Columns are paired through the referenced column names when the catalog
/// gives them, by position otherwise. `None` when the foreign key does not
/// cover exactly the target's key.
fn align_foreign_key(fk: &ForeignKeyInfo, target_keys: &[String], case: CasePolicy) -> Option<Vec<String>> {
    let columns = fk.columns.iter().map(|c| case.adapt(c)).collect::<Vec<_>>();
    if columns.len() != target_keys.len() {
        return None;
    }
    if fk.target_columns.is_empty() {
        return Some(columns);
    }
    let referenced = fk.target_columns.iter().map(|c| case.adapt(c)).collect::<Vec<_>>();
    target_keys
        .iter()
        .map(|key| {
            referenced
                .iter()
                .position(|r| r == key)
                .map(|i| columns[i].clone())
        })
        .collect()
}

/// Every result, target and source entity named by an attribute must exist
fn check_references(entities: &IndexMap<String, Entity>, root: &Entity, case: CasePolicy) -> Result<()> {
    let known = |name: &str| entities.contains_key(name) || entities.contains_key(&case.adapt(name));
    for entity in entities.values().chain(std::iter::once(root)) {
        for attribute in entity.attributes() {
            let referenced = match attribute.source() {
                AttributeSource::ImportedKey { target, .. } => Some(target.as_str()),
                AttributeSource::ExportedKey { source, .. } => Some(source.as_str()),
                AttributeSource::Query(_) => attribute.result_entity(),
            };
            if let Some(name) = referenced {
                if !known(name) {
                    return Err(VelosurfError::Schema(format!(
                        "attribute '{}.{}' refers to unknown entity '{}'",
                        entity.name(),
                        attribute.name(),
                        name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Load every fully cached table; failures are logged and leave the cache
/// empty
async fn preload_full_caches(db: &Database) {
    for entity in db.entities() {
        if entity.caching() != CachingPolicy::Full {
            continue;
        }
        if entity.key_columns().is_empty() {
            warn!(entity = %entity.name(), "entity without key columns cannot be cached, preload skipped");
            continue;
        }
        let sql = format!("select * from {}", entity.table());
        match db.repository().query_rows(&sql, &[] as &[Value]).await {
            Ok(rows) => {
                let count = rows.len();
                for row in rows {
                    entity.instance_from_row(row);
                }
                info!(entity = %entity.name(), rows = count, cached = entity.cache().len(), "cache preloaded");
            }
            Err(e) => {
                error!(entity = %entity.name(), error = %e, "cache preload failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(columns: &[&str], targets: &[&str]) -> ForeignKeyInfo {
        ForeignKeyInfo {
            target_table: "shelf".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            target_columns: targets.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_foreign_key_columns_follow_the_referenced_columns() {
        let aligned = align_foreign_key(
            &fk(&["shelf_no", "shelf_room"], &["no", "room"]),
            &keys(&["room", "no"]),
            CasePolicy::Sensitive,
        );
        assert_eq!(aligned, Some(keys(&["shelf_room", "shelf_no"])));
    }

    #[test]
    fn test_implied_target_columns_pair_by_position() {
        let aligned = align_foreign_key(&fk(&["a", "b"], &[]), &keys(&["x", "y"]), CasePolicy::Sensitive);
        assert_eq!(aligned, Some(keys(&["a", "b"])));
    }

    #[test]
    fn test_foreign_key_to_other_columns_is_rejected() {
        let unique = fk(&["shelf_code"], &["code"]);
        assert_eq!(align_foreign_key(&unique, &keys(&["id"]), CasePolicy::Sensitive), None);
        assert_eq!(align_foreign_key(&fk(&["a"], &[]), &keys(&[]), CasePolicy::Sensitive), None);
    }
}
