//! Serializable summary of a built model

use serde::Serialize;
use velosurf::domain::{AttributeSource, CachingPolicy, Entity};
use velosurf::Database;

#[derive(Debug, Serialize)]
pub struct ModelReport {
    pub entities: Vec<EntityReport>,
    pub root: RootReport,
}

#[derive(Debug, Serialize)]
pub struct RootReport {
    pub attributes: Vec<AttributeReport>,
    pub actions: Vec<ActionReport>,
}

#[derive(Debug, Serialize)]
pub struct EntityReport {
    pub name: String,
    pub table: String,
    pub columns: Vec<ColumnReport>,
    pub keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub read_only: bool,
    pub caching: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnReport {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub obfuscated: bool,
}

#[derive(Debug, Serialize)]
pub struct AttributeReport {
    pub name: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ActionReport {
    pub name: String,
    pub statements: usize,
    pub transaction: bool,
}

fn caching_label(policy: CachingPolicy) -> String {
    match policy {
        CachingPolicy::None => "none".to_string(),
        CachingPolicy::Full => "full".to_string(),
        CachingPolicy::Soft { size, ttl } => match ttl {
            Some(ttl) => format!("soft (size {}, ttl {}s)", size, ttl.as_secs()),
            None => format!("soft (size {})", size),
        },
    }
}

fn attributes(entity: &Entity) -> Vec<AttributeReport> {
    entity
        .attributes()
        .map(|a| AttributeReport {
            name: a.name().to_string(),
            result: a.kind().to_string(),
            entity: a.result_entity().map(str::to_string),
            source: match a.source() {
                AttributeSource::Query(t) => t.sql().to_string(),
                AttributeSource::ImportedKey { target, fk_columns } => {
                    format!("imported key {} -> {}", fk_columns.join(", "), target)
                }
                AttributeSource::ExportedKey { source, fk_columns } => {
                    format!("exported key {}.{}", source, fk_columns.join(", "))
                }
            },
        })
        .collect()
}

fn actions(entity: &Entity) -> Vec<ActionReport> {
    entity
        .actions()
        .map(|a| ActionReport {
            name: a.name().to_string(),
            statements: a.statements().len(),
            transaction: a.is_transaction(),
        })
        .collect()
}

fn entity_report(entity: &Entity) -> EntityReport {
    EntityReport {
        name: entity.name().to_string(),
        table: entity.table().to_string(),
        columns: entity
            .columns()
            .iter()
            .map(|c| ColumnReport {
                name: c.name.clone(),
                column_type: c.column_type.to_string(),
                obfuscated: entity.is_obfuscated(&c.name),
            })
            .collect(),
        keys: entity.key_columns().to_vec(),
        aliases: entity
            .aliases()
            .iter()
            .map(|(alias, column)| format!("{} -> {}", alias, column))
            .collect(),
        read_only: entity.is_read_only(),
        caching: caching_label(entity.caching()),
        attributes: attributes(entity),
        actions: actions(entity),
        constraints: entity.constraints().iter().map(|c| c.message()).collect(),
    }
}

/// Report over every entity, or only `only` when given
pub fn build(db: &Database, only: Option<&str>) -> anyhow::Result<ModelReport> {
    let entities = match only {
        Some(name) => vec![entity_report(db.entity(name)?)],
        None => db.entities().map(|e| entity_report(e)).collect(),
    };
    Ok(ModelReport {
        entities,
        root: RootReport {
            attributes: attributes(db.root()),
            actions: actions(db.root()),
        },
    })
}
