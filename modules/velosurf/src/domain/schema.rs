//! Mapping of configured schema definitions onto entities, and the naming
//! rules for keys derived from foreign keys.

use crate::config::{ActionConfig, AttributeConfig, EntityConfig};
use crate::contract::{ResultKind, Result, VelosurfError};
use super::action::Action;
use super::attribute::Attribute;
use super::constraint::{Constraint, FieldConstraint};
use super::entity::Entity;
use super::query::QueryTemplate;

pub(crate) fn attribute_from_config(owner: &str, config: &AttributeConfig) -> Result<Attribute> {
    let kind = config.result.parse::<ResultKind>().map_err(|e| {
        VelosurfError::Schema(format!("attribute '{}.{}': {}", owner, config.name, e))
    })?;
    let template = match &config.params {
        Some(params) => QueryTemplate::with_params(config.query.trim(), params.clone()),
        None => QueryTemplate::parse(&config.query),
    };
    let attribute = Attribute::with_template(config.name.clone(), kind, template);
    Ok(match &config.entity {
        Some(entity) => attribute.with_result_entity(entity.clone()),
        None => attribute,
    })
}

pub(crate) fn action_from_config(config: &ActionConfig) -> Action {
    if config.transaction {
        Action::transaction(config.name.clone(), &config.query)
    } else {
        Action::new(config.name.clone(), &config.query)
    }
}

/// Overlay one configured entity on `entity`
///
/// Configured columns and keys replace reverse-engineered ones; everything
/// else adds up.
pub(crate) fn apply_entity_config(entity: &mut Entity, config: &EntityConfig) -> Result<()> {
    if !config.columns.is_empty() {
        entity.replace_columns(&config.columns);
    }
    if !config.keys.is_empty() {
        entity.clear_key_columns();
        for key in &config.keys {
            entity.add_key_column(key.clone());
        }
    }
    for (alias, column) in &config.aliases {
        entity.add_alias(alias.clone(), column.clone());
    }
    if let Some(read_only) = config.read_only {
        entity.set_read_only(read_only);
    }
    if let Some(caching) = config.caching {
        entity.set_caching(caching.into());
    }
    for column in &config.obfuscate {
        entity.add_obfuscated(column.clone());
    }
    for column in &config.localize {
        entity.add_localized(column.clone());
    }
    for attribute in &config.attributes {
        entity.add_attribute(attribute_from_config(&config.name, attribute)?);
    }
    for key in &config.imported_keys {
        entity.add_attribute(Attribute::imported_key(
            key.name.clone(),
            key.entity.clone(),
            key.columns.clone(),
        ));
    }
    for key in &config.exported_keys {
        entity.add_attribute(Attribute::exported_key(
            key.name.clone(),
            key.entity.clone(),
            key.columns.clone(),
        ));
    }
    for action in &config.actions {
        entity.add_action(action_from_config(action));
    }
    for (column, rules) in &config.constraints {
        for rule in rules {
            let constraint = Constraint::from_config(column, rule)?;
            entity.add_constraint(FieldConstraint::new(column.clone(), constraint));
        }
    }
    Ok(())
}

/// Name of the imported key derived from a foreign key: the single
/// referencing column without its `_id` suffix, else the target entity name
pub(crate) fn imported_key_name(fk_columns: &[String], target: &str) -> String {
    match fk_columns {
        [column] => {
            let lower = column.to_ascii_lowercase();
            match lower.strip_suffix("_id") {
                Some(stem) if !stem.is_empty() => column[..stem.len()].to_string(),
                _ => target.to_string(),
            }
        }
        _ => target.to_string(),
    }
}

/// English plural used to name exported keys
pub(crate) fn plural(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let consonant_y = lower.ends_with('y')
        && !matches!(
            lower.chars().rev().nth(1),
            Some('a' | 'e' | 'i' | 'o' | 'u') | None
        );
    if consonant_y {
        format!("{}ies", &name[..name.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_plural() {
        assert_eq!(plural("book"), "books");
        assert_eq!(plural("category"), "categories");
        assert_eq!(plural("day"), "days");
        assert_eq!(plural("address"), "addresses");
        assert_eq!(plural("branch"), "branches");
        assert_eq!(plural("box"), "boxes");
    }

    #[test]
    fn test_imported_key_name() {
        assert_eq!(imported_key_name(&["author_id".to_string()], "person"), "author");
        assert_eq!(imported_key_name(&["Author_ID".to_string()], "person"), "Author");
        assert_eq!(imported_key_name(&["owner".to_string()], "person"), "person");
        assert_eq!(imported_key_name(&["_id".to_string()], "person"), "person");
        assert_eq!(
            imported_key_name(&["a".to_string(), "b".to_string()], "pair"),
            "pair"
        );
    }

    #[test]
    fn test_entity_overlay() {
        let config = Config::from_yaml_str(
            r#"
schema:
  entities:
    - name: book
      keys: [book_id]
      aliases: { id: book_id }
      read_only: false
      attributes:
        - name: same_author
          result: rowset
          entity: book
          query: "select * from book where author_id = :author_id"
        - name: same_author
          result: scalar
          query: "select 1"
      actions:
        - name: retitle
          query: "update book set title = :title where book_id = :book_id"
      constraints:
        title: [not_empty, { length: { max: 200 } }]
"#,
        )
        .unwrap();
        let mut entity = Entity::new("book", "book");
        entity.add_key_column("id");
        apply_entity_config(&mut entity, &config.schema.entities[0]).unwrap();

        assert_eq!(entity.key_columns(), &["book_id".to_string()]);
        assert_eq!(entity.resolve_column("id"), "book_id");
        assert!(!entity.is_read_only());
        let attribute = entity.attribute("same_author").unwrap();
        assert_eq!(attribute.kind(), ResultKind::RowSet);
        assert_eq!(attribute.result_entity(), Some("book"));
        assert!(entity.action("retitle").is_some());
        assert_eq!(entity.constraints().len(), 2);
    }

    #[test]
    fn test_bad_result_kind_is_a_schema_error() {
        let config = AttributeConfig {
            name: "n".to_string(),
            result: "table".to_string(),
            entity: None,
            query: "select 1".to_string(),
            params: None,
        };
        assert!(matches!(
            attribute_from_config("book", &config),
            Err(VelosurfError::Schema(_))
        ));
    }
}
