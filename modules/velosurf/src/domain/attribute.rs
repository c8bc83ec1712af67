//! Attributes: named parametrized queries owned by an entity
//!
//! Imported and exported keys are attributes whose SQL is synthesized on
//! first use, once every entity's key columns are known.

use crate::contract::{ResultKind, Result, Value, VelosurfError};
use super::database::Database;
use super::instance::{Instance, Resolved};
use super::query::{ParamSource, QueryTemplate};
use super::rowset::RowSet;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::warn;

/// Where an attribute's SQL comes from
#[derive(Debug, Clone)]
pub enum AttributeSource {
    /// Literal query
    Query(QueryTemplate),
    /// Owner's foreign-key columns point at `target`'s primary key
    ImportedKey {
        target: String,
        fk_columns: Vec<String>,
    },
    /// `source`'s foreign-key columns point at the owner's primary key
    ExportedKey {
        source: String,
        fk_columns: Vec<String>,
    },
}

/// A named, parametrized query bound to an owning entity
#[derive(Debug)]
pub struct Attribute {
    name: String,
    pub(crate) owner: String,
    kind: ResultKind,
    result_entity: Option<String>,
    source: AttributeSource,
    synthesized: OnceCell<QueryTemplate>,
}

impl Attribute {
    /// Attribute over SQL with inline `:name` parameters
    pub fn new(name: impl Into<String>, kind: ResultKind, query: &str) -> Self {
        Self::with_template(name, kind, QueryTemplate::parse(query))
    }

    pub fn with_template(name: impl Into<String>, kind: ResultKind, template: QueryTemplate) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            kind,
            result_entity: None,
            source: AttributeSource::Query(template),
            synthesized: OnceCell::new(),
        }
    }

    /// Rows produced by this attribute become instances of `entity`
    pub fn with_result_entity(mut self, entity: impl Into<String>) -> Self {
        self.result_entity = Some(entity.into());
        self
    }

    /// Foreign key -> referenced row
    pub fn imported_key(
        name: impl Into<String>,
        target: impl Into<String>,
        fk_columns: Vec<String>,
    ) -> Self {
        let target = target.into();
        Self {
            name: name.into(),
            owner: String::new(),
            kind: ResultKind::Row,
            result_entity: Some(target.clone()),
            source: AttributeSource::ImportedKey { target, fk_columns },
            synthesized: OnceCell::new(),
        }
    }

    /// Referenced row -> referencing rows
    pub fn exported_key(
        name: impl Into<String>,
        source: impl Into<String>,
        fk_columns: Vec<String>,
    ) -> Self {
        let source = source.into();
        Self {
            name: name.into(),
            owner: String::new(),
            kind: ResultKind::RowSet,
            result_entity: Some(source.clone()),
            source: AttributeSource::ExportedKey { source, fk_columns },
            synthesized: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn result_entity(&self) -> Option<&str> {
        self.result_entity.as_deref()
    }

    pub fn source(&self) -> &AttributeSource {
        &self.source
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Query template, synthesizing key joins on first use
    pub fn template(&self, db: &Database) -> Result<&QueryTemplate> {
        match &self.source {
            AttributeSource::Query(template) => Ok(template),
            AttributeSource::ImportedKey { target, fk_columns } => {
                self.synthesized.get_or_try_init(|| {
                    let target = db.entity(target)?;
                    let keys = target.key_columns();
                    self.check_key_width(keys.len(), fk_columns.len())?;
                    let predicate = keys
                        .iter()
                        .map(|k| format!("{} = ?", k))
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    Ok(QueryTemplate::with_params(
                        format!("SELECT * FROM {} WHERE {}", target.table(), predicate),
                        fk_columns.clone(),
                    ))
                })
            }
            AttributeSource::ExportedKey { source, fk_columns } => {
                self.synthesized.get_or_try_init(|| {
                    let source = db.entity(source)?;
                    let owner = db.entity(&self.owner)?;
                    let keys = owner.key_columns();
                    self.check_key_width(keys.len(), fk_columns.len())?;
                    let predicate = fk_columns
                        .iter()
                        .map(|c| format!("{} = ?", c))
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    Ok(QueryTemplate::with_params(
                        format!("SELECT * FROM {} WHERE {}", source.table(), predicate),
                        keys.to_vec(),
                    ))
                })
            }
        }
    }

    fn check_key_width(&self, keys: usize, fk_columns: usize) -> Result<()> {
        if keys == 0 || keys != fk_columns {
            return Err(VelosurfError::Schema(format!(
                "key attribute '{}': {} foreign-key column(s) for {} primary-key column(s)",
                self.qualified_name(),
                fk_columns,
                keys
            )));
        }
        Ok(())
    }

    fn expect_kind(&self, expected: ResultKind) -> Result<()> {
        if self.kind != expected {
            return Err(VelosurfError::KindMismatch {
                attribute: self.qualified_name(),
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }

    /// Single row (ROW attributes only)
    pub async fn fetch(
        &self,
        db: &Database,
        source: &dyn ParamSource,
    ) -> Result<Option<Arc<Instance>>> {
        self.expect_kind(ResultKind::Row)?;
        let template = self.template(db)?;
        let params = template.bind(source, &self.qualified_name());
        let rows = db.repository().query_rows(template.sql(), &params).await?;
        if rows.len() > 1 {
            warn!(
                attribute = %self.qualified_name(),
                rows = rows.len(),
                "row attribute returned several rows, keeping the first"
            );
        }
        match rows.into_iter().next() {
            Some(row) => db
                .instance_for(self.result_entity.as_deref(), row)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Lazy row set (ROWSET attributes only); no SQL is issued here
    pub fn query(&self, db: &Database, source: &dyn ParamSource) -> Result<RowSet> {
        self.expect_kind(ResultKind::RowSet)?;
        let template = self.template(db)?;
        Ok(RowSet::new(
            template.sql(),
            template.bind(source, &self.qualified_name()),
            self.result_entity.clone(),
        ))
    }

    /// First column of the first row (SCALAR attributes only)
    pub async fn evaluate(&self, db: &Database, source: &dyn ParamSource) -> Result<Value> {
        self.expect_kind(ResultKind::Scalar)?;
        let template = self.template(db)?;
        let params = template.bind(source, &self.qualified_name());
        db.repository().query_scalar(template.sql(), &params).await
    }

    /// Evaluate according to the declared kind
    pub async fn resolve(&self, db: &Database, source: &dyn ParamSource) -> Result<Resolved> {
        match self.kind {
            ResultKind::Row => Ok(Resolved::Row(self.fetch(db, source).await?)),
            ResultKind::RowSet => Ok(Resolved::RowSet(Arc::new(self.query(db, source)?))),
            ResultKind::Scalar => Ok(Resolved::Value(self.evaluate(db, source).await?)),
            ResultKind::Undefined => Err(VelosurfError::Schema(format!(
                "attribute '{}' has no result kind",
                self.qualified_name()
            ))),
        }
    }
}
