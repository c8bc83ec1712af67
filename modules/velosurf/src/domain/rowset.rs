//! Lazily executed row sets
//!
//! A row set carries bound SQL and is only run when its rows are requested.
//! Refinements and ordering are trusted SQL fragments, applied by wrapping the
//! base query.

use crate::contract::{Result, Value};
use super::database::Database;
use super::instance::Instance;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct RowSet {
    sql: String,
    params: Vec<Value>,
    result_entity: Option<String>,
    refinements: Mutex<Vec<String>>,
    order: Mutex<Option<String>>,
}

impl RowSet {
    pub(crate) fn new(sql: impl Into<String>, params: Vec<Value>, result_entity: Option<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
            result_entity,
            refinements: Mutex::new(Vec::new()),
            order: Mutex::new(None),
        }
    }

    pub fn result_entity(&self) -> Option<&str> {
        self.result_entity.as_deref()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Add a predicate; all predicates are ANDed
    pub fn refine(&self, predicate: impl Into<String>) {
        self.refinements.lock().push(predicate.into());
    }

    pub fn clear_refinements(&self) {
        self.refinements.lock().clear();
    }

    pub fn refinements(&self) -> Vec<String> {
        self.refinements.lock().clone()
    }

    /// Set the ordering clause (without `order by`); an empty clause clears it
    pub fn order_by(&self, order: impl Into<String>) {
        let order = order.into();
        *self.order.lock() = if order.trim().is_empty() {
            None
        } else {
            Some(order)
        };
    }

    /// The SQL that `rows` will run
    pub fn sql(&self) -> String {
        let refinements = self.refinements.lock();
        let order = self.order.lock();
        if refinements.is_empty() && order.is_none() {
            return self.sql.clone();
        }
        let mut sql = format!("select * from ({}) as refined", self.sql);
        if !refinements.is_empty() {
            let predicates = refinements
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(" and ");
            sql.push_str(" where ");
            sql.push_str(&predicates);
        }
        if let Some(order) = order.as_ref() {
            sql.push_str(" order by ");
            sql.push_str(order);
        }
        sql
    }

    /// Run the query
    pub async fn rows(&self, db: &Database) -> Result<RowIterator> {
        let sql = self.sql();
        let rows = db.repository().query_rows(&sql, &self.params).await?;
        let instances = rows
            .into_iter()
            .map(|row| db.instance_for(self.result_entity.as_deref(), row))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowIterator {
            inner: instances.into_iter(),
        })
    }
}

/// Iterator over the instances of an executed row set
pub struct RowIterator {
    inner: std::vec::IntoIter<Arc<Instance>>,
}

impl Iterator for RowIterator {
    type Item = Arc<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RowIterator {}
