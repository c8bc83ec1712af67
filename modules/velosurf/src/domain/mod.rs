//! Domain layer - entities, attributes, actions, instances and caching

pub mod action;
pub mod attribute;
pub mod cache;
pub mod constraint;
pub mod cryptograph;
pub mod database;
pub mod entity;
pub mod instance;
pub mod query;
pub mod repository;
pub mod rowset;
mod schema;
pub mod typed;

pub use action::Action;
pub use attribute::{Attribute, AttributeSource};
pub use cache::{Cache, CachingPolicy};
pub use constraint::{Constraint, FieldConstraint};
pub use cryptograph::{Cryptograph, KeystreamCryptograph};
pub use database::{Database, DatabaseBuilder, ROOT_ENTITY};
pub use entity::{Column, Entity};
pub use instance::{Instance, Resolved};
pub use query::{BoundStatement, ParamSource, QueryTemplate};
pub use repository::{ColumnInfo, ForeignKeyInfo, InsertOutcome, RowRepository, TableInfo};
pub use rowset::{RowIterator, RowSet};
pub use typed::{row_to_struct, struct_to_row, RowBackedObject, TypedEntity};
