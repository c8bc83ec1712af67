//! Velosurf
//!
//! Binds a relational schema to row-backed objects: entities describe mapped
//! tables, attributes are named parametrized queries, actions are named
//! parametrized updates, and instances are materialized rows resolved through
//! a per-entity cache.

// Public exports
pub mod contract;
pub use contract::{
    client::VelosurfApi, error::VelosurfError, CacheKey, ColumnType, Localizer, MapLocalizer,
    ResultKind, Row, UserContext, Value,
};

pub mod module;
pub use module::Registry;

pub mod config;
pub use config::Config;

pub mod domain;
pub use domain::{
    Action, Attribute, Cache, CachingPolicy, Database, DatabaseBuilder, Entity, Instance,
    Resolved, RowBackedObject, RowSet, TypedEntity,
};

// Internal modules (hidden from public API)
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod infra;
