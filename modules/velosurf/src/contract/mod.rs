//! Contract layer - public types shared by every caller
//!
//! Values, rows, result kinds, the error enum, the per-request user context
//! and the native client trait. Nothing here touches the database.

pub mod client;
pub mod context;
pub mod error;
pub mod model;

pub use client::VelosurfApi;
pub use context::{Localizer, MapLocalizer, UserContext, ValidationMessage};
pub use error::{Result, VelosurfError};
pub use model::{render_value, CacheKey, ColumnType, ResultKind, Row, Value};
