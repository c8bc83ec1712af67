//! API layer - in-process client over the domain model

pub mod native;
