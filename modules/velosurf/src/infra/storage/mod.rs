//! Storage layer - SQL execution, value mapping and catalog reading

pub mod mapper;
pub mod repositories;
pub mod reverse;

pub use repositories::SeaOrmRowRepository;
