//! Infrastructure layer - SQL execution over sea-orm

pub mod storage;
