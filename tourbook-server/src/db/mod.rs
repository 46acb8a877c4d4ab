//! Database layer - connection pool, schema and repositories
//!
//! - Reads populate relations with subselects, never one query per row
//! - Unique constraints are the source of truth for duplicate names and emails
//! - Review writes and the tour rating refresh share one transaction

pub mod migrations;
pub mod pool;
pub mod query;
pub mod repos;

pub use pool::{create_pool, PoolConfig};
pub use repos::*;
