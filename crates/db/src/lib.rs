//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for every table backing the workflow engine. No business logic lives here;
//! the engine's own execution state stays in-memory for the lifetime of one
//! `Engine::run` call and is never persisted by this crate.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;
pub mod sinks;

pub use pool::DbPool;
pub use error::DbError;
pub use sinks::{PgCostSink, PgSpanSink};
