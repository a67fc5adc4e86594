//! Persistence for the CAF activation saga.
//!
//! Repository traits are implemented twice: `InMemoryStore` for tests and the
//! default binary, and `PostgresStore` backed by `sqlx`.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    CafRepository, CreateOutcome, OrchestrationStore, OutboxRepository, ZoneRepository,
};
