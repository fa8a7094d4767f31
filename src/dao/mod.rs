/// In-memory reference backend used by tests and feature-less builds.
pub mod memory;
/// Database model definitions.
pub mod models;
#[cfg(feature = "postgres-store")]
/// Postgres storage backend.
pub mod postgres;
/// Storage abstraction layer for database operations.
pub mod storage;
