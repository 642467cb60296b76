/// Durable mirror of lobby state and its backends.
pub mod mirror_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
