/// Persisted document definitions.
pub mod models;
/// Race persistence backends.
pub mod race_store;
/// Storage error types shared by every backend.
pub mod storage;
