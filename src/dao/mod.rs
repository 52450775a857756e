/// Persisted user record and partial-update models.
pub mod models;
/// Backend-agnostic storage error.
pub mod storage;
/// User collection abstraction and its backends.
pub mod user_store;
