/// Read-only access to quizzes owned by the content store.
pub mod quiz_catalog;
/// Database model definitions.
pub mod models;
/// Persistence of sessions, participations and answers.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
/// MongoDB backed storage.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
