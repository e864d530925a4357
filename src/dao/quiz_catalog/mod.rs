pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{models::QuizEntity, storage::StorageResult};

pub use memory::MemoryQuizCatalog;

/// Read access to quizzes authored through the content store.
pub trait QuizCatalog: Send + Sync {
    /// Fetch a quiz with its questions sorted by presentation order.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
}
