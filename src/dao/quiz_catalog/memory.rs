use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use super::QuizCatalog;
use crate::dao::{models::QuizEntity, storage::StorageResult};

/// Quiz catalog kept in memory, seeded from configuration or by tests.
#[derive(Clone, Default)]
pub struct MemoryQuizCatalog {
    quizzes: Arc<DashMap<Uuid, QuizEntity>>,
}

impl MemoryQuizCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog pre-filled with the given quizzes.
    pub fn with_quizzes(quizzes: impl IntoIterator<Item = QuizEntity>) -> Self {
        let catalog = Self::new();
        for quiz in quizzes {
            catalog.insert(quiz);
        }
        catalog
    }

    /// Add or replace a quiz.
    pub fn insert(&self, mut quiz: QuizEntity) {
        quiz.questions.sort_by_key(|question| question.order);
        self.quizzes.insert(quiz.id, quiz);
    }
}

impl QuizCatalog for MemoryQuizCatalog {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let quizzes = self.quizzes.clone();
        Box::pin(async move { Ok(quizzes.get(&id).map(|entry| entry.clone())) })
    }
}
