pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{AnswerEntity, ParticipationEntity, SessionEntity};
use crate::dao::storage::StorageResult;

pub use memory::MemorySessionStore;

/// Abstraction over the persistence layer for sessions and their participations.
///
/// Implementations must reject duplicates atomically at insertion time for the join code,
/// the `(session, user)` pair of a participation and the `(participation, question)` pair
/// of an answer, returning [`StorageError::Conflict`](crate::dao::storage::StorageError).
pub trait SessionStore: Send + Sync {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a stored session with the provided state.
    fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Delete a session together with its participations and answers.
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn insert_participation(
        &self,
        participation: ParticipationEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_participation(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipationEntity>>>;
    /// Participations of a session in join order.
    fn list_participations(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipationEntity>>>;
    /// Store the answer and add its awarded points to the participation score as one step.
    fn record_answer(
        &self,
        answer: AnswerEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipationEntity>>;
    fn list_answers(&self, session_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
