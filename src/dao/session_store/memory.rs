use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use super::SessionStore;
use crate::dao::{
    models::{AnswerEntity, ParticipationEntity, SessionEntity},
    storage::{StorageError, StorageResult},
};

/// Process-local [`SessionStore`] used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, SessionEntity>,
    codes: DashMap<String, Uuid>,
    /// Participations per session keyed by user, in join order.
    participations: DashMap<Uuid, IndexMap<Uuid, ParticipationEntity>>,
    /// Answers per participation keyed by question.
    answers: DashMap<Uuid, IndexMap<Uuid, AnswerEntity>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn insert_session(&self, session: SessionEntity) -> StorageResult<()> {
        match self.codes.entry(session.code.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!(
                "join code `{}` already in use",
                session.code
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.id);
                self.sessions.insert(session.id, session);
                Ok(())
            }
        }
    }

    fn update_session(&self, session: SessionEntity) -> StorageResult<()> {
        let mut stored = self
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StorageError::Missing(format!("session `{}`", session.id)))?;
        *stored = session;
        Ok(())
    }

    fn find_session_by_code(&self, code: &str) -> Option<SessionEntity> {
        let id = *self.codes.get(code)?;
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    fn delete_session(&self, id: Uuid) -> bool {
        let Some((_, session)) = self.sessions.remove(&id) else {
            return false;
        };
        self.codes.remove(&session.code);
        if let Some((_, participations)) = self.participations.remove(&id) {
            for participation in participations.values() {
                self.answers.remove(&participation.id);
            }
        }
        true
    }

    fn insert_participation(&self, participation: ParticipationEntity) -> StorageResult<()> {
        let mut participations = self
            .participations
            .entry(participation.session_id)
            .or_default();
        if participations.contains_key(&participation.user_id) {
            return Err(StorageError::Conflict(format!(
                "user `{}` already joined session `{}`",
                participation.user_id, participation.session_id
            )));
        }
        participations.insert(participation.user_id, participation);
        Ok(())
    }

    fn record_answer(&self, answer: AnswerEntity) -> StorageResult<ParticipationEntity> {
        // Lock order: answers, then participations.
        let mut answers = self.answers.entry(answer.participation_id).or_default();
        if answers.contains_key(&answer.question_id) {
            return Err(StorageError::Conflict(format!(
                "question `{}` already answered by participation `{}`",
                answer.question_id, answer.participation_id
            )));
        }

        let mut participations = self
            .participations
            .get_mut(&answer.session_id)
            .ok_or_else(|| StorageError::Missing(format!("session `{}`", answer.session_id)))?;
        let participation = participations
            .values_mut()
            .find(|participation| participation.id == answer.participation_id)
            .ok_or_else(|| {
                StorageError::Missing(format!("participation `{}`", answer.participation_id))
            })?;

        participation.score = participation.score.saturating_add(answer.points_awarded);
        let updated = participation.clone();
        answers.insert(answer.question_id, answer);
        Ok(updated)
    }

    fn list_answers(&self, session_id: Uuid) -> Vec<AnswerEntity> {
        let participation_ids: Vec<Uuid> = self
            .participations
            .get(&session_id)
            .map(|entry| entry.values().map(|participation| participation.id).collect())
            .unwrap_or_default();

        participation_ids
            .into_iter()
            .filter_map(|id| {
                self.answers
                    .get(&id)
                    .map(|answers| answers.values().cloned().collect::<Vec<_>>())
            })
            .flatten()
            .collect()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_session(session) })
    }

    fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.update_session(session) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.sessions.get(&id).map(|entry| entry.clone())) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.find_session_by_code(&code)) })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.delete_session(id)) })
    }

    fn insert_participation(
        &self,
        participation: ParticipationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_participation(participation) })
    }

    fn find_participation(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipationEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .participations
                .get(&session_id)
                .and_then(|entry| entry.get(&user_id).cloned()))
        })
    }

    fn list_participations(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipationEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .participations
                .get(&session_id)
                .map(|entry| entry.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn record_answer(
        &self,
        answer: AnswerEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipationEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.record_answer(answer) })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_answers(session_id)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::SessionStatus;

    fn session(code: &str) -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            code: code.into(),
            quiz_id: Uuid::new_v4(),
            quiz_title: "Capitals".into(),
            owner_id: Uuid::new_v4(),
            questions: Vec::new(),
            status: SessionStatus::Waiting,
            current_question: None,
            finish_reason: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn participation(session_id: Uuid, user_id: Uuid) -> ParticipationEntity {
        ParticipationEntity {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            user_name: "Ada".into(),
            score: 0,
            joined_at: SystemTime::now(),
        }
    }

    fn answer(participation: &ParticipationEntity, question_id: Uuid, points: u32) -> AnswerEntity {
        AnswerEntity {
            id: Uuid::new_v4(),
            session_id: participation.session_id,
            participation_id: participation.id,
            question_id,
            answer: "Paris".into(),
            is_correct: points > 0,
            points_awarded: points,
            time_to_answer_secs: None,
            answered_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected() {
        let store = MemorySessionStore::new();
        store.insert_session(session("ABC123")).await.unwrap();
        let err = store.insert_session(session("ABC123")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn duplicate_participation_is_rejected() {
        let store = MemorySessionStore::new();
        let session = session("JOIN01");
        store.insert_session(session.clone()).await.unwrap();
        let user_id = Uuid::new_v4();

        store
            .insert_participation(participation(session.id, user_id))
            .await
            .unwrap();
        let err = store
            .insert_participation(participation(session.id, user_id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.list_participations(session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_answer_increments_score_once() {
        let store = MemorySessionStore::new();
        let session = session("SCORE1");
        store.insert_session(session.clone()).await.unwrap();
        let joined = participation(session.id, Uuid::new_v4());
        store.insert_participation(joined.clone()).await.unwrap();
        let question_id = Uuid::new_v4();

        let updated = store.record_answer(answer(&joined, question_id, 10)).await.unwrap();
        assert_eq!(updated.score, 10);

        let err = store
            .record_answer(answer(&joined, question_id, 10))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = store
            .find_participation(session.id, joined.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.score, 10);
        assert_eq!(store.list_answers(session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_cascades() {
        let store = MemorySessionStore::new();
        let session = session("DELETE");
        store.insert_session(session.clone()).await.unwrap();
        let joined = participation(session.id, Uuid::new_v4());
        store.insert_participation(joined.clone()).await.unwrap();
        store
            .record_answer(answer(&joined, Uuid::new_v4(), 0))
            .await
            .unwrap();

        assert!(store.delete_session(session.id).await.unwrap());
        assert!(store.find_session(session.id).await.unwrap().is_none());
        assert!(store
            .find_session_by_code("DELETE".into())
            .await
            .unwrap()
            .is_none());
        assert!(store.list_participations(session.id).await.unwrap().is_empty());
        assert!(store.list_answers(session.id).await.unwrap().is_empty());
        assert!(!store.delete_session(session.id).await.unwrap());
    }
}
