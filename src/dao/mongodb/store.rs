use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{
        ANSWER_COLLECTION_NAME, MongoAnswerDocument, MongoParticipationDocument, MongoQuizDocument,
        MongoSessionDocument, PARTICIPATION_COLLECTION_NAME, QUIZ_COLLECTION_NAME,
        SESSION_COLLECTION_NAME,
    },
};
use crate::dao::{
    models::{AnswerEntity, ParticipationEntity, QuizEntity, SessionEntity},
    quiz_catalog::QuizCatalog,
    session_store::SessionStore,
    storage::StorageResult,
};

/// MongoDB implementation of both [`SessionStore`] and [`QuizCatalog`].
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

fn id_filter(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

impl MongoStore {
    /// Establish a connection to MongoDB and ensure the unique indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_database(&config.options, &config.database_name).await?;
        let store = Self { database };
        store.ensure_indexes().await?;
        info!(database = %config.database_name, "connected to MongoDB");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        self.ensure_unique_index(SESSION_COLLECTION_NAME, "code", doc! { "code": 1 })
            .await?;
        self.ensure_unique_index(
            PARTICIPATION_COLLECTION_NAME,
            "session_id,user_id",
            doc! { "session_id": 1, "user_id": 1 },
        )
        .await?;
        self.ensure_unique_index(
            ANSWER_COLLECTION_NAME,
            "participation_id,question_id",
            doc! { "participation_id": 1, "question_id": 1 },
        )
        .await?;
        Ok(())
    }

    async fn ensure_unique_index(
        &self,
        collection: &'static str,
        index: &'static str,
        keys: Document,
    ) -> MongoResult<()> {
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(Some(true)).build())
            .build();

        self.database
            .collection::<Document>(collection)
            .create_index(model)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection,
                index,
                source,
            })?;
        Ok(())
    }

    fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database.collection(SESSION_COLLECTION_NAME)
    }

    fn participations(&self) -> Collection<MongoParticipationDocument> {
        self.database.collection(PARTICIPATION_COLLECTION_NAME)
    }

    fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database.collection(ANSWER_COLLECTION_NAME)
    }

    fn quizzes(&self) -> Collection<MongoQuizDocument> {
        self.database.collection(QUIZ_COLLECTION_NAME)
    }

    async fn ping(&self) -> MongoResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<()> {
        let document = MongoSessionDocument::from(&session);
        self.sessions()
            .insert_one(&document)
            .await
            .map_err(|source| {
                MongoDaoError::from_write(SESSION_COLLECTION_NAME, session.code.clone(), source)
            })?;
        Ok(())
    }

    async fn update_session(&self, session: SessionEntity) -> MongoResult<()> {
        let document = MongoSessionDocument::from(&session);
        let result = self
            .sessions()
            .replace_one(id_filter(session.id), &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION_NAME,
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::MissingDocument {
                collection: SESSION_COLLECTION_NAME,
                id: session.id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_session(&self, filter: Document) -> MongoResult<Option<SessionEntity>> {
        self.sessions()
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: SESSION_COLLECTION_NAME,
                source,
            })?
            .map(SessionEntity::try_from)
            .transpose()
    }

    /// Open a client session with a running transaction.
    async fn begin(&self) -> MongoResult<ClientSession> {
        let mut session = self
            .database
            .client()
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;
        Ok(session)
    }

    /// Commit on success, abort otherwise, and hand back the outcome of the writes.
    async fn finish<T>(mut session: ClientSession, outcome: MongoResult<T>) -> MongoResult<T> {
        match outcome {
            Ok(value) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|source| MongoDaoError::Transaction { source })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(error = %abort, "failed to abort MongoDB transaction");
                }
                Err(err)
            }
        }
    }

    async fn delete_session(&self, id: Uuid) -> MongoResult<bool> {
        let mut session = self.begin().await?;
        let outcome = self.delete_session_in(&mut session, id).await;
        Self::finish(session, outcome).await
    }

    async fn delete_session_in(&self, session: &mut ClientSession, id: Uuid) -> MongoResult<bool> {
        let result = self
            .sessions()
            .delete_one(id_filter(id))
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION_NAME,
                source,
            })?;
        if result.deleted_count == 0 {
            return Ok(false);
        }

        let owned = doc! { "session_id": id.to_string() };
        self.answers()
            .delete_many(owned.clone())
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ANSWER_COLLECTION_NAME,
                source,
            })?;
        self.participations()
            .delete_many(owned)
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PARTICIPATION_COLLECTION_NAME,
                source,
            })?;
        Ok(true)
    }

    async fn insert_participation(&self, participation: ParticipationEntity) -> MongoResult<()> {
        let document = MongoParticipationDocument::from(&participation);
        self.participations()
            .insert_one(&document)
            .await
            .map_err(|source| {
                MongoDaoError::from_write(
                    PARTICIPATION_COLLECTION_NAME,
                    format!("{}/{}", participation.session_id, participation.user_id),
                    source,
                )
            })?;
        Ok(())
    }

    async fn find_participation(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> MongoResult<Option<ParticipationEntity>> {
        self.participations()
            .find_one(doc! { "session_id": session_id.to_string(), "user_id": user_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTICIPATION_COLLECTION_NAME,
                source,
            })?
            .map(ParticipationEntity::try_from)
            .transpose()
    }

    async fn list_participations(&self, session_id: Uuid) -> MongoResult<Vec<ParticipationEntity>> {
        let query_error = |source| MongoDaoError::Query {
            collection: PARTICIPATION_COLLECTION_NAME,
            source,
        };
        let documents: Vec<MongoParticipationDocument> = self
            .participations()
            .find(doc! { "session_id": session_id.to_string() })
            .sort(doc! { "joined_at": 1 })
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        documents
            .into_iter()
            .map(ParticipationEntity::try_from)
            .collect()
    }

    /// Insert the answer and credit its points in one transaction.
    async fn record_answer(&self, answer: AnswerEntity) -> MongoResult<ParticipationEntity> {
        let mut session = self.begin().await?;
        let outcome = self.record_answer_in(&mut session, &answer).await;
        Self::finish(session, outcome).await
    }

    async fn record_answer_in(
        &self,
        session: &mut ClientSession,
        answer: &AnswerEntity,
    ) -> MongoResult<ParticipationEntity> {
        let document = MongoAnswerDocument::from(answer);
        self.answers()
            .insert_one(&document)
            .session(&mut *session)
            .await
            .map_err(|source| {
                MongoDaoError::from_write(
                    ANSWER_COLLECTION_NAME,
                    format!("{}/{}", answer.participation_id, answer.question_id),
                    source,
                )
            })?;

        let updated = self
            .participations()
            .find_one_and_update(
                id_filter(answer.participation_id),
                doc! { "$inc": { "score": i64::from(answer.points_awarded) } },
            )
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PARTICIPATION_COLLECTION_NAME,
                source,
            })?
            .ok_or_else(|| MongoDaoError::MissingDocument {
                collection: PARTICIPATION_COLLECTION_NAME,
                id: answer.participation_id.to_string(),
            })?;

        ParticipationEntity::try_from(updated)
    }

    async fn list_answers(&self, session_id: Uuid) -> MongoResult<Vec<AnswerEntity>> {
        let query_error = |source| MongoDaoError::Query {
            collection: ANSWER_COLLECTION_NAME,
            source,
        };
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .find(doc! { "session_id": session_id.to_string() })
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        documents.into_iter().map(AnswerEntity::try_from).collect()
    }

    async fn find_quiz(&self, id: Uuid) -> MongoResult<Option<QuizEntity>> {
        self.quizzes()
            .find_one(id_filter(id))
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: QUIZ_COLLECTION_NAME,
                source,
            })?
            .map(QuizEntity::try_from)
            .transpose()
    }
}

impl SessionStore for MongoStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_session(session).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id_filter(id)).await.map_err(Into::into) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_session(doc! { "code": code })
                .await
                .map_err(Into::into)
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(id).await.map_err(Into::into) })
    }

    fn insert_participation(
        &self,
        participation: ParticipationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_participation(participation)
                .await
                .map_err(Into::into)
        })
    }

    fn find_participation(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participation(session_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participations(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_participations(session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn record_answer(
        &self,
        answer: AnswerEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipationEntity>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(answer).await.map_err(Into::into) })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(session_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}

impl QuizCatalog for MongoStore {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(id).await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    async fn scratch_store() -> MongoStore {
        let uri = std::env::var("MONGO_URI").unwrap();
        let database = format!("live_quiz_test_{}", Uuid::new_v4().simple());
        let config = MongoConfig::from_uri(&uri, Some(&database)).await.unwrap();
        MongoStore::connect(config).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "needs a MongoDB replica set in MONGO_URI"]
    async fn failed_score_credit_rolls_back_the_answer() {
        let store = scratch_store().await;
        let answer = AnswerEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            participation_id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            answer: "Paris".into(),
            is_correct: true,
            points_awarded: 10,
            time_to_answer_secs: None,
            answered_at: SystemTime::now(),
        };

        let err = store.record_answer(answer.clone()).await.unwrap_err();
        assert!(matches!(err, MongoDaoError::MissingDocument { .. }));
        assert!(store.list_answers(answer.session_id).await.unwrap().is_empty());

        store.database.drop().await.unwrap();
    }
}
