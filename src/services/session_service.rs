//! Session orchestration: validates commands, mutates the ledger and lifecycle, then broadcasts.
//!
//! Every mutating command runs under the session's command lock. Events are published only once
//! the corresponding write has been persisted.

use std::{collections::HashSet, time::SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    dao::{
        models::{
            ParticipationEntity, QuestionKind, QuizEntity, SessionEntity, SessionStatus,
        },
        storage::StorageError,
    },
    dto::{
        leaderboard::LeaderboardEntry,
        session::{
            AnswerView, JoinSessionResponse, ParticipationView, QuestionView, SessionView,
            SubmitAnswerRequest, SubmitAnswerResponse,
        },
        validation::validate_join_code,
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{code_generator, leaderboard, ledger},
    state::{
        ConnectionHandle, SharedState,
        session_machine::{self, Plan, SessionEvent},
    },
};

const CANCELLED_MESSAGE: &str = "The session has been cancelled by the teacher";

/// Open a new `WAITING` session for one of the teacher's quizzes.
pub async fn create_session(
    state: &SharedState,
    user: &AuthUser,
    quiz_id: Uuid,
) -> Result<SessionView, ServiceError> {
    if !user.is_teacher() {
        return Err(ServiceError::Forbidden(
            "only teachers can create sessions".into(),
        ));
    }

    let mut quiz = state
        .quizzes()
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))?;

    if quiz.creator_id != user.id {
        return Err(ServiceError::Forbidden(format!(
            "quiz `{quiz_id}` belongs to another teacher"
        )));
    }
    validate_quiz(&mut quiz)?;

    let store = state.store();
    let session = loop {
        let code = code_generator::generate();
        if store.find_session_by_code(code.clone()).await?.is_some() {
            debug!(code = %code, "join code already taken; drawing again");
            continue;
        }

        let session = SessionEntity {
            id: Uuid::new_v4(),
            code,
            quiz_id: quiz.id,
            quiz_title: quiz.title.clone(),
            owner_id: quiz.creator_id,
            questions: quiz.questions.clone(),
            status: SessionStatus::Waiting,
            current_question: None,
            finish_reason: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        };

        match store.insert_session(session.clone()).await {
            Ok(()) => break session,
            Err(StorageError::Conflict(_)) => {
                debug!(code = %session.code, "join code claimed concurrently; drawing again");
            }
            Err(err) => return Err(err.into()),
        }
    };

    info!(
        session_id = %session.id,
        code = %session.code,
        quiz_id = %quiz.id,
        questions = session.questions.len(),
        "session created"
    );

    Ok(SessionView::build(
        &session,
        &[],
        &[],
        state.config().default_time_limit_secs(),
        true,
    ))
}

/// Join a session by code. Returns the response and whether a participation was created.
pub async fn join_session(
    state: &SharedState,
    user: &AuthUser,
    raw_code: &str,
) -> Result<(JoinSessionResponse, bool), ServiceError> {
    let code = code_generator::normalize(raw_code);
    validate_join_code(&code).map_err(|err| ServiceError::Validation(err.to_string()))?;

    let session = state
        .store()
        .find_session_by_code(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no session with code `{code}`")))?;
    let session_id = session.id;

    let member = user.clone();
    let (participation, created) = state
        .run_serialized(session_id, move |state| async move {
            let session = load_session(&state, session_id).await?;
            let (participation, created) = ledger::join(&state, &session, &member).await?;
            if created {
                state.gateway().publish(
                    session_id,
                    &ServerMessage::ParticipantJoined {
                        user_id: member.id,
                        user_name: participation.user_name.clone(),
                    },
                );
            }
            Ok((participation, created))
        })
        .await?;

    let session = load_session(state, session_id).await?;
    let view = view_for(state, &session, user.id).await?;
    Ok((
        JoinSessionResponse {
            session: view,
            participation: ParticipationView::from(&participation),
        },
        created,
    ))
}

/// Start the session and serve its first question.
pub async fn start_session(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let user = user.clone();
    state
        .run_serialized(session_id, move |state| async move {
            let mut session = load_session(&state, session_id).await?;
            ensure_owner(&session, &user)?;

            let participations = state.store().list_participations(session_id).await?;
            if session.status == SessionStatus::Waiting
                && participations.is_empty()
                && state.config().require_participants_to_start()
            {
                return Err(ServiceError::InvalidState(
                    "at least one participant must join before starting".into(),
                ));
            }

            let plan = session_machine::plan(&session, SessionEvent::Start)?;
            commit(&state, &mut session, &plan).await?;

            let limit = state.config().default_time_limit_secs();
            let snapshot = SessionView::build(&session, &participations, &[], limit, false);
            state
                .gateway()
                .publish(session_id, &ServerMessage::SessionStarted { session: snapshot });
            publish_current_question(&state, &session);

            Ok(SessionView::build(&session, &participations, &[], limit, true))
        })
        .await
}

/// Record an answer to the current question and auto-advance once everyone has answered.
///
/// `ack` receives `answer-submitted` before any other event caused by the submission.
pub async fn submit_answer(
    state: &SharedState,
    user: &AuthUser,
    request: SubmitAnswerRequest,
    ack: Option<&ConnectionHandle>,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let session_id = request.session_id;
    let user = user.clone();
    let ack = ack.cloned();
    state
        .run_serialized(session_id, move |state| async move {
            let session = load_session(&state, session_id).await?;
            let participation = state
                .store()
                .find_participation(session_id, user.id)
                .await?
                .ok_or_else(|| {
                    ServiceError::Forbidden(format!(
                        "you have not joined session `{}`",
                        session.code
                    ))
                })?;

            let (answer, _) = ledger::record_answer(
                &state,
                &session,
                &participation,
                request.question_id,
                request.answer,
                request.time_to_answer,
            )
            .await?;

            if let Some(connection) = &ack {
                state.gateway().send_to(
                    connection,
                    ServerMessage::AnswerSubmitted {
                        question_id: answer.question_id,
                    },
                );
            }
            state.gateway().publish_except_user(
                session_id,
                user.id,
                &ServerMessage::AnswerReceived {
                    participation_id: participation.id,
                    user_id: user.id,
                },
            );

            match ledger::answered_current(&state, &session).await {
                Ok(true) => {
                    info!(session_id = %session_id, "every participant answered; advancing");
                    if let Err(err) = advance(&state, session).await {
                        warn!(session_id = %session_id, error = %err, "auto-advance failed");
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "failed to check answer coverage");
                }
            }

            Ok(SubmitAnswerResponse {
                is_correct: answer.is_correct,
                points: answer.points_awarded,
                answer: AnswerView::new(&answer, true),
            })
        })
        .await
}

/// Close the current question and serve the next one, finishing after the last.
pub async fn next_question(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let owner = user.clone();
    let session = state
        .run_serialized(session_id, move |state| async move {
            let session = load_session(&state, session_id).await?;
            ensure_owner(&session, &owner)?;
            advance(&state, session).await
        })
        .await?;
    view_for(state, &session, user.id).await
}

/// End the session early and publish the final leaderboard.
pub async fn end_session(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let owner = user.clone();
    let session = state
        .run_serialized(session_id, move |state| async move {
            let mut session = load_session(&state, session_id).await?;
            ensure_owner(&session, &owner)?;
            let plan = session_machine::plan(&session, SessionEvent::End)?;
            commit(&state, &mut session, &plan).await?;

            let participations = state.store().list_participations(session_id).await?;
            state.gateway().publish(
                session_id,
                &ServerMessage::SessionEnded {
                    final_leaderboard: leaderboard::compute(&participations),
                },
            );
            Ok(session)
        })
        .await?;
    view_for(state, &session, user.id).await
}

/// Cancel the session; participants are told the session will not continue.
pub async fn cancel_session(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let owner = user.clone();
    let session = state
        .run_serialized(session_id, move |state| async move {
            let mut session = load_session(&state, session_id).await?;
            ensure_owner(&session, &owner)?;
            let plan = session_machine::plan(&session, SessionEvent::Cancel)?;
            commit(&state, &mut session, &plan).await?;

            state.gateway().publish(
                session_id,
                &ServerMessage::SessionCancelled {
                    message: CANCELLED_MESSAGE.into(),
                },
            );
            Ok(session)
        })
        .await?;
    view_for(state, &session, user.id).await
}

/// Snapshot of a session as seen by `user`, who must own it or have joined it.
pub async fn get_session(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let session = load_session(state, session_id).await?;
    ensure_member(state, &session, user).await?;
    view_for(state, &session, user.id).await
}

/// Current standings, recomputed on every call. Restricted to the owner and participants.
pub async fn leaderboard(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let session = load_session(state, session_id).await?;
    ensure_member(state, &session, user).await?;
    let participations = state.store().list_participations(session_id).await?;
    Ok(leaderboard::compute(&participations))
}

/// Delete a session with its participations and answers. Rejected while it is running.
pub async fn delete_session(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<(), ServiceError> {
    let owner = user.clone();
    state
        .run_serialized(session_id, move |state| async move {
            let session = load_session(&state, session_id).await?;
            ensure_owner(&session, &owner)?;
            if session.status == SessionStatus::Active {
                return Err(ServiceError::InvalidState(
                    "an active session cannot be deleted; end it first".into(),
                ));
            }

            if !state.store().delete_session(session_id).await? {
                return Err(ServiceError::NotFound(format!(
                    "session `{session_id}` not found"
                )));
            }
            state.gateway().close_session(session_id);
            info!(session_id = %session_id, "session deleted");
            Ok(())
        })
        .await
}

/// Add a realtime connection to the session group, announce it to the rest of the group and
/// return the snapshot to send it.
pub async fn subscribe(
    state: &SharedState,
    user: &AuthUser,
    session_id: Uuid,
    connection: &ConnectionHandle,
) -> Result<SessionView, ServiceError> {
    let session = load_session(state, session_id).await?;
    ensure_member(state, &session, user).await?;
    state.gateway().subscribe(session_id, connection.clone());
    state.gateway().publish_except_connection(
        session_id,
        connection.id,
        &ServerMessage::ParticipantJoined {
            user_id: user.id,
            user_name: user.name.clone(),
        },
    );
    debug!(session_id = %session_id, user_id = %user.id, "connection subscribed");
    view_for(state, &session, user.id).await
}

/// Remove a realtime connection from the session group and tell the others.
pub fn unsubscribe(state: &SharedState, session_id: Uuid, connection: &ConnectionHandle) {
    if state.gateway().unsubscribe(session_id, connection.id) {
        state.gateway().publish(
            session_id,
            &ServerMessage::ParticipantLeft {
                user_id: connection.user_id,
            },
        );
    }
}

/// Drop a closed connection from every group and announce the disconnection.
pub fn disconnect(state: &SharedState, connection: &ConnectionHandle) {
    for (session_id, user_id) in state.gateway().disconnect(connection.id) {
        state
            .gateway()
            .publish(session_id, &ServerMessage::ParticipantDisconnected { user_id });
    }
}

/// Advance an active session; the caller holds the session's command lock.
async fn advance(
    state: &SharedState,
    mut session: SessionEntity,
) -> Result<SessionEntity, ServiceError> {
    let plan = session_machine::plan(&session, SessionEvent::Advance)?;
    let ended = session.current_question().cloned().ok_or_else(|| {
        ServiceError::Internal(format!("active session `{}` has no current question", session.id))
    })?;
    commit(state, &mut session, &plan).await?;

    let participations = state.store().list_participations(session.id).await?;
    let standings = leaderboard::compute(&participations);
    state.gateway().publish(
        session.id,
        &ServerMessage::QuestionEnded {
            question_id: ended.id,
            correct_answer: ended.correct_answer,
            leaderboard: standings.clone(),
        },
    );

    if plan.finishes() {
        state.gateway().publish(
            session.id,
            &ServerMessage::SessionEnded {
                final_leaderboard: standings,
            },
        );
    } else {
        publish_current_question(state, &session);
    }
    Ok(session)
}

/// Apply a transition plan and persist it; `session` is only updated once the write succeeded.
async fn commit(
    state: &SharedState,
    session: &mut SessionEntity,
    plan: &Plan,
) -> Result<(), ServiceError> {
    let mut next = session.clone();
    session_machine::apply(&mut next, plan, SystemTime::now());
    state.store().update_session(next.clone()).await?;

    info!(
        session_id = %next.id,
        event = ?plan.event,
        from = ?plan.from,
        to = ?plan.to,
        question = ?next.current_question,
        "session transition"
    );
    *session = next;
    Ok(())
}

fn publish_current_question(state: &SharedState, session: &SessionEntity) {
    let (Some(index), Some(question)) = (session.current_question, session.current_question())
    else {
        return;
    };

    let view = QuestionView::new(question, state.config().default_time_limit_secs(), false);
    state.gateway().publish(
        session.id,
        &ServerMessage::QuestionBroadcast {
            time_limit: view.time_limit,
            question: view,
            question_number: index + 1,
            total_questions: session.questions.len(),
        },
    );
}

async fn load_session(state: &SharedState, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    state
        .store()
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}

fn ensure_owner(session: &SessionEntity, user: &AuthUser) -> Result<(), ServiceError> {
    if session.owner_id == user.id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only the quiz creator can manage this session".into(),
        ))
    }
}

async fn ensure_member(
    state: &SharedState,
    session: &SessionEntity,
    user: &AuthUser,
) -> Result<(), ServiceError> {
    if session.owner_id == user.id
        || state
            .store()
            .find_participation(session.id, user.id)
            .await?
            .is_some()
    {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "you have not joined session `{}`",
            session.code
        )))
    }
}

/// Build the snapshot `viewer` may see: correct answers stay hidden from non-owners until the end.
async fn view_for(
    state: &SharedState,
    session: &SessionEntity,
    viewer: Uuid,
) -> Result<SessionView, ServiceError> {
    let participations: Vec<ParticipationEntity> =
        state.store().list_participations(session.id).await?;
    let answers = state.store().list_answers(session.id).await?;
    let reveal = session.owner_id == viewer || session.status == SessionStatus::Finished;
    Ok(SessionView::build(
        session,
        &participations,
        &answers,
        state.config().default_time_limit_secs(),
        reveal,
    ))
}

/// Sort questions by order and reject quizzes a session cannot be run from.
fn validate_quiz(quiz: &mut QuizEntity) -> Result<(), ServiceError> {
    if quiz.questions.is_empty() {
        return Err(ServiceError::Validation(format!(
            "quiz `{}` has no questions",
            quiz.id
        )));
    }

    quiz.questions.sort_by_key(|question| question.order);
    let mut orders = HashSet::new();
    for question in &quiz.questions {
        if !orders.insert(question.order) {
            return Err(ServiceError::Validation(format!(
                "quiz `{}` has several questions with order {}",
                quiz.id, question.order
            )));
        }
        let has_options = question
            .options
            .as_ref()
            .is_some_and(|options| !options.is_empty());
        if question.kind == QuestionKind::MultipleChoice && !has_options {
            return Err(ServiceError::Validation(format!(
                "multiple choice question `{}` has no options",
                question.id
            )));
        }
        if question.points == 0 {
            return Err(ServiceError::Validation(format!(
                "question `{}` must be worth at least one point",
                question.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use futures::future::BoxFuture;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        auth::{Role, StaticAuthenticator},
        config::AppConfig,
        dao::{
            models::{AnswerEntity, FinishReason, QuestionEntity},
            quiz_catalog::MemoryQuizCatalog,
            session_store::{MemorySessionStore, SessionStore},
            storage::StorageResult,
        },
        state::AppState,
    };

    /// Memory store whose participation listing stalls while `slow` is set.
    #[derive(Clone, Default)]
    struct StallingStore {
        inner: MemorySessionStore,
        slow: Arc<AtomicBool>,
    }

    impl SessionStore for StallingStore {
        fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_session(session)
        }

        fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update_session(session)
        }

        fn find_session(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.find_session(id)
        }

        fn find_session_by_code(
            &self,
            code: String,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.find_session_by_code(code)
        }

        fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.delete_session(id)
        }

        fn insert_participation(
            &self,
            participation: ParticipationEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_participation(participation)
        }

        fn find_participation(
            &self,
            session_id: Uuid,
            user_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<ParticipationEntity>>> {
            self.inner.find_participation(session_id, user_id)
        }

        fn list_participations(
            &self,
            session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<ParticipationEntity>>> {
            let listing = self.inner.list_participations(session_id);
            let slow = self.slow.load(Ordering::SeqCst);
            Box::pin(async move {
                if slow {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                listing.await
            })
        }

        fn record_answer(
            &self,
            answer: AnswerEntity,
        ) -> BoxFuture<'static, StorageResult<ParticipationEntity>> {
            self.inner.record_answer(answer)
        }

        fn list_answers(
            &self,
            session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
            self.inner.list_answers(session_id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
    }

    struct Fixture {
        state: SharedState,
        teacher: AuthUser,
        quiz_id: Uuid,
    }

    fn user(name: &str, role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
        }
    }

    fn fixture(config: AppConfig) -> Fixture {
        fixture_with_store(config, Arc::new(MemorySessionStore::new()))
    }

    fn fixture_with_store(config: AppConfig, store: Arc<dyn SessionStore>) -> Fixture {
        let teacher = user("Teacher", Role::Teacher);
        let quiz = QuizEntity {
            id: Uuid::new_v4(),
            title: "Geography".into(),
            creator_id: teacher.id,
            questions: vec![
                QuestionEntity {
                    id: Uuid::new_v4(),
                    text: "Capital of France?".into(),
                    kind: QuestionKind::Text,
                    options: None,
                    correct_answer: "Paris".into(),
                    points: 10,
                    order: 0,
                    time_limit_secs: Some(20),
                },
                QuestionEntity {
                    id: Uuid::new_v4(),
                    text: "Largest ocean?".into(),
                    kind: QuestionKind::MultipleChoice,
                    options: Some(vec!["Atlantic".into(), "Pacific".into()]),
                    correct_answer: "Pacific".into(),
                    points: 5,
                    order: 1,
                    time_limit_secs: None,
                },
            ],
        };
        let quiz_id = quiz.id;
        let state = AppState::new(
            store,
            Arc::new(MemoryQuizCatalog::with_quizzes([quiz])),
            Arc::new(StaticAuthenticator::default()),
            config,
        );
        Fixture {
            state,
            teacher,
            quiz_id,
        }
    }

    fn answer(session: &SessionView, index: usize, answer: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            session_id: session.id,
            question_id: session.questions[index].id,
            answer: answer.into(),
            time_to_answer: Some(3),
        }
    }

    #[tokio::test]
    async fn students_cannot_create_sessions() {
        let fx = fixture(AppConfig::default());
        let student = user("Student", Role::Student);
        let err = create_session(&fx.state, &student, fx.quiz_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn teachers_cannot_run_someone_elses_quiz() {
        let fx = fixture(AppConfig::default());
        let other = user("Other", Role::Teacher);
        let err = create_session(&fx.state, &other, fx.quiz_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = create_session(&fx.state, &fx.teacher, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn created_session_waits_with_a_valid_code() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.current_question_index, None);
        assert!(validate_join_code(&session.code).is_ok());
        assert_eq!(session.questions[0].correct_answer.as_deref(), Some("Paris"));
    }

    #[tokio::test]
    async fn join_is_idempotent_and_normalizes_the_code() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let student = user("Ada", Role::Student);

        let lower = format!("  {} ", session.code.to_lowercase());
        let (first, created) = join_session(&fx.state, &student, &lower).await.unwrap();
        assert!(created);
        let (second, created) = join_session(&fx.state, &student, &session.code)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.participation.id, second.participation.id);
        assert_eq!(second.session.participations.len(), 1);
        assert!(second.session.questions[0].correct_answer.is_none());
    }

    #[tokio::test]
    async fn join_with_unknown_or_malformed_code_fails() {
        let fx = fixture(AppConfig::default());
        let student = user("Ada", Role::Student);
        assert!(matches!(
            join_session(&fx.state, &student, "ZZZZZZ").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            join_session(&fx.state, &student, "nope").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn start_requires_a_participant_unless_disabled() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        assert!(matches!(
            start_session(&fx.state, &fx.teacher, session.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        let fx = fixture(AppConfig::default().with_require_participants_to_start(false));
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let started = start_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();
        assert_eq!(started.status, SessionStatus::Active);
        assert_eq!(started.current_question_index, Some(0));
    }

    #[tokio::test]
    async fn lifecycle_guards_reject_out_of_order_commands() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let student = user("Ada", Role::Student);
        join_session(&fx.state, &student, &session.code)
            .await
            .unwrap();

        assert!(matches!(
            next_question(&fx.state, &fx.teacher, session.id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            start_session(&fx.state, &student, session.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        start_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();
        assert!(matches!(
            start_session(&fx.state, &fx.teacher, session.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        end_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();
        assert!(matches!(
            submit_answer(&fx.state, &student, answer(&session, 0, "Paris"), None).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn answers_are_accepted_once_and_only_for_the_current_question() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let ada = user("Ada", Role::Student);
        let bob = user("Bob", Role::Student);
        let outsider = user("Eve", Role::Student);
        join_session(&fx.state, &ada, &session.code).await.unwrap();
        join_session(&fx.state, &bob, &session.code).await.unwrap();
        start_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();

        assert!(matches!(
            submit_answer(&fx.state, &ada, answer(&session, 1, "1"), None).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            submit_answer(&fx.state, &outsider, answer(&session, 0, "Paris"), None).await,
            Err(ServiceError::Forbidden(_))
        ));

        let accepted = submit_answer(&fx.state, &ada, answer(&session, 0, " paris "), None)
            .await
            .unwrap();
        assert!(accepted.is_correct);
        assert_eq!(accepted.points, 10);

        let again = submit_answer(&fx.state, &ada, answer(&session, 0, "Paris"), None).await;
        assert!(matches!(again, Err(ServiceError::Conflict(_))));

        let board = leaderboard(&fx.state, &ada, session.id).await.unwrap();
        assert_eq!(board[0].user_name, "Ada");
        assert_eq!(board[0].score, 10);
        assert_eq!(board[1].score, 0);

        let view = get_session(&fx.state, &fx.teacher, session.id).await.unwrap();
        assert_eq!(view.current_question_index, Some(0));
    }

    #[tokio::test]
    async fn last_answer_advances_and_ack_precedes_broadcasts() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let ada = user("Ada", Role::Student);
        join_session(&fx.state, &ada, &session.code).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(ada.id, tx);
        subscribe(&fx.state, &ada, session.id, &connection)
            .await
            .unwrap();
        start_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}

        submit_answer(
            &fx.state,
            &ada,
            answer(&session, 0, "Lyon"),
            Some(&connection),
        )
        .await
        .unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::AnswerSubmitted { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::QuestionEnded { correct_answer, .. } if correct_answer == "Paris"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::QuestionBroadcast { question_number: 2, total_questions: 2, .. }
        ));
    }

    #[tokio::test]
    async fn cancel_and_delete() {
        let fx = fixture(AppConfig::default().with_command_timeout(Duration::from_secs(1)));
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let ada = user("Ada", Role::Student);
        join_session(&fx.state, &ada, &session.code).await.unwrap();
        start_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();

        assert!(matches!(
            delete_session(&fx.state, &fx.teacher, session.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        let cancelled = cancel_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, SessionStatus::Finished);
        assert_eq!(cancelled.finish_reason, Some(FinishReason::Cancelled));

        assert!(matches!(
            join_session(&fx.state, &user("Late", Role::Student), &session.code).await,
            Err(ServiceError::InvalidState(_))
        ));

        delete_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();
        assert!(matches!(
            get_session(&fx.state, &fx.teacher, session.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn non_members_cannot_read_or_subscribe() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let outsider = user("Eve", Role::Student);
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(outsider.id, tx);

        assert!(matches!(
            get_session(&fx.state, &outsider, session.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            subscribe(&fx.state, &outsider, session.id, &connection).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(fx.state.gateway().subscriber_count(session.id), 0);
    }

    #[tokio::test]
    async fn abandoned_submission_still_advances_the_session() {
        let store = StallingStore::default();
        let slow = store.slow.clone();
        let fx = fixture_with_store(AppConfig::default(), Arc::new(store));
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let ada = user("Ada", Role::Student);
        join_session(&fx.state, &ada, &session.code).await.unwrap();
        start_session(&fx.state, &fx.teacher, session.id)
            .await
            .unwrap();

        slow.store(true, Ordering::SeqCst);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            submit_answer(&fx.state, &ada, answer(&session, 0, "Paris"), None),
        )
        .await;
        assert!(abandoned.is_err());
        slow.store(false, Ordering::SeqCst);

        // Waits for the detached submission to release the session.
        fx.state
            .run_serialized(session.id, |_| async { Ok(()) })
            .await
            .unwrap();

        let view = get_session(&fx.state, &fx.teacher, session.id).await.unwrap();
        assert_eq!(view.current_question_index, Some(1));
        assert_eq!(view.answers.len(), 1);
        assert_eq!(view.participations[0].score, 10);
    }

    #[tokio::test]
    async fn realtime_rejoin_is_announced_to_the_group() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let ada = user("Ada", Role::Student);
        join_session(&fx.state, &ada, &session.code).await.unwrap();

        let (teacher_tx, mut teacher_rx) = mpsc::unbounded_channel();
        let teacher_conn = ConnectionHandle::new(fx.teacher.id, teacher_tx);
        subscribe(&fx.state, &fx.teacher, session.id, &teacher_conn)
            .await
            .unwrap();

        let (ada_tx, mut ada_rx) = mpsc::unbounded_channel();
        let ada_conn = ConnectionHandle::new(ada.id, ada_tx);
        subscribe(&fx.state, &ada, session.id, &ada_conn).await.unwrap();
        unsubscribe(&fx.state, session.id, &ada_conn);
        subscribe(&fx.state, &ada, session.id, &ada_conn).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = teacher_rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(
            events.as_slice(),
            [
                ServerMessage::ParticipantJoined { user_id: first, .. },
                ServerMessage::ParticipantLeft { .. },
                ServerMessage::ParticipantJoined { user_id: again, user_name },
            ] if *first == ada.id && *again == ada.id && user_name == "Ada"
        ));
        assert!(ada_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leaderboard_is_limited_to_members() {
        let fx = fixture(AppConfig::default());
        let session = create_session(&fx.state, &fx.teacher, fx.quiz_id)
            .await
            .unwrap();
        let ada = user("Ada", Role::Student);
        join_session(&fx.state, &ada, &session.code).await.unwrap();

        assert!(matches!(
            leaderboard(&fx.state, &user("Eve", Role::Student), session.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(
            leaderboard(&fx.state, &fx.teacher, session.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
