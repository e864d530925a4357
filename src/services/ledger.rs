//! Participations and answers of a session, with their uniqueness rules.

use std::{collections::HashSet, time::SystemTime};

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    dao::{
        models::{AnswerEntity, ParticipationEntity, SessionEntity, SessionStatus},
        storage::StorageError,
    },
    error::ServiceError,
    services::evaluator,
    state::SharedState,
};

/// Register `user` in the session, returning the participation and whether it was created.
///
/// Joining twice returns the existing participation unchanged.
pub async fn join(
    state: &SharedState,
    session: &SessionEntity,
    user: &AuthUser,
) -> Result<(ParticipationEntity, bool), ServiceError> {
    if session.status == SessionStatus::Finished {
        return Err(ServiceError::InvalidState(format!(
            "session `{}` is already finished",
            session.code
        )));
    }

    let store = state.store();
    if let Some(existing) = store.find_participation(session.id, user.id).await? {
        return Ok((existing, false));
    }

    let participation = ParticipationEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id: user.id,
        user_name: user.name.clone(),
        score: 0,
        joined_at: SystemTime::now(),
    };

    match store.insert_participation(participation.clone()).await {
        Ok(()) => {
            info!(
                session_id = %session.id,
                user_id = %user.id,
                participation_id = %participation.id,
                "participant joined"
            );
            Ok((participation, true))
        }
        Err(StorageError::Conflict(_)) => {
            debug!(session_id = %session.id, user_id = %user.id, "concurrent join resolved");
            let existing = store
                .find_participation(session.id, user.id)
                .await?
                .ok_or_else(|| {
                    ServiceError::Internal(format!(
                        "participation of `{}` in `{}` vanished after conflict",
                        user.id, session.id
                    ))
                })?;
            Ok((existing, false))
        }
        Err(err) => Err(err.into()),
    }
}

/// Evaluate and store an answer to the current question, crediting the score when correct.
///
/// Returns the stored answer and the participation with its updated score.
pub async fn record_answer(
    state: &SharedState,
    session: &SessionEntity,
    participation: &ParticipationEntity,
    question_id: Uuid,
    raw_answer: String,
    time_to_answer_secs: Option<u32>,
) -> Result<(AnswerEntity, ParticipationEntity), ServiceError> {
    if session.status != SessionStatus::Active {
        return Err(ServiceError::InvalidState(format!(
            "session `{}` is not accepting answers",
            session.code
        )));
    }

    let (index, question) = session.question(question_id).ok_or_else(|| {
        ServiceError::NotFound(format!(
            "question `{question_id}` does not belong to session `{}`",
            session.code
        ))
    })?;

    if session.current_question != Some(index) {
        return Err(ServiceError::InvalidState(format!(
            "question `{question_id}` is not the current question"
        )));
    }

    let evaluation = evaluator::evaluate(question, &raw_answer);
    let answer = AnswerEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        participation_id: participation.id,
        question_id,
        answer: raw_answer,
        is_correct: evaluation.is_correct,
        points_awarded: evaluation.points,
        time_to_answer_secs,
        answered_at: SystemTime::now(),
    };

    let updated = state
        .store()
        .record_answer(answer.clone())
        .await
        .map_err(|err| match err {
            StorageError::Conflict(_) => ServiceError::Conflict(format!(
                "question `{question_id}` has already been answered"
            )),
            other => other.into(),
        })?;

    info!(
        session_id = %session.id,
        participation_id = %participation.id,
        question_id = %question_id,
        correct = answer.is_correct,
        score = updated.score,
        "answer recorded"
    );

    Ok((answer, updated))
}

/// Whether every participation has answered the session's current question.
pub async fn answered_current(
    state: &SharedState,
    session: &SessionEntity,
) -> Result<bool, ServiceError> {
    let Some(question) = session.current_question() else {
        return Ok(false);
    };

    let participations = state.store().list_participations(session.id).await?;
    if participations.is_empty() {
        return Ok(false);
    }

    let answered: HashSet<Uuid> = state
        .store()
        .list_answers(session.id)
        .await?
        .into_iter()
        .filter(|answer| answer.question_id == question.id)
        .map(|answer| answer.participation_id)
        .collect();

    Ok(participations
        .iter()
        .all(|participation| answered.contains(&participation.id)))
}
