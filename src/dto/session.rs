use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        AnswerEntity, FinishReason, ParticipationEntity, QuestionEntity, QuestionKind,
        SessionEntity, SessionStatus,
    },
    dto::{format_system_time, validation::validate_join_code},
};

/// Payload used to open a new session for one of the caller's quizzes.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub quiz_id: Uuid,
}

/// Payload used by a student to join a session with its code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Join code; surrounding whitespace and case are ignored.
    #[validate(custom(function = "validate_join_code"))]
    pub code: String,
}

/// Answer submitted for the current question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub session_id: Uuid,
    pub question_id: Uuid,
    #[validate(length(max = 1000))]
    pub answer: String,
    /// Seconds the participant took to answer, as measured by the client.
    #[serde(default)]
    pub time_to_answer: Option<u32>,
}

/// Quiz reference carried by a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: Uuid,
    pub title: String,
    pub creator_id: Uuid,
}

/// Question as exposed to clients; the correct answer is only present when revealed.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub points: u32,
    pub order: u32,
    /// Advisory time limit in seconds.
    pub time_limit: u32,
}

impl QuestionView {
    pub fn new(question: &QuestionEntity, default_time_limit: u32, reveal: bool) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            kind: question.kind,
            options: question.options.clone(),
            correct_answer: reveal.then(|| question.correct_answer.clone()),
            points: question.points,
            order: question.order,
            time_limit: question.time_limit_secs.unwrap_or(default_time_limit),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationView {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub score: u32,
    pub joined_at: String,
}

impl From<&ParticipationEntity> for ParticipationView {
    fn from(value: &ParticipationEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            user_name: value.user_name.clone(),
            score: value.score,
            joined_at: format_system_time(value.joined_at),
        }
    }
}

/// Stored answer; correctness and points are withheld until revealed.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    pub id: Uuid,
    pub participation_id: Uuid,
    pub question_id: Uuid,
    pub answer: String,
    pub is_correct: Option<bool>,
    pub points_awarded: Option<u32>,
    pub time_to_answer: Option<u32>,
    pub answered_at: String,
}

impl AnswerView {
    pub fn new(answer: &AnswerEntity, reveal: bool) -> Self {
        Self {
            id: answer.id,
            participation_id: answer.participation_id,
            question_id: answer.question_id,
            answer: answer.answer.clone(),
            is_correct: reveal.then_some(answer.is_correct),
            points_awarded: reveal.then_some(answer.points_awarded),
            time_to_answer: answer.time_to_answer_secs,
            answered_at: format_system_time(answer.answered_at),
        }
    }
}

/// Full session snapshot.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub code: String,
    pub status: SessionStatus,
    pub quiz: QuizSummary,
    pub current_question_index: Option<usize>,
    pub total_questions: usize,
    pub questions: Vec<QuestionView>,
    pub participations: Vec<ParticipationView>,
    pub answers: Vec<AnswerView>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

impl SessionView {
    /// Build a snapshot; `reveal` exposes correct answers and answer correctness.
    pub fn build(
        session: &SessionEntity,
        participations: &[ParticipationEntity],
        answers: &[AnswerEntity],
        default_time_limit: u32,
        reveal: bool,
    ) -> Self {
        Self {
            id: session.id,
            code: session.code.clone(),
            status: session.status,
            quiz: QuizSummary {
                id: session.quiz_id,
                title: session.quiz_title.clone(),
                creator_id: session.owner_id,
            },
            current_question_index: session.current_question,
            total_questions: session.questions.len(),
            questions: session
                .questions
                .iter()
                .map(|question| QuestionView::new(question, default_time_limit, reveal))
                .collect(),
            participations: participations.iter().map(Into::into).collect(),
            answers: answers
                .iter()
                .map(|answer| AnswerView::new(answer, reveal))
                .collect(),
            created_at: format_system_time(session.created_at),
            started_at: session.started_at.map(format_system_time),
            finished_at: session.finished_at.map(format_system_time),
            finish_reason: session.finish_reason,
        }
    }
}

/// Response of `POST /sessions/join`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    pub session: SessionView,
    pub participation: ParticipationView,
}

/// Response of `POST /sessions/answer`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerResponse {
    pub answer: AnswerView,
    pub is_correct: bool,
    pub points: u32,
}
