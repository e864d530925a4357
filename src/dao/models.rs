use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of question, deciding how submitted answers are evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    /// Answer is the zero-based index of one of the options.
    MultipleChoice,
    /// Answer is `true` or `false`.
    TrueFalse,
    /// Free text answer.
    Text,
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Created, participants may join, no question served yet.
    Waiting,
    /// Questions are being served.
    Active,
    /// Terminal state.
    Finished,
}

/// Why a session reached [`SessionStatus::Finished`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Advanced past the last question.
    Completed,
    /// Teacher ended the session.
    Ended,
    /// Teacher cancelled the session.
    Cancelled,
}

/// Quiz definition as exposed by the content store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizEntity {
    pub id: Uuid,
    pub title: String,
    /// Teacher owning the quiz and every session created from it.
    pub creator_id: Uuid,
    pub questions: Vec<QuestionEntity>,
}

/// Question of a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    pub id: Uuid,
    pub text: String,
    pub kind: QuestionKind,
    /// Ordered options, only meaningful for multiple choice questions.
    pub options: Option<Vec<String>>,
    /// Canonical answer; for multiple choice this is the text of the right option.
    pub correct_answer: String,
    pub points: u32,
    /// Zero-based presentation order, unique within the quiz.
    pub order: u32,
    pub time_limit_secs: Option<u32>,
}

/// One live run of a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    pub id: Uuid,
    /// Six uppercase alphanumeric characters, unique across sessions.
    pub code: String,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    /// Creator of the quiz when the session was created.
    pub owner_id: Uuid,
    /// Questions captured at creation time, sorted by order.
    pub questions: Vec<QuestionEntity>,
    pub status: SessionStatus,
    pub current_question: Option<usize>,
    pub finish_reason: Option<FinishReason>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

impl SessionEntity {
    /// Question currently served, if any.
    pub fn current_question(&self) -> Option<&QuestionEntity> {
        self.current_question
            .and_then(|index| self.questions.get(index))
    }

    /// Locate a question of the snapshot by id, returning its index.
    pub fn question(&self, id: Uuid) -> Option<(usize, &QuestionEntity)> {
        self.questions
            .iter()
            .enumerate()
            .find(|(_, question)| question.id == id)
    }
}

/// Membership of a user in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipationEntity {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    /// Display name reported by the auth service at join time.
    pub user_name: String,
    pub score: u32,
    pub joined_at: SystemTime,
}

/// Answer submitted by a participant; never modified once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    pub id: Uuid,
    pub session_id: Uuid,
    pub participation_id: Uuid,
    pub question_id: Uuid,
    pub answer: String,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub time_to_answer_secs: Option<u32>,
    pub answered_at: SystemTime,
}
