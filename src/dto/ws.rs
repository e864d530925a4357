use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::{
    leaderboard::LeaderboardEntry,
    session::{QuestionView, SessionView},
};

/// Commands accepted from realtime clients, framed as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinSession {
        session_id: Uuid,
    },
    LeaveSession {
        session_id: Uuid,
    },
    StartSession {
        session_id: Uuid,
    },
    NextQuestion {
        session_id: Uuid,
    },
    SubmitAnswer {
        session_id: Uuid,
        question_id: Uuid,
        answer: String,
        #[serde(default)]
        time_to_answer: Option<u32>,
    },
    EndSession {
        session_id: Uuid,
    },
    CancelSession {
        session_id: Uuid,
    },
}

impl ClientMessage {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Events pushed to realtime clients.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Snapshot sent to a connection right after it joined a session group.
    SessionState { session: SessionView },
    ParticipantJoined { user_id: Uuid, user_name: String },
    ParticipantLeft { user_id: Uuid },
    ParticipantDisconnected { user_id: Uuid },
    SessionStarted { session: SessionView },
    QuestionBroadcast {
        question: QuestionView,
        time_limit: u32,
        /// 1-based position of the question.
        question_number: usize,
        total_questions: usize,
    },
    QuestionEnded {
        question_id: Uuid,
        correct_answer: String,
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// Acknowledgement to the submitting connection.
    AnswerSubmitted { question_id: Uuid },
    /// Someone else in the group answered the current question.
    AnswerReceived { participation_id: Uuid, user_id: Uuid },
    SessionEnded { final_leaderboard: Vec<LeaderboardEntry> },
    SessionCancelled { message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
