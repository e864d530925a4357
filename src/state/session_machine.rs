use std::time::SystemTime;

use thiserror::Error;

use crate::dao::models::{FinishReason, SessionEntity, SessionStatus};

/// Events that can be applied to a session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Teacher starts the session and serves the first question.
    Start,
    /// Move to the next question, finishing the session past the last one.
    Advance,
    /// Teacher ends the session early.
    End,
    /// Teacher cancels the session.
    Cancel,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while session is {from:?}")]
pub struct InvalidTransition {
    /// Status the session was in when the event was received.
    pub from: SessionStatus,
    /// The rejected event.
    pub event: SessionEvent,
}

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub event: SessionEvent,
    /// Question index once the plan is applied.
    pub current_question: Option<usize>,
    pub finish_reason: Option<FinishReason>,
}

impl Plan {
    /// Whether applying the plan finishes the session.
    pub fn finishes(&self) -> bool {
        self.to == SessionStatus::Finished
    }
}

/// Validate `event` against the session and compute the resulting status and question index.
pub fn plan(session: &SessionEntity, event: SessionEvent) -> Result<Plan, InvalidTransition> {
    let from = session.status;
    let invalid = || InvalidTransition { from, event };

    let (to, current_question, finish_reason) = match (from, event) {
        (SessionStatus::Waiting, SessionEvent::Start) => {
            if session.questions.is_empty() {
                return Err(invalid());
            }
            (SessionStatus::Active, Some(0), None)
        }
        (SessionStatus::Active, SessionEvent::Advance) => {
            let index = session.current_question.ok_or_else(invalid)?;
            if index + 1 < session.questions.len() {
                (SessionStatus::Active, Some(index + 1), None)
            } else {
                (
                    SessionStatus::Finished,
                    Some(index),
                    Some(FinishReason::Completed),
                )
            }
        }
        (SessionStatus::Waiting | SessionStatus::Active, SessionEvent::End) => (
            SessionStatus::Finished,
            session.current_question,
            Some(FinishReason::Ended),
        ),
        (SessionStatus::Waiting | SessionStatus::Active, SessionEvent::Cancel) => (
            SessionStatus::Finished,
            session.current_question,
            Some(FinishReason::Cancelled),
        ),
        _ => return Err(invalid()),
    };

    Ok(Plan {
        from,
        to,
        event,
        current_question,
        finish_reason,
    })
}

/// Apply a plan produced by [`plan`] to the session record.
pub fn apply(session: &mut SessionEntity, plan: &Plan, now: SystemTime) {
    if plan.from == SessionStatus::Waiting && plan.to == SessionStatus::Active {
        session.started_at = Some(now);
    }
    if plan.finishes() {
        session.finished_at = Some(now);
        session.finish_reason = plan.finish_reason;
    }
    session.status = plan.to;
    session.current_question = plan.current_question;
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dao::models::{QuestionEntity, QuestionKind};

    fn session(questions: usize) -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            code: "ABC123".into(),
            quiz_id: Uuid::new_v4(),
            quiz_title: "Quiz".into(),
            owner_id: Uuid::new_v4(),
            questions: (0..questions)
                .map(|order| QuestionEntity {
                    id: Uuid::new_v4(),
                    text: format!("Q{order}"),
                    kind: QuestionKind::Text,
                    options: None,
                    correct_answer: "a".into(),
                    points: 1,
                    order: order as u32,
                    time_limit_secs: None,
                })
                .collect(),
            status: SessionStatus::Waiting,
            current_question: None,
            finish_reason: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn step(session: &mut SessionEntity, event: SessionEvent) -> SessionStatus {
        let plan = plan(session, event).unwrap();
        apply(session, &plan, SystemTime::now());
        session.status
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut s = session(2);

        assert_eq!(step(&mut s, SessionEvent::Start), SessionStatus::Active);
        assert_eq!(s.current_question, Some(0));
        assert!(s.started_at.is_some());

        assert_eq!(step(&mut s, SessionEvent::Advance), SessionStatus::Active);
        assert_eq!(s.current_question, Some(1));

        assert_eq!(step(&mut s, SessionEvent::Advance), SessionStatus::Finished);
        assert_eq!(s.current_question, Some(1));
        assert_eq!(s.finish_reason, Some(FinishReason::Completed));
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn advance_while_waiting_is_rejected() {
        let s = session(2);
        let err = plan(&s, SessionEvent::Advance).unwrap_err();
        assert_eq!(err.from, SessionStatus::Waiting);
        assert_eq!(err.event, SessionEvent::Advance);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut s = session(1);
        step(&mut s, SessionEvent::Start);
        assert!(plan(&s, SessionEvent::Start).is_err());
    }

    #[test]
    fn cancel_before_start_keeps_index_empty() {
        let mut s = session(3);
        assert_eq!(step(&mut s, SessionEvent::Cancel), SessionStatus::Finished);
        assert_eq!(s.current_question, None);
        assert_eq!(s.finish_reason, Some(FinishReason::Cancelled));
        assert!(s.started_at.is_none());
    }

    #[test]
    fn finished_is_terminal() {
        let mut s = session(1);
        step(&mut s, SessionEvent::End);
        for event in [
            SessionEvent::Start,
            SessionEvent::Advance,
            SessionEvent::End,
            SessionEvent::Cancel,
        ] {
            assert!(plan(&s, event).is_err(), "{event:?} accepted after finish");
        }
    }

    #[test]
    fn start_requires_questions() {
        let s = session(0);
        assert!(plan(&s, SessionEvent::Start).is_err());
    }
}
