use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    AnswerEntity, FinishReason, ParticipationEntity, QuestionEntity, QuestionKind, QuizEntity,
    SessionEntity, SessionStatus,
};

pub const SESSION_COLLECTION_NAME: &str = "sessions";
pub const PARTICIPATION_COLLECTION_NAME: &str = "participations";
pub const ANSWER_COLLECTION_NAME: &str = "answers";
pub const QUIZ_COLLECTION_NAME: &str = "quizzes";

// Identifiers are stored as hyphenated strings so filters stay readable in the shell.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    id: String,
    text: String,
    kind: QuestionKind,
    #[serde(default)]
    options: Option<Vec<String>>,
    correct_answer: String,
    points: i64,
    order: i64,
    #[serde(default)]
    time_limit_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    creator_id: String,
    #[serde(default)]
    questions: Vec<MongoQuestionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    code: String,
    quiz_id: String,
    quiz_title: String,
    owner_id: String,
    questions: Vec<MongoQuestionDocument>,
    status: SessionStatus,
    current_question: Option<i64>,
    finish_reason: Option<FinishReason>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    finished_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipationDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    user_id: String,
    user_name: String,
    score: i64,
    joined_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    participation_id: String,
    question_id: String,
    answer: String,
    is_correct: bool,
    points_awarded: i64,
    time_to_answer_secs: Option<i64>,
    answered_at: DateTime,
}

fn parse_id(collection: &'static str, owner: &str, value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| MongoDaoError::CorruptDocument {
        collection,
        id: owner.to_owned(),
        reason: format!("invalid identifier `{value}`: {err}"),
    })
}

fn to_u32(collection: &'static str, owner: &str, field: &str, value: i64) -> MongoResult<u32> {
    u32::try_from(value).map_err(|_| MongoDaoError::CorruptDocument {
        collection,
        id: owner.to_owned(),
        reason: format!("field `{field}` out of range: {value}"),
    })
}

impl From<&QuestionEntity> for MongoQuestionDocument {
    fn from(value: &QuestionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            text: value.text.clone(),
            kind: value.kind,
            options: value.options.clone(),
            correct_answer: value.correct_answer.clone(),
            points: i64::from(value.points),
            order: i64::from(value.order),
            time_limit_secs: value.time_limit_secs.map(i64::from),
        }
    }
}

impl MongoQuestionDocument {
    fn into_entity(self, collection: &'static str) -> MongoResult<QuestionEntity> {
        Ok(QuestionEntity {
            id: parse_id(collection, &self.id, &self.id)?,
            points: to_u32(collection, &self.id, "points", self.points)?,
            order: to_u32(collection, &self.id, "order", self.order)?,
            time_limit_secs: self
                .time_limit_secs
                .map(|secs| to_u32(collection, &self.id, "time_limit_secs", secs))
                .transpose()?,
            text: self.text,
            kind: self.kind,
            options: self.options,
            correct_answer: self.correct_answer,
        })
    }
}

impl TryFrom<MongoQuizDocument> for QuizEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuizDocument) -> MongoResult<Self> {
        let collection = QUIZ_COLLECTION_NAME;
        let mut questions = value
            .questions
            .into_iter()
            .map(|question| question.into_entity(collection))
            .collect::<MongoResult<Vec<_>>>()?;
        questions.sort_by_key(|question| question.order);

        Ok(Self {
            id: parse_id(collection, &value.id, &value.id)?,
            creator_id: parse_id(collection, &value.id, &value.creator_id)?,
            title: value.title,
            questions,
        })
    }
}

impl From<&SessionEntity> for MongoSessionDocument {
    fn from(value: &SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            code: value.code.clone(),
            quiz_id: value.quiz_id.to_string(),
            quiz_title: value.quiz_title.clone(),
            owner_id: value.owner_id.to_string(),
            questions: value.questions.iter().map(Into::into).collect(),
            status: value.status,
            current_question: value.current_question.map(|index| index as i64),
            finish_reason: value.finish_reason,
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            finished_at: value.finished_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> MongoResult<Self> {
        let collection = SESSION_COLLECTION_NAME;
        let current_question = value
            .current_question
            .map(|index| {
                usize::try_from(index).map_err(|_| MongoDaoError::CorruptDocument {
                    collection,
                    id: value.id.clone(),
                    reason: format!("negative question index {index}"),
                })
            })
            .transpose()?;

        Ok(Self {
            id: parse_id(collection, &value.id, &value.id)?,
            quiz_id: parse_id(collection, &value.id, &value.quiz_id)?,
            owner_id: parse_id(collection, &value.id, &value.owner_id)?,
            questions: value
                .questions
                .into_iter()
                .map(|question| question.into_entity(collection))
                .collect::<MongoResult<Vec<_>>>()?,
            code: value.code,
            quiz_title: value.quiz_title,
            status: value.status,
            current_question,
            finish_reason: value.finish_reason,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(DateTime::to_system_time),
            finished_at: value.finished_at.map(DateTime::to_system_time),
        })
    }
}

impl From<&ParticipationEntity> for MongoParticipationDocument {
    fn from(value: &ParticipationEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            user_id: value.user_id.to_string(),
            user_name: value.user_name.clone(),
            score: i64::from(value.score),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoParticipationDocument> for ParticipationEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipationDocument) -> MongoResult<Self> {
        let collection = PARTICIPATION_COLLECTION_NAME;
        Ok(Self {
            id: parse_id(collection, &value.id, &value.id)?,
            session_id: parse_id(collection, &value.id, &value.session_id)?,
            user_id: parse_id(collection, &value.id, &value.user_id)?,
            score: to_u32(collection, &value.id, "score", value.score)?,
            user_name: value.user_name,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

impl From<&AnswerEntity> for MongoAnswerDocument {
    fn from(value: &AnswerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            participation_id: value.participation_id.to_string(),
            question_id: value.question_id.to_string(),
            answer: value.answer.clone(),
            is_correct: value.is_correct,
            points_awarded: i64::from(value.points_awarded),
            time_to_answer_secs: value.time_to_answer_secs.map(i64::from),
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

impl TryFrom<MongoAnswerDocument> for AnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> MongoResult<Self> {
        let collection = ANSWER_COLLECTION_NAME;
        Ok(Self {
            id: parse_id(collection, &value.id, &value.id)?,
            session_id: parse_id(collection, &value.id, &value.session_id)?,
            participation_id: parse_id(collection, &value.id, &value.participation_id)?,
            question_id: parse_id(collection, &value.id, &value.question_id)?,
            points_awarded: to_u32(collection, &value.id, "points_awarded", value.points_awarded)?,
            time_to_answer_secs: value
                .time_to_answer_secs
                .map(|secs| to_u32(collection, &value.id, "time_to_answer_secs", secs))
                .transpose()?,
            answer: value.answer,
            is_correct: value.is_correct,
            answered_at: value.answered_at.to_system_time(),
        })
    }
}
