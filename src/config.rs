//! Application-level configuration loading: session timing, development users and seed quizzes.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{AuthUser, Role},
    dao::models::{QuestionEntity, QuestionKind, QuizEntity},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_BACK_CONFIG_PATH";
const DEFAULT_TIME_LIMIT_SECS: u32 = 30;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    default_time_limit_secs: u32,
    command_timeout: Duration,
    require_participants_to_start: bool,
    dev_users: Vec<(String, AuthUser)>,
    quizzes: Vec<QuizEntity>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        dev_users = app_config.dev_users.len(),
                        quizzes = app_config.quizzes.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Time limit advertised for questions that do not carry their own.
    pub fn default_time_limit_secs(&self) -> u32 {
        self.default_time_limit_secs
    }

    /// Upper bound on the wait for a session's command lock.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn require_participants_to_start(&self) -> bool {
        self.require_participants_to_start
    }

    /// Static bearer tokens accepted when no authentication service is configured.
    pub fn dev_users(&self) -> &[(String, AuthUser)] {
        &self.dev_users
    }

    /// Quizzes seeded into the in-memory catalog.
    pub fn quizzes(&self) -> &[QuizEntity] {
        &self.quizzes
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_require_participants_to_start(mut self, required: bool) -> Self {
        self.require_participants_to_start = required;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            require_participants_to_start: true,
            dev_users: Vec::new(),
            quizzes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default = "default_time_limit")]
    default_time_limit_secs: u32,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
    #[serde(default = "default_require_participants")]
    require_participants_to_start: bool,
    #[serde(default)]
    dev_users: Vec<RawDevUser>,
    #[serde(default)]
    quizzes: Vec<RawQuiz>,
}

fn default_time_limit() -> u32 {
    DEFAULT_TIME_LIMIT_SECS
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

fn default_require_participants() -> bool {
    true
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            default_time_limit_secs: value.default_time_limit_secs,
            command_timeout: Duration::from_millis(value.command_timeout_ms),
            require_participants_to_start: value.require_participants_to_start,
            dev_users: value
                .dev_users
                .into_iter()
                .map(RawDevUser::into_entry)
                .collect(),
            quizzes: value.quizzes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// Development user bound to a fixed bearer token.
struct RawDevUser {
    token: String,
    id: Uuid,
    name: String,
    role: Role,
}

impl RawDevUser {
    fn into_entry(self) -> (String, AuthUser) {
        (
            self.token,
            AuthUser {
                id: self.id,
                name: self.name,
                role: self.role,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawQuiz {
    id: Uuid,
    title: String,
    creator_id: Uuid,
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    text: String,
    #[serde(rename = "type")]
    kind: QuestionKind,
    #[serde(default)]
    options: Option<Vec<String>>,
    correct_answer: String,
    points: u32,
    order: u32,
    #[serde(default)]
    time_limit_secs: Option<u32>,
}

impl From<RawQuiz> for QuizEntity {
    fn from(value: RawQuiz) -> Self {
        let mut questions = value
            .questions
            .into_iter()
            .map(|question| QuestionEntity {
                id: question.id,
                text: question.text,
                kind: question.kind,
                options: question.options,
                correct_answer: question.correct_answer,
                points: question.points,
                order: question.order,
                time_limit_secs: question.time_limit_secs,
            })
            .collect::<Vec<_>>();
        questions.sort_by_key(|question| question.order);

        Self {
            id: value.id,
            title: value.title,
            creator_id: value.creator_id,
            questions,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
