//! Identity resolution against the external authentication service.

#[cfg(feature = "http-auth")]
pub mod http;
pub mod static_tokens;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[cfg(feature = "http-auth")]
pub use http::HttpAuthenticator;
pub use static_tokens::StaticAuthenticator;

/// Role granted to a user by the authentication service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Teacher,
    Student,
}

/// Authenticated caller as reported by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    /// Whether the user may create and drive sessions.
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }
}

/// Failure to reach or understand the authentication service.
#[derive(Debug, Error)]
#[error("authentication service unavailable: {message}")]
pub struct AuthError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

/// Resolves bearer tokens into users.
pub trait Authenticator: Send + Sync {
    /// Resolve a token, returning `None` when the service does not recognise it.
    fn user(&self, token: String) -> BoxFuture<'static, Result<Option<AuthUser>, AuthError>>;
}
