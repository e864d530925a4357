use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::{AuthError, AuthUser, Authenticator, Role};

/// Failures of the HTTP authentication client.
#[derive(Debug, Error)]
pub enum AuthClientError {
    #[error("missing authentication environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build authentication HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to send request to `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response status {status} from `{url}`")]
    RequestStatus { url: String, status: StatusCode },
    #[error("failed to decode response from `{url}`")]
    DecodeResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("authentication service rejected the lookup")]
    Unsuccessful,
}

impl From<AuthClientError> for AuthError {
    fn from(err: AuthClientError) -> Self {
        AuthError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MeEnvelope {
    success: bool,
    data: Option<MeUser>,
}

#[derive(Debug, Deserialize)]
struct MeUser {
    id: Uuid,
    name: String,
    role: Role,
}

/// Client for the authentication service's `GET /auth/me` endpoint.
#[derive(Clone)]
pub struct HttpAuthenticator {
    client: Client,
    base_url: Arc<str>,
}

impl HttpAuthenticator {
    pub fn new(base_url: &str) -> Result<Self, AuthClientError> {
        let client = Client::builder()
            .build()
            .map_err(|source| AuthClientError::ClientBuilder { source })?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    /// Build a client from `AUTH_SERVICE_URL`.
    pub fn from_env() -> Result<Self, AuthClientError> {
        let url = std::env::var("AUTH_SERVICE_URL").map_err(|_| AuthClientError::MissingEnvVar {
            var: "AUTH_SERVICE_URL",
        })?;
        Self::new(&url)
    }

    async fn me(&self, token: &str) -> Result<Option<AuthUser>, AuthClientError> {
        let url = format!("{}/auth/me", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| AuthClientError::RequestSend {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Ok(None);
            }
            status if !status.is_success() => {
                return Err(AuthClientError::RequestStatus { url, status });
            }
            _ => {}
        }

        let envelope: MeEnvelope = response
            .json()
            .await
            .map_err(|source| AuthClientError::DecodeResponse { url, source })?;

        if !envelope.success {
            return Err(AuthClientError::Unsuccessful);
        }

        Ok(envelope.data.map(|user| AuthUser {
            id: user.id,
            name: user.name,
            role: user.role,
        }))
    }
}

impl Authenticator for HttpAuthenticator {
    fn user(&self, token: String) -> BoxFuture<'static, Result<Option<AuthUser>, AuthError>> {
        let client = self.clone();
        Box::pin(async move { client.me(&token).await.map_err(Into::into) })
    }
}
