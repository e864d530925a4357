use tracing::debug;

use crate::{auth::AuthUser, error::ServiceError, state::SharedState};

/// Resolve a bearer token into the calling user.
pub async fn authenticate(state: &SharedState, token: Option<&str>) -> Result<AuthUser, ServiceError> {
    let token = token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServiceError::Unauthenticated("missing bearer token".into()))?;

    match state.auth().user(token.to_owned()).await? {
        Some(user) => Ok(user),
        None => {
            debug!("rejected unknown bearer token");
            Err(ServiceError::Unauthenticated("invalid or expired token".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        auth::{Role, StaticAuthenticator},
        config::AppConfig,
        dao::{quiz_catalog::MemoryQuizCatalog, session_store::MemorySessionStore},
        state::AppState,
    };

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let ada = AuthUser {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            role: Role::Student,
        };
        let state = AppState::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryQuizCatalog::new()),
            Arc::new(StaticAuthenticator::new([("ada-token".to_string(), ada.clone())])),
            AppConfig::default(),
        );

        assert_eq!(authenticate(&state, Some(" ada-token ")).await.unwrap(), ada);
        assert!(matches!(
            authenticate(&state, Some("nope")).await,
            Err(ServiceError::Unauthenticated(_))
        ));
        assert!(matches!(
            authenticate(&state, None).await,
            Err(ServiceError::Unauthenticated(_))
        ));
        assert!(matches!(
            authenticate(&state, Some("  ")).await,
            Err(ServiceError::Unauthenticated(_))
        ));
    }
}
