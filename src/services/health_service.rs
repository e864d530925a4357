use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` when the storage backend answers, `degraded` otherwise.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        auth::StaticAuthenticator,
        config::AppConfig,
        dao::{quiz_catalog::MemoryQuizCatalog, session_store::MemorySessionStore},
        state::AppState,
    };

    #[tokio::test]
    async fn memory_store_is_healthy() {
        let state = AppState::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryQuizCatalog::new()),
            Arc::new(StaticAuthenticator::default()),
            AppConfig::default(),
        );
        assert_eq!(health_status(&state).await.status, "ok");
    }
}
