use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
}

impl HealthResponse {
    /// The storage backend answered its health check.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// The storage backend failed its health check.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}
