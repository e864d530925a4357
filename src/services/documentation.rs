use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Live Quiz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::submit_answer,
        crate::routes::sessions::get_session,
        crate::routes::sessions::delete_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::next_question,
        crate::routes::sessions::end_session,
        crate::routes::sessions::cancel_session,
        crate::routes::sessions::leaderboard,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::SubmitAnswerRequest,
            crate::dto::session::SessionView,
            crate::dto::session::JoinSessionResponse,
            crate::dto::session::SubmitAnswerResponse,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::dao::models::SessionStatus,
            crate::dao::models::QuestionKind,
            crate::dao::models::FinishReason,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle, participation and answers"),
        (name = "realtime", description = "WebSocket channel for session events"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
