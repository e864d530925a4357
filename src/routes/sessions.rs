use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        leaderboard::LeaderboardEntry,
        session::{
            CreateSessionRequest, JoinSessionRequest, JoinSessionResponse, SessionView,
            SubmitAnswerRequest, SubmitAnswerResponse,
        },
    },
    error::AppError,
    routes::auth::CurrentUser,
    services::session_service,
    state::SharedState,
};

/// Session management, participation and answer submission routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/answer", post(submit_answer))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/next", post(next_question))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/cancel", post(cancel_session))
        .route("/sessions/{id}/leaderboard", get(leaderboard))
}

/// Open a new session for one of the caller's quizzes.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Session created", body = SessionView),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not the quiz's teacher"),
        (status = 404, description = "Unknown quiz")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    payload.validate()?;
    let session = session_service::create_session(&state, &user, payload.quiz_id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Join a session with its code; joining twice returns the existing participation.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinSessionRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Participation created", body = JoinSessionResponse),
        (status = 200, description = "Already joined", body = JoinSessionResponse),
        (status = 400, description = "Malformed code or finished session"),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<(StatusCode, Json<JoinSessionResponse>), AppError> {
    payload.validate()?;
    let (response, created) = session_service::join_session(&state, &user, &payload.code).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// Submit an answer to the current question.
#[utoipa::path(
    post,
    path = "/sessions/answer",
    tag = "sessions",
    request_body = SubmitAnswerRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 400, description = "Session not active or question not current"),
        (status = 403, description = "Caller has not joined the session"),
        (status = 409, description = "Question already answered")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<(StatusCode, Json<SubmitAnswerResponse>), AppError> {
    payload.validate()?;
    let response = session_service::submit_answer(&state, &user, payload, None).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fetch a session snapshot; correct answers are hidden from participants until it finishes.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session snapshot", body = SessionView),
        (status = 403, description = "Caller neither owns nor joined the session"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::get_session(&state, &user, id).await?))
}

/// Delete a session that is not running.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 400, description = "Session is active"),
        (status = 403, description = "Caller does not own the session")
    )
)]
pub async fn delete_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::delete_session(&state, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start the session and serve its first question.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session started", body = SessionView),
        (status = 400, description = "Session is not waiting or has no participant")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::start_session(&state, &user, id).await?))
}

/// Close the current question and serve the next one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/next",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Advanced; finished after the last question", body = SessionView),
        (status = 400, description = "Session is not active")
    )
)]
pub async fn next_question(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::next_question(&state, &user, id).await?))
}

/// End the session and publish the final leaderboard.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session ended", body = SessionView),
        (status = 400, description = "Session already finished")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::end_session(&state, &user, id).await?))
}

/// Cancel the session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/cancel",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session cancelled", body = SessionView),
        (status = 400, description = "Session already finished")
    )
)]
pub async fn cancel_session(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::cancel_session(&state, &user, id).await?))
}

/// Current standings of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Ranked participants", body = [LeaderboardEntry]),
        (status = 403, description = "Caller neither owns nor joined the session"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    Ok(Json(session_service::leaderboard(&state, &user, id).await?))
}
