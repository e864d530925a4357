use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppError,
    routes::auth::bearer_token,
    services::{identity, websocket_service},
    state::SharedState,
};

/// Query parameters accepted by the realtime endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct WsParams {
    /// Bearer token, for clients that cannot set headers on the upgrade request.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "realtime",
    params(WsParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing or invalid token")
    )
)]
/// Authenticate the caller, then upgrade the connection into a realtime session channel.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let token = params.token.as_deref().or_else(|| bearer_token(&headers));
    let user = identity::authenticate(&state, token).await?;

    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(shared_state, user, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
