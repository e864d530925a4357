use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    auth::AuthUser,
    dto::{
        session::SubmitAnswerRequest,
        ws::{ClientMessage, ServerMessage},
    },
    error::ServiceError,
    services::session_service,
    state::{ConnectionHandle, SharedState},
};

/// Handle the full lifecycle of an authenticated realtime connection.
///
/// Commands run through the same session operations as the HTTP routes; failures are reported
/// to the sender as `error` events and never close the connection.
pub async fn handle_socket(state: SharedState, user: AuthUser, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut outbound = UnboundedReceiverStream::new(outbound_rx);

    // Dedicated writer task keeps broadcasts flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound.next().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to serialize realtime event `{message:?}`");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let connection = ConnectionHandle::new(user.id, outbound_tx.clone());
    info!(connection_id = %connection.id, user_id = %user.id, "realtime client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(connection_id = %connection.id, payload = %text, "received realtime command");
                let reply = match ClientMessage::from_json_str(&text) {
                    Ok(command) => dispatch(&state, &user, &connection, command).await.err(),
                    Err(err) => Some(ServiceError::Validation(format!(
                        "unreadable command: {err}"
                    ))),
                };
                if let Some(err) = reply {
                    debug!(connection_id = %connection.id, error = %err, "realtime command rejected");
                    if !state
                        .gateway()
                        .send_to(&connection, ServerMessage::error(err.to_string()))
                    {
                        break;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                state.gateway().send_to(
                    &connection,
                    ServerMessage::error("binary frames are not supported"),
                );
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection.id, "realtime client closed");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection.id, error = %err, "websocket error");
                break;
            }
        }
    }

    session_service::disconnect(&state, &connection);
    info!(connection_id = %connection.id, user_id = %user.id, "realtime client disconnected");

    drop(connection);
    finalize(writer_task, outbound_tx).await;
}

/// Route one inbound command to the matching session operation.
async fn dispatch(
    state: &SharedState,
    user: &AuthUser,
    connection: &ConnectionHandle,
    command: ClientMessage,
) -> Result<(), ServiceError> {
    match command {
        ClientMessage::JoinSession { session_id } => {
            let session = session_service::subscribe(state, user, session_id, connection).await?;
            state
                .gateway()
                .send_to(connection, ServerMessage::SessionState { session });
        }
        ClientMessage::LeaveSession { session_id } => {
            session_service::unsubscribe(state, session_id, connection);
        }
        ClientMessage::StartSession { session_id } => {
            session_service::start_session(state, user, session_id).await?;
        }
        ClientMessage::NextQuestion { session_id } => {
            session_service::next_question(state, user, session_id).await?;
        }
        ClientMessage::SubmitAnswer {
            session_id,
            question_id,
            answer,
            time_to_answer,
        } => {
            let request = SubmitAnswerRequest {
                session_id,
                question_id,
                answer,
                time_to_answer,
            };
            request
                .validate()
                .map_err(|err| ServiceError::Validation(err.to_string()))?;
            session_service::submit_answer(state, user, request, Some(connection)).await?;
        }
        ClientMessage::EndSession { session_id } => {
            session_service::end_session(state, user, session_id).await?;
        }
        ClientMessage::CancelSession { session_id } => {
            session_service::cancel_session(state, user, session_id).await?;
        }
    }
    Ok(())
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<ServerMessage>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
