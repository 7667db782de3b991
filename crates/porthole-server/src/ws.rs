use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use porthole_index::queries;
use porthole_types::{
    ApprovalDecision, ClientMessage, KillReason, PendingDecision, PendingResponse, ServerMessage,
};
use tracing::{debug, info, warn};

use crate::state::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();

    // Direct replies (snapshot, protocol errors) go to this connection only;
    // deltas come through the shared broadcast channel. One writer task owns
    // the sink so a slow client never blocks anyone else.
    let (direct_tx, mut direct_rx) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();

    let snapshot = ServerMessage::ActiveProcesses {
        processes: state.manager.snapshot().await,
    };
    let _ = direct_tx.send(snapshot);

    info!("websocket client connected");

    let mut deltas = state.broadcaster.subscribe();
    let outbound = tokio::spawn(async move {
        let mut sender = sender;
        loop {
            let message = tokio::select! {
                biased;
                direct = direct_rx.recv() => match direct {
                    Some(message) => message,
                    None => break,
                },
                delta = deltas.recv() => match delta {
                    Ok(message) => message,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client lagging; dropping connection");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            };
            if send_message(&mut sender, &message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            Message::Text(text) => {
                if let Some(reply) = route_inbound(&state, text.as_str()).await {
                    debug!(?reply, "inbound message rejected");
                    if direct_tx.send(reply).is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    outbound.abort();
    info!("websocket client disconnected");
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message)
        .map_err(|e| axum::Error::new(std::io::Error::other(e)))?;
    sender.send(Message::Text(json.into())).await
}

/// Dispatch one inbound control message. Returns an error delta for this
/// connection when the message is malformed or refers to nothing; the
/// connection itself stays open.
async fn route_inbound(state: &Arc<AppState>, raw: &str) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            return Some(ServerMessage::Error {
                message: format!("invalid message: {e}"),
            });
        }
    };

    match message {
        ClientMessage::SendMessage {
            session_id,
            project_id,
            text,
            images,
            documents,
        } => {
            let cwd = match project_working_dir(state, &project_id) {
                Some(cwd) => cwd,
                None => {
                    return Some(ServerMessage::Error {
                        message: format!("unknown working directory for project {project_id}"),
                    });
                }
            };

            match state
                .manager
                .send(&session_id, &project_id, cwd, &text, &images, &documents)
                .await
            {
                Ok(()) => None,
                Err(e) => Some(ServerMessage::Error {
                    message: format!("send failed: {e}"),
                }),
            }
        }
        ClientMessage::KillProcess { session_id } => {
            if state.manager.kill(&session_id, KillReason::Manual).await {
                None
            } else {
                Some(ServerMessage::Error {
                    message: format!("no process for session {session_id}"),
                })
            }
        }
        ClientMessage::PendingRequestResponse {
            session_id,
            request_id,
            response,
        } => {
            let decision = decision_from_response(response);
            if state
                .manager
                .resolve_pending(&session_id, &request_id, decision)
                .await
            {
                None
            } else {
                Some(ServerMessage::Error {
                    message: format!("no pending request {request_id} for session {session_id}"),
                })
            }
        }
    }
}

fn decision_from_response(response: PendingResponse) -> PendingDecision {
    match response {
        PendingResponse::ToolApproval {
            decision: ApprovalDecision::Allow,
            updated_input,
            ..
        } => PendingDecision::Allow { updated_input },
        PendingResponse::ToolApproval { message, .. } => PendingDecision::Deny {
            message: message.unwrap_or_else(|| "Denied by user".to_string()),
        },
        PendingResponse::AskUserQuestion { answers } => PendingDecision::Allow {
            updated_input: Some(serde_json::json!({ "answers": answers })),
        },
    }
}

fn project_working_dir(state: &Arc<AppState>, project_id: &str) -> Option<PathBuf> {
    let db = state.db.lock().unwrap();
    let project = queries::project::get(db.conn(), project_id).ok()??;
    project.path.map(PathBuf::from)
}
