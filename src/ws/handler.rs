//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::ArenaHandle;
use crate::session::AdmissionRejected;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, Envelope, ParticipantId, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Requested display name; a default is assigned when absent
    #[serde(default)]
    pub name: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, display_name: String, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    let Some(arena) = state.arenas.current() else {
        reject(&mut ws_sink, AdmissionRejected::MatchEnded).await;
        return;
    };

    let admitted = match arena.connect(display_name).await {
        Ok(admitted) => admitted,
        Err(rejection) => {
            info!(arena_id = %arena.id, reason = %rejection, "Connection refused");
            reject(&mut ws_sink, rejection).await;
            return;
        }
    };

    let participant_id = admitted.participant_id;
    info!(participant_id = %participant_id, arena_id = %arena.id, "Participant connected");

    run_session(participant_id, &arena, ws_sink, ws_stream, admitted.outbound).await;

    arena.disconnect(participant_id).await;
    info!(participant_id = %participant_id, "WebSocket connection closed");
}

/// Tell the client why it was refused, then close
async fn reject(sink: &mut SplitSink<WebSocket, Message>, rejection: AdmissionRejected) {
    let msg = ServerMsg::Rejected {
        reason: rejection.reason(),
    };
    if let Err(e) = send_msg(sink, &msg).await {
        debug!(error = %e, "Failed to send rejection");
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Run the WebSocket session with read/write split
async fn run_session(
    participant_id: ParticipantId,
    arena: &ArenaHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound: broadcast::Receiver<Envelope>,
) {
    let rate_limiter = ConnectionRateLimiter::default();

    // Writer task: arena broadcasts -> WebSocket, filtered by audience
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(envelope) => {
                    if !envelope.audience.includes(participant_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &envelope.msg).await {
                        debug!(participant_id = %participant_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed diffs are not replayed; identity repair covers names and colors.
                    warn!(participant_id = %participant_id, lagged_count = n, "Client lagged, skipped messages");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(participant_id = %participant_id, "Arena channel closed");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> arena
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(participant_id = %participant_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if !arena.request(participant_id, msg).await {
                            debug!(participant_id = %participant_id, "Arena gone");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(participant_id = %participant_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(participant_id = %participant_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(participant_id = %participant_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant_id = %participant_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
