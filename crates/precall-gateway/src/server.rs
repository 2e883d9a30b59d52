use crate::connection::{ConnectionManager, LiveConnection};
use crate::frames::{InboundFrame, RelayEvent};
use crate::lifecycle::{ConnectDecision, ConnectionLifecycle, Credential, IdentityVerifier};
use crate::relay::{LiveSink, TurnController, TurnRequest};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Duration;
use futures_util::{SinkExt, StreamExt};
use precall_agent::{AgentClient, AgentDirectory};
use precall_session::{ConnectionStore, SessionStore, TranscriptStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything the gateway needs, constructed once at process start and
/// injected here.
pub struct GatewayDeps {
    /// Session metadata store.
    pub sessions: Arc<dyn SessionStore>,
    /// Transcript store.
    pub transcripts: Arc<dyn TranscriptStore>,
    /// Durable connection binding store.
    pub connections: Arc<dyn ConnectionStore>,
    /// Client for the hosted conversational agent.
    pub agent: Arc<AgentClient>,
    /// Agent role resolution.
    pub directory: Arc<dyn AgentDirectory>,
    /// Bearer token validation for the operator connect path.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Retention TTL for persisted messages.
    pub message_ttl: Duration,
    /// Agent role used for planning turns.
    pub planning_role: String,
}

/// Shared application state.
struct AppState {
    controller: TurnController,
    lifecycle: ConnectionLifecycle,
    live: Arc<ConnectionManager>,
}

/// The gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Builds the axum router for the gateway.
    pub fn build(deps: GatewayDeps) -> Router {
        let live = ConnectionManager::new();
        let controller = TurnController::new(
            deps.sessions.clone(),
            deps.transcripts,
            deps.connections.clone(),
            deps.agent,
            deps.directory,
            deps.message_ttl,
            deps.planning_role,
        );
        let lifecycle = ConnectionLifecycle::new(deps.sessions, deps.connections, deps.verifier);

        let state = Arc::new(AppState {
            controller,
            lifecycle,
            live,
        });

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    serde_json::json!({
        "status": "ok",
        "service": "precall",
        "connections": state.live.connection_count().await,
    })
    .to_string()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel feeding the WebSocket writer task; the relay's only handle
    // on this connection.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    info!(connection_id = %connection_id, "WebSocket connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // The session this connection has been authorized for. Frames are
    // handled to completion one at a time, so turns on one connection
    // never overlap.
    let mut bound_session: Option<Uuid> = None;

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame: InboundFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(_) => {
                let event = state.lifecycle.on_unroutable(connection_id, &text);
                let _ = tx.send(event.to_json());
                continue;
            }
        };

        match frame {
            InboundFrame::Connect {
                session_id,
                pin,
                token,
            } => {
                let credential = match (pin, token) {
                    (Some(pin), _) => Credential::Pin(pin),
                    (None, Some(token)) => Credential::Token(token),
                    (None, None) => {
                        let _ = tx.send(
                            RelayEvent::Error {
                                message: "Connect rejected: a PIN or token is required".into(),
                            }
                            .to_json(),
                        );
                        break;
                    }
                };

                match state
                    .lifecycle
                    .on_connect(connection_id, session_id, credential)
                    .await
                {
                    ConnectDecision::Accepted(record) => {
                        state
                            .live
                            .register(LiveConnection {
                                id: connection_id,
                                session_id: record.session_id,
                                tx: tx.clone(),
                            })
                            .await;
                        bound_session = Some(record.session_id);
                        let _ = tx.send(
                            RelayEvent::Connected {
                                session_id: record.session_id,
                                connection_id,
                            }
                            .to_json(),
                        );
                    }
                    ConnectDecision::Rejected { reason } => {
                        warn!(
                            connection_id = %connection_id,
                            session_id = %session_id,
                            reason = %reason,
                            "Connection rejected"
                        );
                        let _ = tx.send(
                            RelayEvent::Error {
                                message: format!("Connect rejected: {reason}"),
                            }
                            .to_json(),
                        );
                        // Unrecoverable authorization failure is the one
                        // case where the server closes the socket.
                        break;
                    }
                }
            }

            InboundFrame::Disconnect => {
                state.lifecycle.on_disconnect(connection_id).await;
                state.live.deregister(connection_id).await;
                bound_session = None;
                break;
            }

            InboundFrame::SendMessage {
                session_id,
                message,
                turn_id,
                content_type,
                locale,
            } => {
                if bound_session != Some(session_id) {
                    let _ = tx.send(
                        RelayEvent::Error {
                            message: "Not connected to this session".into(),
                        }
                        .to_json(),
                    );
                    continue;
                }
                // The registry holds the relay handle for every authorized
                // connection; a miss here means the binding is gone.
                let Some(sender) = state.live.sender(connection_id).await else {
                    let _ = tx.send(
                        RelayEvent::Error {
                            message: "Not connected to this session".into(),
                        }
                        .to_json(),
                    );
                    continue;
                };
                let mut sink = LiveSink::new(sender);
                state
                    .controller
                    .handle_turn(
                        connection_id,
                        TurnRequest {
                            session_id,
                            message,
                            turn_id,
                            content_type,
                            locale,
                        },
                        &mut sink,
                    )
                    .await;
            }

            InboundFrame::SendPlanningMessage {
                session_id,
                message,
                locale: _,
            } => {
                if bound_session != Some(session_id) {
                    let _ = tx.send(
                        RelayEvent::Error {
                            message: "Not connected to this session".into(),
                        }
                        .to_json(),
                    );
                    continue;
                }
                let Some(sender) = state.live.sender(connection_id).await else {
                    let _ = tx.send(
                        RelayEvent::Error {
                            message: "Not connected to this session".into(),
                        }
                        .to_json(),
                    );
                    continue;
                };
                let mut sink = LiveSink::new(sender);
                state
                    .controller
                    .handle_planning(session_id, &message, &mut sink)
                    .await;
            }
        }
    }

    // Flush queued frames before the socket goes away, then clean up.
    drop(tx);
    let _ = send_task.await;

    state.lifecycle.on_disconnect(connection_id).await;
    state.live.deregister(connection_id).await;
    info!(connection_id = %connection_id, "WebSocket disconnected");
}
