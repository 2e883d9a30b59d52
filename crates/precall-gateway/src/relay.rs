use crate::frames::RelayEvent;
use chrono::{Duration, Utc};
use precall_agent::signal;
use precall_agent::{AgentClient, AgentDirectory, StreamEvent};
use precall_core::{ContentType, NewMessage, Sender};
use precall_session::{ConnectionStore, SessionStore, TranscriptStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Stage label persisted on customer conversation turns.
const STAGE_PRE_CONSULTATION: &str = "pre_consultation";

/// The sink receiving this turn's relay events went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Where a turn's relay events go.
///
/// The single axis of variation between the live streaming path and a
/// buffered single-response path. `push` reports closure synchronously,
/// which is the relay's only cancellation signal: a closed sink stops
/// further relaying but never stops the turn itself.
pub trait TurnSink: Send {
    /// Delivers one event. `Err(SinkClosed)` means the consumer is gone.
    fn push(&mut self, event: &RelayEvent) -> Result<(), SinkClosed>;
}

/// Sink feeding a live connection's WebSocket writer task.
pub struct LiveSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LiveSink {
    /// Wraps the connection's writer channel.
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl TurnSink for LiveSink {
    fn push(&mut self, event: &RelayEvent) -> Result<(), SinkClosed> {
        self.tx.send(event.to_json()).map_err(|_| SinkClosed)
    }
}

/// Sink that buffers every event; never closes.
#[derive(Debug, Default)]
pub struct BufferedSink {
    /// Events in push order.
    pub events: Vec<RelayEvent>,
}

impl BufferedSink {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TurnSink for BufferedSink {
    fn push(&mut self, event: &RelayEvent) -> Result<(), SinkClosed> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// One conversational turn as requested by the client.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// The bound session.
    pub session_id: Uuid,
    /// The customer's utterance or structured submission payload.
    pub message: String,
    /// Client-supplied turn identifier; generated when absent.
    pub turn_id: Option<String>,
    /// Content classification of `message`.
    pub content_type: Option<ContentType>,
    /// Locale of the turn; the session locale is the fallback.
    pub locale: Option<String>,
}

/// Orchestrates conversational turns: persist inbound, invoke the agent,
/// relay the stream, detect control signals, persist outbound, apply the
/// completion transition.
pub struct TurnController {
    sessions: Arc<dyn SessionStore>,
    transcripts: Arc<dyn TranscriptStore>,
    connections: Arc<dyn ConnectionStore>,
    agent: Arc<AgentClient>,
    directory: Arc<dyn AgentDirectory>,
    message_ttl: Duration,
    planning_role: String,
}

impl TurnController {
    /// Creates the controller over its collaborators.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        transcripts: Arc<dyn TranscriptStore>,
        connections: Arc<dyn ConnectionStore>,
        agent: Arc<AgentClient>,
        directory: Arc<dyn AgentDirectory>,
        message_ttl: Duration,
        planning_role: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            transcripts,
            connections,
            agent,
            directory,
            message_ttl,
            planning_role: planning_role.into(),
        }
    }

    /// Runs one conversational turn for a live connection.
    ///
    /// Every caller-facing failure produces exactly one error event on the
    /// sink. A closed sink mid-stream stops relaying but the stream keeps
    /// draining so the outbound message is still persisted.
    pub async fn handle_turn(
        &self,
        connection_id: Uuid,
        request: TurnRequest,
        sink: &mut dyn TurnSink,
    ) {
        let session_id = request.session_id;

        // Fail fast before any persistence.
        let session = match self.sessions.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                emit_error(sink, "Session not found");
                return;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Session lookup failed");
                emit_error(sink, "Session lookup failed");
                return;
            }
        };
        if !session.is_active() {
            emit_error(sink, "Session is not active");
            return;
        }

        let turn_id = request
            .turn_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let content_type = request.content_type.unwrap_or_default();
        let locale = request.locale.as_deref().unwrap_or(&session.locale);
        info!(
            session_id = %session_id,
            turn_id = %turn_id,
            locale = %locale,
            "Handling turn"
        );

        // Persist the inbound message before the agent call so the
        // customer's utterance survives an agent failure. For structured
        // submissions the original payload is persisted, not the
        // agent-facing rendering.
        let inbound = NewMessage {
            session_id,
            turn_id: turn_id.clone(),
            sender: Sender::Customer,
            content: request.message.clone(),
            content_type,
            stage: STAGE_PRE_CONSULTATION.into(),
            expires_at: Utc::now() + self.message_ttl,
        };
        if let Err(e) = self.transcripts.append(inbound).await {
            error!(session_id = %session_id, error = %e, "Failed to persist inbound message");
            emit_error(sink, "Failed to record your message, please retry");
            return;
        }

        let prompt = if content_type == ContentType::StructuredSubmission {
            render_submission(&request.message)
        } else {
            request.message.clone()
        };

        let Some(final_text) = self
            .run_stream(
                &session.agent_role,
                session.overrides.as_ref(),
                session_id,
                &prompt,
                Some(connection_id),
                sink,
            )
            .await
        else {
            // Error already relayed; the persisted inbound stands as an
            // unanswered customer turn.
            return;
        };

        let signals = signal::detect(&final_text);

        let outbound = NewMessage {
            session_id,
            turn_id: turn_id.clone(),
            sender: Sender::Agent,
            content: signals.text,
            content_type: signals.content_type,
            stage: STAGE_PRE_CONSULTATION.into(),
            expires_at: Utc::now() + self.message_ttl,
        };
        if let Err(e) = self.transcripts.append(outbound).await {
            error!(session_id = %session_id, error = %e, "Failed to persist outbound message");
            emit_error(sink, "Failed to record the agent response");
            return;
        }

        // Best-effort completion transition on freshly loaded state: the
        // session may have been completed or inactivated elsewhere during
        // the agent call, and `complete()` refuses the transition from
        // either. A failure here is logged and never retried; the
        // transcript is authoritative and the session can be corrected
        // out-of-band.
        if signals.is_complete {
            match self.sessions.get(session_id).await {
                Ok(Some(mut current)) => {
                    if current.complete() {
                        if let Err(e) = self.sessions.update(&current).await {
                            warn!(
                                session_id = %session_id,
                                error = %e,
                                "Completion transition failed; transcript stands"
                            );
                        } else {
                            info!(session_id = %session_id, "Session completed");
                        }
                    }
                }
                Ok(None) => {
                    warn!(session_id = %session_id, "Session vanished before completion transition");
                }
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        error = %e,
                        "Session reload failed; transcript stands"
                    );
                }
            }
        }

        let _ = sink.push(&RelayEvent::Done {
            content_type: signals.content_type,
            is_complete: signals.is_complete,
            turn_id,
        });
    }

    /// Runs one stateless planning turn: same streaming relay against the
    /// planning agent, no transcript persistence, no completion handling.
    pub async fn handle_planning(
        &self,
        session_id: Uuid,
        message: &str,
        sink: &mut dyn TurnSink,
    ) {
        info!(session_id = %session_id, "Handling planning turn");
        let overrides = match self.sessions.get(session_id).await {
            Ok(Some(session)) => session.overrides,
            _ => None,
        };

        let role = self.planning_role.clone();
        if self
            .run_stream(&role, overrides.as_ref(), session_id, message, None, sink)
            .await
            .is_some()
        {
            let _ = sink.push(&RelayEvent::Done {
                content_type: ContentType::PlainText,
                is_complete: false,
                turn_id: Uuid::new_v4().to_string(),
            });
        }
    }

    /// Invokes the agent and drains its stream into the sink.
    ///
    /// Returns the final assembled text, or `None` if the turn must abort
    /// (the error event has then already been relayed). When the sink
    /// closes mid-stream the connection binding is cleaned up and the
    /// stream keeps draining.
    async fn run_stream(
        &self,
        role: &str,
        overrides: Option<&precall_core::AgentOverrides>,
        session_id: Uuid,
        prompt: &str,
        connection_id: Option<Uuid>,
        sink: &mut dyn TurnSink,
    ) -> Option<String> {
        let endpoint = match self.directory.resolve(role) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!(role = %role, error = %e, "Agent role resolution failed");
                emit_error(sink, "Agent is not available");
                return None;
            }
        };

        let (mut rx, handle) = match self
            .agent
            .invoke(&endpoint, session_id, prompt, overrides)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Agent invocation failed");
                emit_error(sink, "Agent is not available");
                return None;
            }
        };

        let mut relaying = true;
        while let Some(event) = rx.recv().await {
            let relayed = match event {
                StreamEvent::TextChunk { text } => Some(RelayEvent::Chunk { content: text }),
                StreamEvent::ToolInvocation {
                    tool_name,
                    status,
                    payload,
                } => Some(RelayEvent::Tool {
                    tool_name,
                    status,
                    payload,
                }),
                StreamEvent::FinalResult { .. } => {
                    // Aggregated by the backend's join handle.
                    None
                }
                StreamEvent::Error { message } => {
                    warn!(session_id = %session_id, error = %message, "Agent stream error");
                    emit_error(sink, &message);
                    drop(rx);
                    handle.abort();
                    return None;
                }
            };

            if let Some(event) = relayed {
                if relaying && sink.push(&event).is_err() {
                    // Client gone mid-stream: stop relaying, clean up the
                    // binding, keep draining so persistence still happens.
                    relaying = false;
                    if let Some(cid) = connection_id {
                        warn!(
                            connection_id = %cid,
                            session_id = %session_id,
                            "Connection lost mid-stream, draining without relay"
                        );
                        if let Err(e) = self.connections.delete(cid).await {
                            warn!(
                                connection_id = %cid,
                                error = %e,
                                "Failed to clean up connection record"
                            );
                        }
                    }
                }
            }
        }

        match handle.await {
            Ok(Ok(reply)) => Some(reply.text),
            Ok(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Agent stream failed");
                emit_error(sink, "Agent stream failed");
                None
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Agent stream task panicked");
                emit_error(sink, "Agent stream failed");
                None
            }
        }
    }
}

/// Pushes exactly one caller-facing error event; closure is ignored.
fn emit_error(sink: &mut dyn TurnSink, message: &str) {
    let _ = sink.push(&RelayEvent::Error {
        message: message.to_string(),
    });
}

/// Renders a structured submission payload into a human-readable text
/// block for the agent. The original payload is what gets persisted.
pub fn render_submission(payload: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return payload.to_string();
    };
    let Some(object) = value.as_object() else {
        return payload.to_string();
    };

    let mut lines = vec!["The customer submitted the following form:".to_string()];
    for (field, answer) in object {
        let rendered = match answer {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("- {field}: {rendered}"));
    }
    lines.join("\n")
}
