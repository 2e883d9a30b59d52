use precall_core::ContentType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound client frames.
///
/// Closed tagged dispatch: the `action` field selects the variant and any
/// unknown action fails deserialization, which the socket task answers
/// with a single error event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundFrame {
    /// Authorize this connection for a session.
    Connect {
        /// The session to bind to.
        session_id: Uuid,
        /// Short numeric access code (customer path).
        #[serde(default)]
        pin: Option<String>,
        /// Bearer identity token (operator path).
        #[serde(default)]
        token: Option<String>,
    },
    /// Release the connection binding.
    Disconnect,
    /// Run one conversational turn.
    SendMessage {
        /// The bound session.
        session_id: Uuid,
        /// The customer's utterance or structured submission payload.
        message: String,
        /// Client-supplied turn identifier.
        #[serde(default)]
        turn_id: Option<String>,
        /// Content classification of `message`.
        #[serde(default)]
        content_type: Option<ContentType>,
        /// Locale of the turn.
        #[serde(default)]
        locale: Option<String>,
    },
    /// Run one stateless planning turn (operator-facing, not persisted).
    SendPlanningMessage {
        /// The session the planning conversation is about.
        session_id: Uuid,
        /// The operator's message.
        message: String,
        /// Locale of the turn.
        #[serde(default)]
        locale: Option<String>,
    },
}

/// Outbound relayed events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelayEvent {
    /// Connect accepted.
    Connected {
        /// The bound session.
        session_id: Uuid,
        /// The transport-assigned connection id.
        connection_id: Uuid,
    },
    /// An incremental chunk of agent text.
    Chunk {
        /// The chunk content.
        content: String,
    },
    /// The agent invoked a tool (informational).
    Tool {
        /// Name of the invoked tool.
        tool_name: String,
        /// Invocation status.
        status: String,
        /// Provider-specific detail payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    /// A caller-facing failure. Emitted exactly once per failed operation.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// Terminal event of a turn.
    Done {
        /// Classification of the persisted outbound message.
        content_type: ContentType,
        /// Whether this turn completed the session.
        is_complete: bool,
        /// The turn identifier.
        turn_id: String,
    },
}

impl RelayEvent {
    /// Serializes the event to its wire form.
    pub fn to_json(&self) -> String {
        // RelayEvent contains nothing that can fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string())
    }
}
