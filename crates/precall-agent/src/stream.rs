use serde::{Deserialize, Serialize};

/// Events emitted while the hosted agent streams its response.
///
/// These are transient, in-memory values: consumers (the turn controller)
/// relay them to the live connection and concatenate text chunks into the
/// outbound message content. They are never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// An incremental chunk of agent text.
    TextChunk {
        /// The chunk content.
        text: String,
    },

    /// The agent invoked a tool; informational, relayed as-is.
    ToolInvocation {
        /// Name of the invoked tool.
        tool_name: String,
        /// Invocation status, e.g. `"started"` or `"finished"`.
        status: String,
        /// Provider-specific detail payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },

    /// A consolidated final payload. Its text supersedes the
    /// chunk-accumulated buffer.
    FinalResult {
        /// The full final text.
        text: String,
    },

    /// The stream failed; the turn is aborted.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}
