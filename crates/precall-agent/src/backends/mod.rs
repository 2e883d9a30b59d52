/// HTTP line-delimited streaming backend.
pub mod http;

pub use http::HttpAgentBackend;

use crate::directory::AgentEndpoint;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use precall_core::PrecallResult;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The aggregated outcome of one agent invocation.
///
/// `text` is the final assembled text: a consolidated final payload from
/// the agent when one was emitted, otherwise the concatenated chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// The final assembled text of the response.
    pub text: String,
}

/// A streaming call to the hosted conversational agent.
///
/// Each invocation is restartable per call but not resumable mid-call.
/// The returned receiver yields events as the agent produces output; the
/// join handle resolves to the aggregated reply once the stream ends.
/// Draining the receiver is the caller's single suspension point.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Opens a streaming invocation.
    async fn invoke(
        &self,
        endpoint: &AgentEndpoint,
        session_id: Uuid,
        prompt: &str,
    ) -> PrecallResult<(
        mpsc::Receiver<StreamEvent>,
        JoinHandle<PrecallResult<AgentReply>>,
    )>;
}
