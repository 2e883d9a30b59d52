use crate::backends::{AgentBackend, AgentReply, HttpAgentBackend};
use crate::directory::AgentEndpoint;
use crate::stream::StreamEvent;
use precall_core::{AgentOverrides, PrecallResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Client for the hosted conversational agent.
///
/// Thin dispatcher over an [`AgentBackend`]; merges per-session overrides
/// over the endpoint's role-level defaults before each call.
pub struct AgentClient {
    backend: Box<dyn AgentBackend>,
}

impl AgentClient {
    /// Creates a client over the HTTP streaming backend.
    pub fn new() -> Self {
        Self {
            backend: Box::new(HttpAgentBackend::new()),
        }
    }

    /// Creates a client from a pre-built backend (for test fakes and
    /// custom transports).
    pub fn from_backend(backend: Box<dyn AgentBackend>) -> Self {
        Self { backend }
    }

    /// Opens one streaming invocation for a session turn.
    ///
    /// Returns the event receiver and a join handle resolving to the
    /// aggregated reply. Draining the receiver is the caller's single
    /// suspension point; the call is restartable but not resumable.
    pub async fn invoke(
        &self,
        endpoint: &AgentEndpoint,
        session_id: Uuid,
        prompt: &str,
        session_overrides: Option<&AgentOverrides>,
    ) -> PrecallResult<(
        mpsc::Receiver<StreamEvent>,
        JoinHandle<PrecallResult<AgentReply>>,
    )> {
        let endpoint = match session_overrides {
            Some(overrides) if !overrides.is_empty() => AgentEndpoint {
                url: endpoint.url.clone(),
                overrides: endpoint.overrides.merged_with(overrides),
            },
            _ => endpoint.clone(),
        };
        self.backend.invoke(&endpoint, session_id, prompt).await
    }
}

impl Default for AgentClient {
    fn default() -> Self {
        Self::new()
    }
}
