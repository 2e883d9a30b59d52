use precall_core::{AgentOverrides, PrecallError, PrecallResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resolved agent endpoint: where to reach the hosted agent for a role,
/// plus the role's default configuration overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpoint {
    /// Invocation URL of the hosted agent.
    pub url: String,
    /// Role-level default overrides; per-session overrides are merged over
    /// these at call time.
    #[serde(default)]
    pub overrides: AgentOverrides,
}

/// Resolves an assigned-agent role to its endpoint.
pub trait AgentDirectory: Send + Sync {
    /// Looks up the endpoint for `role`.
    fn resolve(&self, role: &str) -> PrecallResult<AgentEndpoint>;
}

/// Directory backed by a static role→endpoint map from configuration.
pub struct StaticAgentDirectory {
    endpoints: HashMap<String, AgentEndpoint>,
}

impl StaticAgentDirectory {
    /// Builds the directory from a role→endpoint map.
    pub fn new(endpoints: HashMap<String, AgentEndpoint>) -> Self {
        Self { endpoints }
    }
}

impl AgentDirectory for StaticAgentDirectory {
    fn resolve(&self, role: &str) -> PrecallResult<AgentEndpoint> {
        self.endpoints
            .get(role)
            .cloned()
            .ok_or_else(|| PrecallError::Agent(format!("Unknown agent role: {role}")))
    }
}
