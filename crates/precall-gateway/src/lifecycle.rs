use crate::frames::RelayEvent;
use async_trait::async_trait;
use precall_session::{ConnectionRecord, ConnectionStore, SessionStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Credential presented with a `connect` frame.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Short numeric access code (customer path).
    Pin(String),
    /// Bearer identity token (operator path).
    Token(String),
}

/// Outcome of a connect attempt.
#[derive(Debug)]
pub enum ConnectDecision {
    /// The connection was bound to the session.
    Accepted(ConnectionRecord),
    /// The connection was refused; no record was written.
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
    },
}

/// Validates bearer identity tokens for the operator connect path.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Whether `token` identifies a valid operator.
    async fn verify(&self, token: &str) -> bool;
}

/// Verifier over a configured token list.
pub struct StaticTokenVerifier {
    tokens: Vec<String>,
}

impl StaticTokenVerifier {
    /// Creates a verifier accepting exactly the given tokens.
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }
}

/// Connection lifecycle handler: connect-time authorization, durable
/// connection bindings, and disconnect cleanup.
pub struct ConnectionLifecycle {
    sessions: Arc<dyn SessionStore>,
    connections: Arc<dyn ConnectionStore>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl ConnectionLifecycle {
    /// Creates the handler over its collaborators.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        connections: Arc<dyn ConnectionStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            sessions,
            connections,
            verifier,
        }
    }

    /// Authorizes a new connection and, on success, writes its durable
    /// binding (24-hour expiry).
    ///
    /// PIN path: the session must exist, be active, carry explicit
    /// consent, and the PIN must match. Token path: the token must verify
    /// and the session must exist. A rejected connect leaves no state.
    pub async fn on_connect(
        &self,
        connection_id: Uuid,
        session_id: Uuid,
        credential: Credential,
    ) -> ConnectDecision {
        let session = match self.sessions.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                return ConnectDecision::Rejected {
                    reason: "Session not found".into(),
                }
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session lookup failed at connect");
                return ConnectDecision::Rejected {
                    reason: "Session lookup failed".into(),
                };
            }
        };

        match &credential {
            Credential::Pin(pin) => {
                if !session.is_active() {
                    return ConnectDecision::Rejected {
                        reason: "Session is not active".into(),
                    };
                }
                if !session.consent {
                    return ConnectDecision::Rejected {
                        reason: "Consent has not been given for this session".into(),
                    };
                }
                if session.pin.as_deref() != Some(pin.as_str()) {
                    return ConnectDecision::Rejected {
                        reason: "Invalid PIN".into(),
                    };
                }
            }
            Credential::Token(token) => {
                if !self.verifier.verify(token).await {
                    return ConnectDecision::Rejected {
                        reason: "Invalid identity token".into(),
                    };
                }
            }
        }

        let record = ConnectionRecord::new(connection_id, session_id);
        if let Err(e) = self.connections.put(&record).await {
            warn!(connection_id = %connection_id, error = %e, "Failed to write connection record");
            return ConnectDecision::Rejected {
                reason: "Failed to register connection".into(),
            };
        }

        info!(
            connection_id = %connection_id,
            session_id = %session_id,
            "Connection accepted"
        );
        ConnectDecision::Accepted(record)
    }

    /// Deletes the connection binding if present. Idempotent.
    pub async fn on_disconnect(&self, connection_id: Uuid) {
        if let Err(e) = self.connections.delete(connection_id).await {
            warn!(connection_id = %connection_id, error = %e, "Failed to delete connection record");
        } else {
            info!(connection_id = %connection_id, "Connection released");
        }
    }

    /// Catch-all for unrecognized client frames: logs and returns the
    /// single error event to send back. No persistent action is taken.
    pub fn on_unroutable(&self, connection_id: Uuid, payload: &str) -> RelayEvent {
        warn!(
            connection_id = %connection_id,
            payload_len = payload.len(),
            "Unroutable client frame"
        );
        RelayEvent::Error {
            message: "Unrecognized message".into(),
        }
    }
}
