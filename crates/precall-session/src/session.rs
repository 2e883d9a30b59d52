use chrono::{DateTime, Utc};
use precall_core::AgentOverrides;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a pre-consultation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting turns.
    Active,
    /// The agent signalled completion; the transcript is final.
    Completed,
    /// Administratively deactivated.
    Inactive,
}

/// One end-to-end customer pre-consultation conversation lifecycle.
///
/// The engine only reads `status`/`agent_role` and writes the
/// active→completed transition; the rest is owned by the surrounding
/// session domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: Uuid,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Role key of the assigned conversational agent, resolved through the
    /// agent directory at turn time.
    pub agent_role: String,
    /// BCP 47 locale for the conversation.
    pub locale: String,
    /// Whether the customer gave explicit consent; required for the PIN
    /// connect path.
    #[serde(default)]
    pub consent: bool,
    /// Short numeric access code for the customer connect path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Per-session agent configuration override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<AgentOverrides>,
    /// UTC timestamp of session creation.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the active→completed transition, if it happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a new active session assigned to `agent_role`.
    pub fn new(agent_role: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            agent_role: agent_role.into(),
            locale: locale.into(),
            consent: false,
            pin: None,
            overrides: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether the session currently accepts turns.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Transitions active→completed, stamping `completed_at`.
    ///
    /// Returns `true` if the transition happened. A session that is already
    /// completed or inactive is left untouched and `false` is returned, so
    /// the transition occurs at most once.
    pub fn complete(&mut self) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }
}
