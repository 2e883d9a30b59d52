//! Persisted transcript message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The customer on the live connection.
    Customer,
    /// The hosted conversational agent.
    Agent,
}

/// Classification of message content.
///
/// `StructuredSubmission` only appears on inbound messages: it marks a
/// client-filled form payload. Outbound agent messages are classified as
/// `PlainText` or `RenderableForm` by the signal detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    /// Free-form prose.
    PlainText,
    /// A structured form definition meant to be rendered as interactive UI.
    RenderableForm,
    /// A structured payload submitted by the client (a filled form).
    StructuredSubmission,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::PlainText
    }
}

/// A transcript message as handed to the store, before a sequence position
/// has been assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// Client-supplied (or generated) identifier for the turn.
    pub turn_id: String,
    /// Who authored the message.
    pub sender: Sender,
    /// The message content. For structured submissions this is the original
    /// payload, not the agent-facing rendering.
    pub content: String,
    /// Content classification.
    pub content_type: ContentType,
    /// Turn stage label, e.g. `"pre_consultation"` or `"planning"`.
    pub stage: String,
    /// Retention expiry for the persisted record.
    pub expires_at: DateTime<Utc>,
}

/// One persisted transcript entry. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// Client-supplied (or generated) identifier for the turn.
    pub turn_id: String,
    /// Monotonic position within the session's transcript, assigned by the
    /// transcript store at append time.
    pub seq: u64,
    /// Who authored the message.
    pub sender: Sender,
    /// The message content.
    pub content: String,
    /// Content classification.
    pub content_type: ContentType,
    /// Turn stage label.
    pub stage: String,
    /// UTC timestamp of when the record was persisted.
    pub created_at: DateTime<Utc>,
    /// Retention expiry for the persisted record.
    pub expires_at: DateTime<Utc>,
}

/// Per-session override of the agent configuration resolved from the
/// directory. All fields are optional; set fields replace the directory
/// defaults for every call made on behalf of that session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOverrides {
    /// Replacement system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
    /// Replacement model selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Display name shown to the customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AgentOverrides {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.system_instructions.is_none() && self.model.is_none() && self.display_name.is_none()
    }

    /// Merges `other` over `self`: set fields in `other` win.
    pub fn merged_with(&self, other: &AgentOverrides) -> AgentOverrides {
        AgentOverrides {
            system_instructions: other
                .system_instructions
                .clone()
                .or_else(|| self.system_instructions.clone()),
            model: other.model.clone().or_else(|| self.model.clone()),
            display_name: other
                .display_name
                .clone()
                .or_else(|| self.display_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_wire_names_are_kebab_case() {
        let json = serde_json::to_string(&ContentType::RenderableForm).unwrap();
        assert_eq!(json, "\"renderable-form\"");
        let back: ContentType = serde_json::from_str("\"structured-submission\"").unwrap();
        assert_eq!(back, ContentType::StructuredSubmission);
    }

    #[test]
    fn overrides_merge_prefers_other() {
        let base = AgentOverrides {
            system_instructions: Some("base".into()),
            model: Some("m1".into()),
            display_name: None,
        };
        let per_session = AgentOverrides {
            system_instructions: None,
            model: Some("m2".into()),
            display_name: Some("Ava".into()),
        };
        let merged = base.merged_with(&per_session);
        assert_eq!(merged.system_instructions.as_deref(), Some("base"));
        assert_eq!(merged.model.as_deref(), Some("m2"));
        assert_eq!(merged.display_name.as_deref(), Some("Ava"));
    }
}
