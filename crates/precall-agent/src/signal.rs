//! Control-signal detection over the final assembled agent text.
//!
//! The agent embeds two reserved literals in its free-form output. This is
//! a versioned contract (v1) between the hosted agent prompt and this
//! engine:
//!
//! - [`COMPLETION_MARKER`] — the agent considers the conversation finished.
//!   The literal is stripped (with surrounding whitespace trimmed) before
//!   persistence or display.
//! - [`FORM_MARKER`] — the reserved opening fragment of a renderable form
//!   definition; its presence classifies the response as a form rather
//!   than prose.
//!
//! v1 defines no escaping: legitimate agent text containing a literal
//! marker is indistinguishable from the signal.

use precall_core::ContentType;

/// Reserved literal marking the last turn of a session.
pub const COMPLETION_MARKER: &str = "EOF";

/// Reserved opening fragment of a renderable form definition.
pub const FORM_MARKER: &str = "{\"formSpec\"";

/// Outcome of running the detector over the final text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedSignals {
    /// The text with the completion marker removed.
    pub text: String,
    /// Content classification for the outbound message.
    pub content_type: ContentType,
    /// Whether the completion marker was present.
    pub is_complete: bool,
}

/// Runs both detectors over the final text.
///
/// The form marker is checked first (it decides the content type), then
/// the completion marker is detected and stripped. The two checks are
/// independent.
pub fn detect(text: &str) -> DetectedSignals {
    let content_type = classify(text);
    let is_complete = has_completion_marker(text);
    let text = strip_completion_marker(text);
    DetectedSignals {
        text,
        content_type,
        is_complete,
    }
}

/// Classifies the response content type by form-marker presence.
pub fn classify(text: &str) -> ContentType {
    if text.contains(FORM_MARKER) {
        ContentType::RenderableForm
    } else {
        ContentType::PlainText
    }
}

/// Whether the completion marker occurs anywhere in the text.
pub fn has_completion_marker(text: &str) -> bool {
    text.contains(COMPLETION_MARKER)
}

/// Removes every occurrence of the completion marker along with the
/// whitespace around it.
///
/// Idempotent, and the cleaned output is the same wherever the marker sat
/// in the text. Text without the marker is returned unchanged.
pub fn strip_completion_marker(text: &str) -> String {
    if !text.contains(COMPLETION_MARKER) {
        return text.to_string();
    }
    text.split(COMPLETION_MARKER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
