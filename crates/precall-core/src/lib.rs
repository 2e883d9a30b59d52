//! Core types and error definitions for the Precall session engine.
//!
//! This crate provides the foundational types shared across all Precall
//! crates: the unified error enum, the persisted message record, and the
//! per-session agent configuration override.
//!
//! # Main types
//!
//! - [`PrecallError`] — Unified error enum for all Precall subsystems.
//! - [`PrecallResult`] — Convenience alias for `Result<T, PrecallError>`.
//! - [`Sender`] — Who authored a transcript message (customer or agent).
//! - [`ContentType`] — Classification of message content.
//! - [`MessageRecord`] / [`NewMessage`] — One persisted transcript entry.
//! - [`AgentOverrides`] — Per-session agent configuration override.

/// Transcript message record types.
pub mod message;

pub use message::{AgentOverrides, ContentType, MessageRecord, NewMessage, Sender};

// --- Error types ---

/// Top-level error type for the Precall session engine.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum PrecallError {
    /// An error related to session persistence or state.
    #[error("Session error: {0}")]
    Session(String),

    /// An error appending to or reading the transcript.
    #[error("Transcript error: {0}")]
    Transcript(String),

    /// An error in the connection registry or durable connection records.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An error from the hosted conversational agent or its stream.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error from the gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`PrecallError`].
pub type PrecallResult<T> = Result<T, PrecallError>;
