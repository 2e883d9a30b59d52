//! Session, transcript, and connection record persistence for Precall.
//!
//! Three durable stores back the session protocol engine:
//!
//! - [`SessionStore`] — session metadata (status, assigned agent role).
//! - [`TranscriptStore`] — the ordered per-session message log.
//! - [`ConnectionStore`] — connection-to-session bindings with expiry.
//!
//! All three are `async_trait` traits with file-backed implementations;
//! writes are single-key upserts/appends, so per-key atomicity is the only
//! locking discipline required.

/// Durable connection-to-session bindings.
pub mod connection;
/// The session record and its status machine.
pub mod session;
/// Session metadata persistence.
pub mod store;
/// The ordered per-session message log.
pub mod transcript;

pub use connection::{ConnectionRecord, ConnectionStore, FileConnectionStore};
pub use session::{Session, SessionStatus};
pub use store::{FileSessionStore, SessionStore};
pub use transcript::{FileTranscriptStore, TranscriptStore};
