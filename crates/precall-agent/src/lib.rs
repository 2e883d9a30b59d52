//! Streaming invocation client and output protocol for the hosted agent.
//!
//! The hosted conversational agent is reached through [`AgentClient`],
//! which dispatches to an [`AgentBackend`](backends::AgentBackend). The
//! backend yields [`StreamEvent`]s as the agent produces output; the
//! [`signal`] module detects the control markers embedded in the final
//! text, and [`AgentDirectory`] resolves an agent role to its endpoint.

/// Backend trait and the HTTP line-delimited streaming backend.
pub mod backends;
/// The dispatching client.
pub mod client;
/// Agent role to endpoint resolution.
pub mod directory;
/// Control-signal detection over final agent text.
pub mod signal;
/// The streamed event union.
pub mod stream;

pub use backends::{AgentBackend, AgentReply, HttpAgentBackend};
pub use client::AgentClient;
pub use directory::{AgentDirectory, AgentEndpoint, StaticAgentDirectory};
pub use stream::StreamEvent;
