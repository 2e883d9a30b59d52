//! Axum WebSocket gateway for the Precall session protocol engine.
//!
//! One live connection speaks the frame protocol in [`frames`]: it must
//! authorize with a `connect` frame, after which `sendMessage` frames run
//! the turn protocol in [`relay`] against the hosted agent, streaming
//! relay events back over the socket. [`lifecycle`] owns the durable
//! connection bindings and the connect-time authorization decision.

/// Live connection registry.
pub mod connection;
/// Inbound frame dispatch and outbound relay event shapes.
pub mod frames;
/// Connection lifecycle: authorization, durable bindings, disconnect.
pub mod lifecycle;
/// The turn controller and output sinks.
pub mod relay;
/// Router construction and the WebSocket task.
pub mod server;

pub use connection::ConnectionManager;
pub use frames::{InboundFrame, RelayEvent};
pub use lifecycle::{
    ConnectDecision, ConnectionLifecycle, Credential, IdentityVerifier, StaticTokenVerifier,
};
pub use relay::{BufferedSink, SinkClosed, TurnController, TurnRequest, TurnSink};
pub use server::{GatewayDeps, GatewayServer};
