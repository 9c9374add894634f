//! Event and delivery-result types for the push broker.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Well-known event names on the wire.
pub mod event {
    /// Initial event pushed when a stream is established.
    pub const CONNECT: &str = "connect";
    /// Periodic keep-alive event.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Direct message to a single subscriber.
    pub const MESSAGE: &str = "message";
    /// Fan-out message to every subscriber.
    pub const BROADCAST: &str = "broadcast";
    /// Prefix for labeled system events ("system-<type>").
    pub const SYSTEM_PREFIX: &str = "system-";
}

/// One unit of pushed data.
///
/// Ids are stamped per connection from a monotonically increasing counter,
/// so the first event on any stream (the "connect" event) carries id "0".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEvent {
    pub id: String,
    pub name: String,
    pub data: Value,
}

/// Why a write to a connection's stream did not go through.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The connection is no longer accepting writes.
    #[error("connection is closed")]
    Closed,

    /// The client side of the stream went away.
    #[error("client stream disconnected")]
    Disconnected,

    /// The client stopped draining its buffer in time.
    #[error("write timed out")]
    Timeout,
}

/// Result of a unicast delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Delivered,
    NotConnected,
    Failed,
}

/// Per-target tally for broadcast and system-event dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub success: usize,
    pub fail: usize,
}

/// Snapshot of the currently connected subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedUsers {
    pub count: usize,
    pub users: Vec<String>,
}
