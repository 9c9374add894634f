//! A single subscriber's live outbound stream plus bookkeeping.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::types::{PushEvent, WriteError};

/// How long a single write may wait for buffer space before the target is
/// treated as dead. Bounds the damage a stalled consumer can do to a
/// broadcast loop.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const STATE_ACTIVE: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of a connection. Only `Active` accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Active => write!(f, "active"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// One subscriber's connection: the send half of its event channel plus
/// lifecycle state and a per-connection event-id counter.
///
/// The receive half is the client's stream. All writers go through
/// [`Connection::push`], which serializes per-connection writes by virtue of
/// the channel: each event is a single message and the lone consumer encodes
/// frames, so concurrent writers can never interleave within one event.
///
/// A connection that reaches `Closed` is never reused; a reconnecting
/// subscriber always gets a freshly constructed `Connection`.
pub struct Connection {
    identity: String,
    created_at: DateTime<Utc>,
    state: AtomicU8,
    next_event_id: AtomicU64,
    tx: Mutex<Option<mpsc::Sender<PushEvent>>>,
}

impl Connection {
    /// Create a connection for `identity` with the given channel capacity.
    ///
    /// Returns the connection and the receive half for the client stream.
    pub fn new(identity: &str, capacity: usize) -> (Arc<Self>, mpsc::Receiver<PushEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(Self {
            identity: identity.to_string(),
            created_at: Utc::now(),
            state: AtomicU8::new(STATE_ACTIVE),
            next_event_id: AtomicU64::new(0),
            tx: Mutex::new(Some(tx)),
        });
        (conn, rx)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_ACTIVE => ConnectionState::Active,
            STATE_CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_ACTIVE
    }

    /// Stamp and write one event to the stream.
    ///
    /// A connection that is closing, closed, whose client went away, or whose
    /// buffer stayed full past the write timeout reports a [`WriteError`];
    /// the caller decides about eviction.
    pub async fn push(&self, name: &str, data: Value) -> Result<(), WriteError> {
        if !self.is_active() {
            return Err(WriteError::Closed);
        }
        let Some(tx) = self.sender() else {
            return Err(WriteError::Closed);
        };
        let event = PushEvent {
            id: self
                .next_event_id
                .fetch_add(1, Ordering::Relaxed)
                .to_string(),
            name: name.to_string(),
            data,
        };
        match tx.send_timeout(event, WRITE_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(WriteError::Disconnected),
            Err(SendTimeoutError::Timeout(_)) => Err(WriteError::Timeout),
        }
    }

    /// Flag the connection as tearing down; writes stop immediately.
    pub fn mark_closing(&self) {
        let _ = self.state.compare_exchange(
            STATE_ACTIVE,
            STATE_CLOSING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Close the connection. Idempotent.
    ///
    /// Dropping the send half ends the client's stream once buffered events
    /// are drained.
    pub fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        let _ = self.take_sender();
    }

    fn sender(&self) -> Option<mpsc::Sender<PushEvent>> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn take_sender(&self) -> Option<mpsc::Sender<PushEvent>> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_push_delivers_with_monotonic_ids() {
        let (conn, mut rx) = Connection::new("u1", 8);
        conn.push("connect", json!("hi")).await.unwrap();
        conn.push("message", json!("one")).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.id, "0");
        assert_eq!(first.name, "connect");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, "1");
        assert_eq!(second.data, json!("one"));
    }

    #[tokio::test]
    async fn test_new_connection_is_active() {
        let (conn, _rx) = Connection::new("u1", 8);
        assert_eq!(conn.state(), ConnectionState::Active);
        assert!(conn.is_active());
    }

    #[tokio::test]
    async fn test_closing_rejects_writes() {
        let (conn, _rx) = Connection::new("u1", 8);
        conn.mark_closing();
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(matches!(
            conn.push("message", json!("x")).await,
            Err(WriteError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_ends_client_stream() {
        let (conn, mut rx) = Connection::new("u1", 8);
        conn.push("connect", json!("hi")).await.unwrap();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);

        // Buffered events drain, then the stream ends.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _rx) = Connection::new("u1", 8);
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_push_after_client_gone_reports_disconnected() {
        let (conn, rx) = Connection::new("u1", 8);
        drop(rx);
        assert!(matches!(
            conn.push("message", json!("x")).await,
            Err(WriteError::Disconnected)
        ));
    }
}
