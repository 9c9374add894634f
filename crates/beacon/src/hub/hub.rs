//! The event hub: connection lifecycle plus event dispatch.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::connection::Connection;
use super::heartbeat;
use super::registry::ConnectionRegistry;
use super::stream::EventStream;
use super::types::{ConnectedUsers, DeliveryReport, SendOutcome, WriteError, event};

/// Tunables for the hub. Intervals come from [`crate::settings::Settings`]
/// in the server; tests shorten them freely.
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// Pause between keep-alive events on each stream.
    pub keep_alive_interval: Duration,
    /// A stream with no traffic for this long is ended.
    pub idle_timeout: Duration,
    /// Per-connection event buffer size.
    pub channel_capacity: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_millis(15_000),
            idle_timeout: Duration::from_millis(3_600_000),
            channel_capacity: 64,
        }
    }
}

/// Errors surfaced to the caller of [`EventHub::connect`].
#[derive(Debug, Error)]
pub enum HubError {
    #[error("broker is shutting down")]
    ShuttingDown,

    #[error("initial connect write for {identity} failed: {source}")]
    InitialWrite {
        identity: String,
        source: WriteError,
    },
}

/// Owns the connection registry and implements every broker operation:
/// connect, disconnect, unicast, broadcast, system events, and process-wide
/// shutdown.
///
/// Every failure path funnels into [`EventHub::evict`], which removes the
/// connection only while it is still the registry's current entry for its
/// identity, then closes it. Eviction is idempotent; racing writers at worst
/// perform a harmless no-op.
pub struct EventHub {
    registry: ConnectionRegistry,
    options: HubOptions,
    cancel: CancellationToken,
}

impl EventHub {
    pub fn new(options: HubOptions) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Open a stream for `identity`, replacing any previous one.
    ///
    /// The previous connection (if any) is closed best-effort first, so the
    /// registry never holds two active streams for one identity even when a
    /// client opens a second stream before the first is torn down. The new
    /// connection receives the initial "connect" event before registration;
    /// if that write fails nothing is registered and no heartbeat starts.
    pub async fn connect(self: &Arc<Self>, identity: &str) -> Result<EventStream, HubError> {
        if self.cancel.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }

        if let Some(prev) = self.registry.get(identity) {
            info!("closing previous connection for {identity}");
            prev.mark_closing();
            prev.close();
        }

        let (conn, rx) = Connection::new(identity, self.options.channel_capacity);
        if let Err(source) = conn
            .push(event::CONNECT, json!(format!("{identity} connected")))
            .await
        {
            warn!("initial connect write for {identity} failed: {source}");
            conn.close();
            return Err(HubError::InitialWrite {
                identity: identity.to_string(),
                source,
            });
        }

        if let Some(prev) = self.registry.insert(conn.clone()) {
            // Lost a race with a concurrent connect for the same identity.
            prev.mark_closing();
            prev.close();
        }

        if self.cancel.is_cancelled() {
            // Shutdown drained the registry while we were registering.
            self.evict(&conn, "shutdown during connect");
            return Err(HubError::ShuttingDown);
        }

        heartbeat::spawn(Arc::clone(self), Arc::clone(&conn));
        info!(
            "connection established for {identity} ({} connected)",
            self.registry.len()
        );

        Ok(EventStream::new(
            Arc::clone(self),
            conn,
            rx,
            self.options.idle_timeout,
        ))
    }

    /// Explicitly close `identity`'s stream. Returns whether a live
    /// connection was removed; absent identities are a quiet no-op.
    pub fn disconnect(&self, identity: &str) -> bool {
        match self.registry.remove(identity) {
            Some(conn) => {
                conn.mark_closing();
                conn.close();
                info!("connection for {identity} disconnected");
                true
            }
            None => {
                debug!("disconnect for {identity}: not connected");
                false
            }
        }
    }

    /// One delivery attempt to a single subscriber.
    pub async fn send_to_user(&self, identity: &str, event_name: &str, data: Value) -> SendOutcome {
        let Some(conn) = self.registry.get(identity) else {
            debug!("send {event_name} to {identity}: not connected");
            return SendOutcome::NotConnected;
        };
        match conn.push(event_name, data).await {
            Ok(()) => {
                debug!("delivered {event_name} to {identity}");
                SendOutcome::Delivered
            }
            Err(err) => {
                warn!("delivery of {event_name} to {identity} failed: {err}");
                self.evict(&conn, "unicast write failed");
                SendOutcome::Failed
            }
        }
    }

    /// Deliver a "broadcast" event to every connected subscriber.
    pub async fn broadcast(&self, data: Value) -> DeliveryReport {
        self.dispatch(event::BROADCAST, data).await
    }

    /// Deliver a labeled system event ("system-<type>") to every connected
    /// subscriber.
    pub async fn system_event(&self, event_type: &str, data: Value) -> DeliveryReport {
        let name = format!("{}{event_type}", event::SYSTEM_PREFIX);
        self.dispatch(&name, data).await
    }

    /// Current count and identities. Pure read.
    pub fn list_connected(&self) -> ConnectedUsers {
        let users = self.registry.identities();
        ConnectedUsers {
            count: users.len(),
            users,
        }
    }

    /// Process-wide teardown: stop heartbeat scheduling, cancel all
    /// heartbeat tasks, close and forget every connection.
    ///
    /// Safe against concurrent in-flight sends; they observe write failures
    /// and their eviction attempts become no-ops against the drained
    /// registry.
    pub fn shutdown(&self) {
        info!("shutting down event hub");
        self.cancel.cancel();
        let drained = self.registry.drain();
        let count = drained.len();
        for conn in drained {
            conn.mark_closing();
            conn.close();
        }
        info!("closed {count} connections");
    }

    /// Remove the connection if it is still current, then close it.
    ///
    /// This is the single sink for write failures, heartbeat failures, and
    /// transport lifecycle notifications. Running it twice for the same
    /// connection is harmless.
    pub(crate) fn evict(&self, conn: &Arc<Connection>, reason: &str) {
        if let Some(removed) = self.registry.remove_if_current(conn.identity(), conn) {
            info!("evicting connection for {}: {reason}", removed.identity());
        }
        conn.close();
    }

    async fn dispatch(&self, name: &str, data: Value) -> DeliveryReport {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            debug!("no connected subscribers for {name}");
            return DeliveryReport::default();
        }

        let mut report = DeliveryReport::default();
        for (identity, conn) in snapshot {
            match conn.push(name, data.clone()).await {
                Ok(()) => report.success += 1,
                Err(err) => {
                    warn!("dispatch of {name} to {identity} failed: {err}");
                    self.evict(&conn, "dispatch write failed");
                    report.fail += 1;
                }
            }
        }
        info!(
            "dispatched {name}: {} delivered, {} failed",
            report.success, report.fail
        );
        report
    }

    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub(crate) fn keep_alive_interval(&self) -> Duration {
        self.options.keep_alive_interval
    }

    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}
