//! Per-connection keep-alive loop.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::json;

use super::connection::Connection;
use super::hub::EventHub;
use super::types::event;

/// Start the heartbeat task for a freshly registered connection.
pub(crate) fn spawn(hub: Arc<EventHub>, conn: Arc<Connection>) {
    tokio::spawn(run(hub, conn));
}

/// Sleep, re-check currency, write one heartbeat, repeat.
///
/// The currency check compares identity plus reference: a reconnect replaces
/// the registry entry with a different `Connection` under the same identity,
/// and this loop must not keep beating the superseded one. Exiting on
/// supersession, disconnect, or eviction is the normal quiet path; only a
/// write failure is worth logging.
async fn run(hub: Arc<EventHub>, conn: Arc<Connection>) {
    let interval = hub.keep_alive_interval();
    let mut beats: u64 = 0;
    loop {
        tokio::select! {
            _ = hub.cancelled() => {
                debug!("heartbeat for {} stopped by shutdown", conn.identity());
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if !hub.registry().is_current(conn.identity(), &conn) {
            debug!(
                "heartbeat for {} ended, connection no longer current",
                conn.identity()
            );
            return;
        }

        beats += 1;
        if let Err(err) = conn.push(event::HEARTBEAT, json!(beats)).await {
            warn!("heartbeat to {} failed: {}", conn.identity(), err);
            hub.evict(&conn, "heartbeat write failed");
            return;
        }
    }
}
