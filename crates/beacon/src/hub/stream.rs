//! The client-side stream handle returned by connect.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use log::debug;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

use super::connection::Connection;
use super::hub::EventHub;
use super::types::PushEvent;

/// A subscriber's live event stream.
///
/// Yields events pushed by the hub and terminates when the connection is
/// closed or when no event has arrived within the idle timeout (heartbeats
/// keep a healthy stream alive indefinitely).
///
/// Dropping the stream is the transport lifecycle notification: the client
/// went away, the response body was torn down, or the idle timeout fired.
/// Either way the drop routes to the hub's eviction path, which is a no-op
/// if the connection was already removed.
pub struct EventStream {
    hub: Arc<EventHub>,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<PushEvent>,
    idle_timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    timed_out: bool,
}

impl EventStream {
    pub(crate) fn new(
        hub: Arc<EventHub>,
        conn: Arc<Connection>,
        rx: mpsc::Receiver<PushEvent>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            conn,
            rx,
            idle_timeout,
            deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            timed_out: false,
        }
    }

    /// Identity this stream was opened for.
    pub fn identity(&self) -> &str {
        self.conn.identity()
    }

    /// Half-close from the client side: stop accepting further writes
    /// without dropping the handle. Buffered events remain readable;
    /// writers observe a write failure from here on.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for EventStream {
    type Item = PushEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PushEvent>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                let next = Instant::now() + this.idle_timeout;
                this.deadline.as_mut().reset(next);
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => {
                if this.deadline.as_mut().poll(cx).is_ready() {
                    debug!(
                        "stream for {} idle past {:?}, ending",
                        this.conn.identity(),
                        this.idle_timeout
                    );
                    this.timed_out = true;
                    Poll::Ready(None)
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let reason = if self.timed_out {
            "idle timeout"
        } else {
            "client stream dropped"
        };
        self.hub.evict(&self.conn, reason);
    }
}
