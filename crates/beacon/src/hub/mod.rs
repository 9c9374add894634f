//! Real-time push broker core.
//!
//! One long-lived, server-to-client event stream per subscriber identity,
//! with unicast, broadcast and system-event delivery, per-stream keep-alive
//! heartbeats, and prompt eviction of dead streams.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        HTTP layer (api)                      │
//! │   connect / disconnect / send / broadcast / system-event     │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼──────────────────────────────┐
//! │                           EventHub                           │
//! │  - ConnectionRegistry: identity -> live Connection           │
//! │  - dispatch with per-target eviction on write failure        │
//! │  - one heartbeat task per connection                         │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ bounded mpsc per connection
//! ┌───────────────────────────────▼──────────────────────────────┐
//! │   EventStream (SSE response body, idle timeout, drop→evict)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod connection;
mod heartbeat;
mod hub;
mod registry;
mod stream;
mod types;

pub use connection::{Connection, ConnectionState};
pub use hub::{EventHub, HubError, HubOptions};
pub use registry::ConnectionRegistry;
pub use stream::EventStream;
pub use types::{ConnectedUsers, DeliveryReport, PushEvent, SendOutcome, WriteError, event};
