//! beacon - real-time SSE push broker.
//!
//! Maintains one long-lived Server-Sent-Events stream per subscriber
//! identity and lets callers push named events to a single subscriber, to
//! all subscribers, or as a labeled system event. Dead streams are evicted
//! promptly; healthy ones are kept open with periodic heartbeats.

pub mod api;
pub mod hub;
pub mod settings;
