//! HTTP surface for the push broker.
//!
//! The routes here convert HTTP calls into hub operations and perform all
//! request-boundary validation; everything stateful lives in [`crate::hub`].

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
