//! HTTP server for the Shelf content platform.
//!
//! Wires the blob store and metadata store behind an axum API: public reads,
//! the admin lifecycle surface, storage accounting, and the garbage
//! collection sweep.

pub mod error;
pub mod gc;
pub mod guard;
pub mod handlers;
pub mod lifecycle;
pub mod quota;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
