//! Sheetpress HTTP server: API surface, conversion orchestrator, and
//! background workers.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod worker;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
pub use worker::WorkerPool;
