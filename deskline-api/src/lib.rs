//! Deskline API - HTTP Surface
//!
//! Translates HTTP requests into Ticket Store, Transition Engine, Agent
//! Directory and Dead-Letter Store calls. No lifecycle logic lives here; the
//! layer only parses input, calls one core operation and maps the result.
//!
//! The crate also hosts the auto-close background job and the `deskline`
//! server binary.

pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
