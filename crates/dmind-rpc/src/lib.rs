/// DECENTRAMIND HTTP API
///
/// JSON routes over the burn, subscription, role, session and market
/// services. Built on warp; the daemon constructs an `AppState` and calls
/// `serve`.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiFailure, FailureKind};
pub use routes::{routes, serve};
pub use state::AppState;
