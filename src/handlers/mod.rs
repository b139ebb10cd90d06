//! HTTP layer: state wiring, DTOs, and per-endpoint handlers.

pub mod admin;
pub mod health;
pub mod ingest;
pub mod lessons;
pub mod router;
pub mod search;
pub mod state;
pub mod timeline;
pub mod types;

pub use router::{build_protected_routes, build_public_routes, AppState};
pub use state::ServiceState;
