//! Structured logging setup.
//!
//! Plain `tracing` + fmt subscriber with `RUST_LOG` filtering. Kept in
//! its own module so an OTLP layer can be added here without touching
//! main.rs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber. Safe to call once at startup;
/// subsequent calls are no-ops (useful for tests).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
