//! Tracing setup shared by the binaries

use tracing_subscriber::{fmt, EnvFilter};

/// Install the fmt subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}
