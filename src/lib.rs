pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::EngineConfig;
pub use crate::core::error::{LauncherError, LauncherResult};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// `default_filter`. Calling this more than once is harmless.
pub fn init_tracing(default_filter: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("InterfaceOficial engine starting...");
    }
}
