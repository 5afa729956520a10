/*!
 * Wireflow Core
 *
 * This crate provides the ambient pieces every Wireflow crate shares:
 * the error type, configuration loading, logging setup, the device value
 * model and the event bus connections publish on.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use chrono;
    pub use serde;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// Wireflow core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("Wireflow Core {} initialized", VERSION);
    Ok(())
}

/// Library initialization driven by a loaded configuration
pub fn init_with_config(config: &config::Config) -> Result<(), error::Error> {
    logging::init_from_config(&config.logging)?;
    tracing::info!(
        "Wireflow Core {} initialized for {} ({})",
        VERSION,
        config.general.app_name,
        config.general.environment
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
