/*!
 * Logging functionality for Wireflow.
 *
 * This module provides tracing setup and the span helpers every connection
 * and logical operation runs inside.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "wireflow_engine=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Initialize the logging system from the `[logging]` configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    if !config.json_format {
        return init_with_filter(&config.level);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt::layer().json().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A convenience macro for creating structured logs with fields
#[macro_export]
macro_rules! log_with_fields {
    ($level:expr, $message:expr, $($field:tt)+) => {
        tracing::event!($level, $($field)+, message = $message)
    };
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create the span a connection's event loop runs inside
///
/// # Arguments
///
/// * `protocol` - The protocol spoken on the connection
/// * `id` - The connection identifier
pub fn connection_span(protocol: &str, id: &str) -> Span {
    tracing::info_span!("connection", protocol = %protocol, id = %id)
}

/// Create a new span for a logical operation
///
/// # Arguments
///
/// * `name` - The name of the operation (read, write, subscribe)
/// * `protocol` - The protocol performing the operation
pub fn operation_span(name: &str, protocol: &str) -> Span {
    tracing::info_span!("operation", name = %name, protocol = %protocol)
}
