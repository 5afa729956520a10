/*!
 * Wireflow Protocols
 *
 * Message catalogs and drivers for the protocols Wireflow speaks. Each
 * protocol module provides the message types, a frame detector, a tag
 * address grammar and a [`wireflow_engine::ProtocolDriver`]:
 *
 * - [`modbus`]: Modbus/TCP (MBAP header, coils, discrete inputs, input and
 *   holding registers).
 * - [`dlt645`]: DL/T 645-2007 electricity meters over a serial byte stream.
 *
 * Both modules are behind cargo features of the same name, enabled by
 * default.
 */

#![warn(missing_docs)]

// Re-export core types
pub use wireflow_core::prelude;

pub mod error;

#[cfg(feature = "modbus")]
pub mod modbus;

#[cfg(feature = "dlt645")]
pub mod dlt645;

pub use error::{TagError, Result};

/// Wireflow protocols crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Names of the protocols compiled into this build
pub fn available_protocols() -> Vec<&'static str> {
    let mut protocols = Vec::new();

    #[cfg(feature = "modbus")]
    protocols.push("modbus-tcp");

    #[cfg(feature = "dlt645")]
    protocols.push("dlt645");

    protocols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    #[cfg(all(feature = "modbus", feature = "dlt645"))]
    fn test_default_protocols() {
        assert_eq!(available_protocols(), vec!["modbus-tcp", "dlt645"]);
    }
}
