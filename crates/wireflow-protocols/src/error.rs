/*!
 * Error types for tag address parsing.
 */
use thiserror::Error;

/// A tag address string that does not follow its protocol's grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The string does not have the expected shape
    #[error("Malformed tag address '{0}'")]
    Malformed(String),

    /// The memory area or data identifier is unknown
    #[error("Unknown area '{0}'")]
    UnknownArea(String),

    /// The address is outside the range the protocol can express
    #[error("Address out of range: {0}")]
    AddressOutOfRange(String),

    /// The value type is unknown or not supported in this area
    #[error("Invalid value type: {0}")]
    InvalidValueType(String),

    /// The element count is zero or too large
    #[error("Invalid element count: {0}")]
    InvalidCount(String),
}

impl TagError {
    /// Create a new malformed address error
    pub fn malformed<S: AsRef<str>>(address: S) -> Self {
        TagError::Malformed(address.as_ref().to_string())
    }

    /// Create a new address range error
    pub fn address_out_of_range<S: AsRef<str>>(msg: S) -> Self {
        TagError::AddressOutOfRange(msg.as_ref().to_string())
    }

    /// Create a new value type error
    pub fn invalid_value_type<S: AsRef<str>>(msg: S) -> Self {
        TagError::InvalidValueType(msg.as_ref().to_string())
    }

    /// Create a new element count error
    pub fn invalid_count<S: AsRef<str>>(msg: S) -> Self {
        TagError::InvalidCount(msg.as_ref().to_string())
    }
}

/// Result type for tag parsing
pub type Result<T> = std::result::Result<T, TagError>;
