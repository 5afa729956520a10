/*!
 * Error types for the Wireflow codec crate.
 *
 * Every codec error is recoverable at the granularity of one message: the
 * frame that produced it is discarded and decoding resumes on the next
 * boundary. Only [`FramingError`] ends a stream.
 */
use std::io;

use thiserror::Error;

/// Failure to parse or serialize one message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A read ran past the end of the buffer
    #[error("Out of data at {context}: {requested} bits requested at bit {position}, {remaining} remaining")]
    OutOfData {
        /// Context path at the point of failure
        context: String,
        /// Bit position of the read
        position: usize,
        /// Bits the read asked for
        requested: usize,
        /// Bits left in the buffer
        remaining: usize,
    },

    /// A write ran past the end of a fixed-capacity buffer
    #[error("Buffer full at {context}: {requested} bits requested at bit {position}, capacity {capacity} bits")]
    BufferFull {
        /// Context path at the point of failure
        context: String,
        /// Bit position of the write
        position: usize,
        /// Bits the write needed
        requested: usize,
        /// Capacity of the buffer in bits
        capacity: usize,
    },

    /// A checksum read from the wire disagrees with the one computed over the covered bytes
    #[error("Checksum mismatch at {context}: expected {expected:#x}, computed {computed:#x}")]
    ChecksumMismatch {
        /// Context path of the checksum field
        context: String,
        /// Value carried on the wire
        expected: u64,
        /// Value computed over the covered range
        computed: u64,
    },

    /// No variant of a discriminated union matches the discriminator
    #[error("Unknown discriminator {value} for {type_name}")]
    UnknownDiscriminator {
        /// Union being parsed
        type_name: &'static str,
        /// Rendered discriminator value
        value: String,
    },

    /// A reserved field holds an unexpected value; reported as a warning only
    #[error("Reserved field {context}: expected {expected:#x}, found {found:#x}")]
    ReservedValueMismatch {
        /// Context path of the reserved field
        context: String,
        /// Value the field should hold
        expected: u64,
        /// Value found on the wire
        found: u64,
    },

    /// A const field holds an unexpected value
    #[error("Const field {context}: expected {expected:#x}, found {found:#x}")]
    ConstMismatch {
        /// Context path of the const field
        context: String,
        /// Value the field must hold
        expected: u64,
        /// Value found on the wire
        found: u64,
    },

    /// Serialization wrote a different number of bits than declared
    #[error("Length mismatch at {context}: declared {declared} bits, wrote {written}")]
    LengthMismatch {
        /// Context path of the message or field
        context: String,
        /// Bits reported by `length_in_bits`
        declared: usize,
        /// Bits actually written
        written: usize,
    },

    /// A primitive access asked for an unsupported number of bits
    #[error("Invalid bit length {bits} for {kind}")]
    InvalidBitLength {
        /// Requested width
        bits: usize,
        /// Kind of access
        kind: &'static str,
    },

    /// A context pop did not match the innermost push
    #[error("Unbalanced context: popped '{expected}', innermost was {found:?}")]
    UnbalancedContext {
        /// Label passed to the pop
        expected: String,
        /// Innermost label on the stack
        found: Option<String>,
    },

    /// A value cannot be represented in its field
    #[error("Invalid value at {context}: {reason}")]
    InvalidValue {
        /// Context path of the field
        context: String,
        /// What is wrong with the value
        reason: String,
    },
}

impl CodecError {
    /// Whether the error only warrants a warning
    pub fn is_soft(&self) -> bool {
        matches!(self, CodecError::ReservedValueMismatch { .. })
    }

    /// Create a new invalid value error
    pub fn invalid_value<C: AsRef<str>, R: AsRef<str>>(context: C, reason: R) -> Self {
        CodecError::InvalidValue {
            context: context.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        }
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Failure that ends a framed stream
#[derive(Error, Debug)]
pub enum FramingError {
    /// The transport failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Corruption persisted beyond the configured threshold
    #[error("Gave up resynchronizing after {failures} consecutive failures")]
    ResyncLimitExceeded {
        /// Consecutive failures observed
        failures: usize,
    },
}
