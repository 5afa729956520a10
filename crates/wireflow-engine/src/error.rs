/*!
 * Error types for the Wireflow engine crate.
 *
 * A [`ConversationError`] only ever reaches the pending request it concerns.
 * Logical operations never return one: [`ConversationError::response_code`]
 * turns it into the per-tag failure code the caller sees.
 */
use thiserror::Error;
use wireflow_codec::CodecError;
use wireflow_core::types::ResponseCode;

/// Failure of one exchange on a connection
#[derive(Error, Debug)]
pub enum ConversationError {
    /// No matching response arrived before the deadline
    #[error("Timeout error: no response within {0} ms")]
    Timeout(u64),

    /// The request was cancelled before a response arrived
    #[error("Cancelled")]
    Cancelled,

    /// The transport failed or the peer closed the stream
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The connection already has its maximum number of requests in flight
    #[error("Too many pending requests: limit is {0}")]
    TooManyPendingRequests(usize),

    /// The outbound message could not be encoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The connection was closed locally
    #[error("Connection closed")]
    Closed,

    /// Driver error
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result type for Wireflow engine operations
pub type Result<T> = std::result::Result<T, ConversationError>;

impl ConversationError {
    /// Create a new connection lost error
    pub fn connection_lost<S: AsRef<str>>(msg: S) -> Self {
        ConversationError::ConnectionLost(msg.as_ref().to_string())
    }

    /// Create a new driver error
    pub fn driver<S: AsRef<str>>(msg: S) -> Self {
        ConversationError::Driver(msg.as_ref().to_string())
    }

    /// The per-tag failure code this error is reported as
    pub fn response_code(&self) -> ResponseCode {
        match self {
            ConversationError::Timeout(_) => ResponseCode::Timeout,
            ConversationError::Cancelled | ConversationError::Closed => ResponseCode::Cancelled,
            ConversationError::ConnectionLost(_) => ResponseCode::ConnectionLost,
            ConversationError::TooManyPendingRequests(_) => ResponseCode::TooManyPendingRequests,
            ConversationError::Codec(_) => ResponseCode::InvalidData,
            ConversationError::Driver(_) => ResponseCode::InternalError,
        }
    }
}
