/*!
 * Wireflow Engine
 *
 * This crate correlates requests and responses over one byte-stream
 * connection and exposes the caller API of a protocol driver:
 *
 * - [`Conversation`] runs the connection loop. It frames incoming bytes,
 *   matches messages to outstanding requests, enforces per-request deadlines
 *   and routes unsolicited messages.
 * - [`Optimizer`]s shape multi-tag operations into wire exchanges and merge
 *   the outcomes back into request order.
 * - [`Connection`] ties a [`ProtocolDriver`] to a conversation and offers
 *   `read`, `write` and `subscribe`.
 */

#![warn(missing_docs)]

// Re-export core types
pub use wireflow_core::prelude;

// Re-export types from wireflow_core for convenience
pub use wireflow_core::types::{Id, ResponseCode, Value, ValueType};

pub mod connection;
pub mod conversation;
pub mod driver;
pub mod error;
pub mod optimizer;
pub mod pending;
pub mod request;
pub mod subscription;
pub mod transaction;

// Re-export main types for convenience
pub use connection::{Connection, ConnectionConfig, Subscription};
pub use conversation::{
    Canceller, ConnectionState, Conversation, ConversationBuilder, ConversationConfig,
    ConversationEvent, PendingHandle,
};
pub use driver::{ProtocolDriver, WireRequest};
pub use error::{ConversationError, Result};
pub use optimizer::{
    merge_in_request_order, Dispatch, GroupingOptimizer, Optimizer, PerTagOptimizer,
    SingleRequestOptimizer,
};
pub use pending::{Matcher, RequestId, RequestState};
pub use request::{
    LogicalResponse, Operation, RequestOptions, SubOutcome, SubRequest, Tag, TagItem, TagResponse,
};
pub use subscription::{SubscriptionEvent, SubscriptionHandle, SubscriptionRegistry};
pub use transaction::TransactionIds;

/// Wireflow engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
