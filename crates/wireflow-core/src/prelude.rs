/*!
 * Prelude module for Wireflow Core.
 *
 * This module re-exports commonly used types and functions from the Wireflow Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{Id, ResponseCode, Value, ValueType};

// Re-export event types
pub use crate::event::{EventBus, SharedEventBus, TypedEvent};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder, ConversationSettings, FramingSettings};

// Re-export utility functions
pub use crate::utils::{duration_to_millis, millis_to_duration};

// Re-export logging helpers
pub use crate::log_with_fields;
pub use crate::logging::{connection_span, operation_span};
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
