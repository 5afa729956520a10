/*!
 * Logical requests and responses.
 *
 * A caller asks for a batch of tags; the optimizer cuts the batch into
 * [`SubRequest`]s and the merged [`LogicalResponse`] reports one
 * [`TagResponse`] per requested tag, in request order. Per-tag failures are
 * [`ResponseCode`]s, never errors.
 */
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wireflow_core::types::{ResponseCode, Value, ValueType};

/// A parsed device address plus the value type and element count requested
pub trait Tag: fmt::Debug + fmt::Display + Clone + Eq + Ord + Hash + Send + Sync + 'static {
    /// Value type requested for each element
    fn value_type(&self) -> ValueType;

    /// Number of elements requested
    fn element_count(&self) -> usize {
        1
    }
}

/// Kind of logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Read current values
    Read,
    /// Write values
    Write,
    /// Register for value change events
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// One tag of a logical request with its position in that request
#[derive(Debug, Clone, PartialEq)]
pub struct TagItem<T> {
    /// Position of the tag in the logical request
    pub index: usize,
    /// The tag
    pub tag: T,
    /// Value to write, for write operations
    pub value: Option<Value>,
}

/// Part of a logical request served by one wire exchange
#[derive(Debug, Clone, PartialEq)]
pub struct SubRequest<T> {
    /// Tags served by the exchange
    pub items: Vec<TagItem<T>>,
}

impl<T> SubRequest<T> {
    /// Create a sub-request over `items`
    pub fn new(items: Vec<TagItem<T>>) -> Self {
        Self { items }
    }

    /// Tags of the sub-request, in order
    pub fn tags(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|item| &item.tag)
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the sub-request serves no tag
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResponse<T> {
    /// The tag
    pub tag: T,
    /// Outcome
    pub code: ResponseCode,
    /// Value read, if any
    pub value: Option<Value>,
}

impl<T> TagResponse<T> {
    /// A served tag carrying a value
    pub fn ok(tag: T, value: Value) -> Self {
        Self {
            tag,
            code: ResponseCode::Ok,
            value: Some(value),
        }
    }

    /// A served tag without a value (writes, subscriptions)
    pub fn done(tag: T) -> Self {
        Self {
            tag,
            code: ResponseCode::Ok,
            value: None,
        }
    }

    /// A failed tag
    pub fn failed(tag: T, code: ResponseCode) -> Self {
        Self {
            tag,
            code,
            value: None,
        }
    }
}

/// Outcome of one sub-request: per-tag results aligned with its items, or a
/// failure that applies to all of them
pub type SubOutcome<T> = std::result::Result<Vec<TagResponse<T>>, ResponseCode>;

/// Caller-visible result of a logical operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalResponse<T> {
    items: Vec<TagResponse<T>>,
}

impl<T: PartialEq> LogicalResponse<T> {
    /// Build a response from results already in request order
    pub fn new(items: Vec<TagResponse<T>>) -> Self {
        Self { items }
    }

    /// Results in request order
    pub fn items(&self) -> &[TagResponse<T>] {
        &self.items
    }

    /// Consume the response
    pub fn into_items(self) -> Vec<TagResponse<T>> {
        self.items
    }

    /// Number of results
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the response is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First result for `tag`
    pub fn get(&self, tag: &T) -> Option<&TagResponse<T>> {
        self.items.iter().find(|item| &item.tag == tag)
    }

    /// Response code of the first result for `tag`
    pub fn code(&self, tag: &T) -> Option<ResponseCode> {
        self.get(tag).map(|item| item.code)
    }

    /// Value of the first result for `tag`
    pub fn value(&self, tag: &T) -> Option<&Value> {
        self.get(tag).and_then(|item| item.value.as_ref())
    }

    /// Whether every tag was served
    pub fn all_ok(&self) -> bool {
        self.items.iter().all(|item| item.code.is_ok())
    }
}

/// Per-operation options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Deadline of each wire exchange; the connection default when unset
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options with the connection defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
