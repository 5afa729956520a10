/*!
 * Diagnostic context labels for cursors.
 */
use crate::error::{CodecError, Result};

/// Stack of human-readable labels naming the message and field being processed
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    labels: Vec<String>,
}

impl ContextStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a nested context
    pub fn push(&mut self, label: &str) {
        self.labels.push(label.to_string());
    }

    /// Leave the innermost context, which must carry `label`
    pub fn pop(&mut self, label: &str) -> Result<()> {
        match self.labels.last() {
            Some(top) if top == label => {
                self.labels.pop();
                Ok(())
            }
            other => Err(CodecError::UnbalancedContext {
                expected: label.to_string(),
                found: other.cloned(),
            }),
        }
    }

    /// Number of open contexts
    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    /// Slash-separated path of the open contexts
    pub fn path(&self) -> String {
        if self.labels.is_empty() {
            return "<root>".to_string();
        }
        self.labels.join("/")
    }

    /// Path of a field nested in the innermost context
    pub fn path_with(&self, field: &str) -> String {
        if self.labels.is_empty() {
            return field.to_string();
        }
        format!("{}/{}", self.labels.join("/"), field)
    }
}
