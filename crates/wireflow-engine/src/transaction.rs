/*!
 * Correlation id generation.
 */
use std::sync::atomic::{AtomicU16, Ordering};

/// Wrapping 16 bit transaction id generator that never hands out 0
#[derive(Debug, Default)]
pub struct TransactionIds {
    last: AtomicU16,
}

impl TransactionIds {
    /// Create a generator whose first id is 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, safe to call from many tasks
    pub fn next_id(&self) -> u16 {
        loop {
            let current = self.last.load(Ordering::Relaxed);
            let mut next = current.wrapping_add(1);
            if next == 0 {
                next = 1;
            }
            if self
                .last
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return next;
            }
        }
    }
}
