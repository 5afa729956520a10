/*!
 * Tag-set optimizers.
 *
 * An [`Optimizer`] decides how a logical multi-tag operation becomes wire
 * exchanges ([`Optimizer::plan`]) and how their outcomes recombine into one
 * response per requested tag ([`Optimizer::merge`]). Planning is pure; it
 * performs no I/O.
 *
 * Strategies shipped here:
 *
 * - [`SingleRequestOptimizer`]: the whole tag set in one exchange.
 * - [`PerTagOptimizer`]: one exchange per tag.
 * - [`GroupingOptimizer`]: tags grouped by a key (device, memory area) with a
 *   cap on tags per exchange.
 */
use std::fmt;

use tracing::{debug, warn};
use wireflow_core::types::ResponseCode;

use crate::request::{LogicalResponse, Operation, SubOutcome, SubRequest, Tag, TagItem, TagResponse};

/// How the sub-requests of one logical operation are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// All at once; the device can serve overlapping requests
    Concurrent,
    /// One after another; the device or bus serves one request at a time
    Sequential,
}

/// Strategy shaping a logical operation into wire exchanges
pub trait Optimizer<T: Tag>: Send + Sync {
    /// Split `items` into sub-requests
    ///
    /// Every item must end up in exactly one sub-request.
    fn plan(&self, operation: Operation, items: Vec<TagItem<T>>) -> Vec<SubRequest<T>>;

    /// How the planned sub-requests are issued
    fn dispatch(&self) -> Dispatch {
        Dispatch::Concurrent
    }

    /// Combine sub-request outcomes into one result per tag in `tags`, in order
    ///
    /// A failed sub-request yields its failure code for each of its tags. A
    /// tag no outcome accounts for is reported as `InternalError`.
    fn merge(&self, tags: &[T], outcomes: Vec<(SubRequest<T>, SubOutcome<T>)>) -> LogicalResponse<T> {
        merge_in_request_order(tags, outcomes)
    }
}

/// Default merge shared by the shipped strategies
pub fn merge_in_request_order<T: Tag>(
    tags: &[T],
    outcomes: Vec<(SubRequest<T>, SubOutcome<T>)>,
) -> LogicalResponse<T> {
    let mut slots: Vec<Option<TagResponse<T>>> = vec![None; tags.len()];

    for (sub, outcome) in outcomes {
        match outcome {
            Ok(responses) => {
                if responses.len() != sub.items.len() {
                    warn!(
                        "Sub-request of {} tags produced {} results",
                        sub.items.len(),
                        responses.len()
                    );
                }
                let mut responses = responses.into_iter();
                for item in sub.items {
                    let response = match responses.next() {
                        Some(response) => TagResponse {
                            tag: item.tag,
                            ..response
                        },
                        None => TagResponse::failed(item.tag, ResponseCode::InternalError),
                    };
                    place(&mut slots, item.index, response);
                }
            }
            Err(code) => {
                debug!("Sub-request of {} tags failed: {}", sub.items.len(), code);
                for item in sub.items {
                    place(&mut slots, item.index, TagResponse::failed(item.tag, code));
                }
            }
        }
    }

    let items = slots
        .into_iter()
        .zip(tags)
        .map(|(slot, tag)| {
            slot.unwrap_or_else(|| TagResponse::failed(tag.clone(), ResponseCode::InternalError))
        })
        .collect();
    LogicalResponse::new(items)
}

fn place<T: Tag>(slots: &mut [Option<TagResponse<T>>], index: usize, response: TagResponse<T>) {
    match slots.get_mut(index) {
        Some(slot) => *slot = Some(response),
        None => warn!("Dropping result for {} at unknown position {}", response.tag, index),
    }
}

/// Sends the whole tag set as one exchange
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRequestOptimizer;

impl<T: Tag> Optimizer<T> for SingleRequestOptimizer {
    fn plan(&self, _operation: Operation, items: Vec<TagItem<T>>) -> Vec<SubRequest<T>> {
        if items.is_empty() {
            return Vec::new();
        }
        vec![SubRequest::new(items)]
    }
}

/// One exchange per tag
#[derive(Debug, Clone, Copy)]
pub struct PerTagOptimizer {
    dispatch: Dispatch,
}

impl PerTagOptimizer {
    /// Issue the per-tag exchanges concurrently
    pub fn concurrent() -> Self {
        Self {
            dispatch: Dispatch::Concurrent,
        }
    }

    /// Issue the per-tag exchanges one after another
    pub fn sequential() -> Self {
        Self {
            dispatch: Dispatch::Sequential,
        }
    }
}

impl Default for PerTagOptimizer {
    fn default() -> Self {
        Self::concurrent()
    }
}

impl<T: Tag> Optimizer<T> for PerTagOptimizer {
    fn plan(&self, _operation: Operation, items: Vec<TagItem<T>>) -> Vec<SubRequest<T>> {
        items.into_iter().map(|item| SubRequest::new(vec![item])).collect()
    }

    fn dispatch(&self) -> Dispatch {
        self.dispatch
    }
}

/// Groups tags sharing a key, at most `max_items` per exchange
///
/// Groups appear in the order their first tag was requested; tags keep their
/// request order within a group.
pub struct GroupingOptimizer<T, K> {
    key: fn(&T) -> K,
    max_items: usize,
    dispatch: Dispatch,
}

impl<T, K> fmt::Debug for GroupingOptimizer<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupingOptimizer")
            .field("max_items", &self.max_items)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl<T, K> GroupingOptimizer<T, K> {
    /// Group by `key` with at most `max_items` tags per exchange
    pub fn new(key: fn(&T) -> K, max_items: usize) -> Self {
        Self {
            key,
            max_items: max_items.max(1),
            dispatch: Dispatch::Concurrent,
        }
    }

    /// Issue the groups one after another
    pub fn sequential(mut self) -> Self {
        self.dispatch = Dispatch::Sequential;
        self
    }
}

impl<T, K> Optimizer<T> for GroupingOptimizer<T, K>
where
    T: Tag,
    K: PartialEq + Send + Sync,
{
    fn plan(&self, _operation: Operation, items: Vec<TagItem<T>>) -> Vec<SubRequest<T>> {
        let mut groups: Vec<(K, Vec<TagItem<T>>)> = Vec::new();
        for item in items {
            let key = (self.key)(&item.tag);
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(item),
                None => groups.push((key, vec![item])),
            }
        }

        let mut plan = Vec::new();
        for (_, members) in groups {
            let mut members = members.into_iter().peekable();
            while members.peek().is_some() {
                plan.push(SubRequest::new(members.by_ref().take(self.max_items).collect()));
            }
        }
        plan
    }

    fn dispatch(&self) -> Dispatch {
        self.dispatch
    }
}
