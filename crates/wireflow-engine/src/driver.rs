/*!
 * Protocol driver contract.
 *
 * A driver ties a protocol's message catalog and frame detector to the
 * caller API: it says how a sub-request becomes a wire message, how a
 * response is recognised and decoded into per-tag results, and which tag
 * values an unsolicited message carries.
 */
use async_trait::async_trait;
use wireflow_codec::{FrameDetector, MessageCatalog};
use wireflow_core::types::{ResponseCode, Value};

use crate::conversation::Conversation;
use crate::error::Result;
use crate::optimizer::Optimizer;
use crate::pending::Matcher;
use crate::request::{Operation, SubRequest, Tag, TagResponse};

/// A message to send and the predicate recognising its response
pub struct WireRequest<M> {
    /// Outbound message
    pub message: M,
    /// Accepts the response to `message`
    pub matcher: Matcher<M>,
}

impl<M> WireRequest<M> {
    /// Pair a message with its response predicate
    pub fn new<F>(message: M, matcher: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        Self {
            message,
            matcher: Box::new(matcher),
        }
    }
}

/// Protocol-specific behaviour behind a [`crate::Connection`]
#[async_trait]
pub trait ProtocolDriver: FrameDetector + MessageCatalog + Sized + 'static {
    /// Address type of the protocol
    type Tag: Tag;

    /// Strategy shaping logical operations into wire exchanges
    fn optimizer(&self) -> &dyn Optimizer<Self::Tag>;

    /// Exchange run once after the transport is connected, before the
    /// connection is handed to callers
    async fn on_connect(&self, _conversation: &Conversation<Self>) -> Result<()> {
        Ok(())
    }

    /// Build the wire request serving `request`
    ///
    /// `Ok(None)` means nothing needs to be sent and every tag succeeds; an
    /// error code fails every tag of the sub-request.
    fn encode_request(
        &self,
        operation: Operation,
        request: &SubRequest<Self::Tag>,
    ) -> std::result::Result<Option<WireRequest<Self::Message>>, ResponseCode>;

    /// Turn the response to `request` into one result per item, in item order
    fn decode_response(
        &self,
        operation: Operation,
        request: &SubRequest<Self::Tag>,
        response: Self::Message,
    ) -> Vec<TagResponse<Self::Tag>>;

    /// Tag values carried by a message no request was waiting for
    fn decode_event(&self, _message: &Self::Message) -> Vec<(Self::Tag, Value)> {
        Vec::new()
    }
}
