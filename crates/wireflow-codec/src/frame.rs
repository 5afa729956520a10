/*!
 * Frame boundary detection.
 *
 * A protocol supplies two functions: [`FrameDetector::estimate_length`],
 * which tells from a stream prefix how long the next frame is, and
 * [`FrameDetector::recover_from_corruption`], which drops bytes until the
 * buffer starts with something that looks like a frame. Both are pure apart
 * from the buffer they are given.
 */
use bytes::{Buf, BytesMut};

use crate::error::Result;
use crate::message::Message;

/// Outcome of a length estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// More bytes are needed to tell
    Insufficient,
    /// The next frame spans this many bytes from the start of the prefix
    Complete(usize),
}

/// Protocol-specific frame boundary functions
///
/// `estimate_length` must be monotonic: once it returns `Complete(n)` for a
/// prefix it returns `Complete(n)` for every longer prefix with the same
/// start.
pub trait FrameDetector: Send + Sync {
    /// Estimate the total length of the frame starting at `prefix[0]`
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength;

    /// Discard bytes from the front of `buffer` until it looks like a frame
    /// start or is empty; returns the number of bytes discarded
    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize;
}

/// Decodes complete frames into the messages of one protocol
pub trait MessageCatalog: Send + Sync {
    /// Closed set of messages the protocol exchanges
    type Message: Message + Send + 'static;

    /// Protocol name used in logs
    fn protocol_name(&self) -> &'static str;

    /// Decode one complete frame
    fn decode(&self, frame: &[u8]) -> Result<Self::Message>;

    /// Encode one message into a frame
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>> {
        message.to_bytes()
    }
}

/// Drop bytes from the front of `buffer` until `is_start` accepts the rest
///
/// `is_start` sees the remaining bytes and should accept a prefix that is too
/// short to judge. Returns the number of bytes dropped.
pub fn discard_until(buffer: &mut BytesMut, mut is_start: impl FnMut(&[u8]) -> bool) -> usize {
    let mut skip = 0;
    while skip < buffer.len() && !is_start(&buffer[skip..]) {
        skip += 1;
    }
    buffer.advance(skip);
    skip
}
