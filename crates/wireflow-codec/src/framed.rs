/*!
 * Stream framing.
 *
 * [`FrameCodec`] adapts a protocol's [`FrameDetector`] and [`MessageCatalog`]
 * to `tokio_util::codec`, turning an unbounded and possibly corrupted byte
 * stream into decoded messages.
 *
 * The decoder starts unsynchronized and asks the protocol to resynchronize
 * before the first frame, after every frame that failed to decode and after
 * any implausible length estimate. A frame that fails to decode is handed on
 * as [`Decoded::Rejected`] rather than ending the stream; only transport
 * failures and too many consecutive failures do that.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};
use wireflow_core::config::FramingSettings;

use crate::error::{CodecError, FramingError};
use crate::frame::{FrameDetector, FrameLength, MessageCatalog};

/// Limits applied by the frame decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingConfig {
    /// Largest frame accepted before the stream is treated as corrupted
    pub max_frame_length: usize,
    /// Consecutive failures tolerated before the stream is abandoned; 0 disables the limit
    pub max_consecutive_failures: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self::from(&FramingSettings::default())
    }
}

impl From<&FramingSettings> for FramingConfig {
    fn from(settings: &FramingSettings) -> Self {
        Self {
            max_frame_length: settings.max_frame_length,
            max_consecutive_failures: settings.max_consecutive_failures,
        }
    }
}

/// One item produced by the decoder
#[derive(Debug)]
pub enum Decoded<M> {
    /// A frame decoded into a message
    Message(M),
    /// A frame whose boundaries were found but whose content did not decode
    Rejected {
        /// Why decoding failed
        error: CodecError,
        /// The discarded frame
        frame: Bytes,
    },
}

/// Counters shared between a decoder and its observers
#[derive(Debug, Default)]
pub struct FramingStats {
    frames_decoded: AtomicU64,
    frames_rejected: AtomicU64,
    resync_events: AtomicU64,
    bytes_discarded: AtomicU64,
}

/// Point-in-time copy of [`FramingStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingStatsSnapshot {
    /// Frames decoded into messages
    pub frames_decoded: u64,
    /// Frames that failed to decode
    pub frames_rejected: u64,
    /// Resynchronization steps that dropped at least one byte
    pub resync_events: u64,
    /// Bytes dropped while resynchronizing or at end of stream
    pub bytes_discarded: u64,
}

impl FramingStats {
    /// Copy the current counter values
    pub fn snapshot(&self) -> FramingStatsSnapshot {
        FramingStatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            resync_events: self.resync_events.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Frame decoder and raw frame encoder for one connection
#[derive(Debug)]
pub struct FrameCodec<P> {
    protocol: Arc<P>,
    config: FramingConfig,
    synchronized: bool,
    consecutive_failures: usize,
    stats: Arc<FramingStats>,
}

impl<P> FrameCodec<P>
where
    P: FrameDetector + MessageCatalog,
{
    /// Create an unsynchronized codec
    pub fn new(protocol: Arc<P>, config: FramingConfig) -> Self {
        Self {
            protocol,
            config,
            synchronized: false,
            consecutive_failures: 0,
            stats: Arc::new(FramingStats::default()),
        }
    }

    /// Counters of this codec
    pub fn stats(&self) -> Arc<FramingStats> {
        self.stats.clone()
    }

    /// Whether the decoder currently trusts the front of its buffer
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    fn record_failure(&mut self) -> Result<(), FramingError> {
        self.consecutive_failures += 1;
        let limit = self.config.max_consecutive_failures;
        if limit > 0 && self.consecutive_failures > limit {
            warn!(
                "{}: {} consecutive framing failures, abandoning stream",
                self.protocol.protocol_name(),
                self.consecutive_failures
            );
            return Err(FramingError::ResyncLimitExceeded {
                failures: self.consecutive_failures,
            });
        }
        Ok(())
    }

    /// Drop bytes until the buffer looks like a frame start
    ///
    /// With `skip_current` the byte at the front is dropped first, because
    /// the protocol already accepted it as a start and it proved wrong.
    fn resynchronize(&mut self, src: &mut BytesMut, skip_current: bool) -> Result<(), FramingError> {
        let mut discarded = 0;
        if skip_current && !src.is_empty() {
            src.advance(1);
            discarded += 1;
        }
        discarded += self.protocol.recover_from_corruption(src);
        self.synchronized = !src.is_empty();

        if discarded > 0 {
            self.stats.resync_events.fetch_add(1, Ordering::Relaxed);
            self.stats
                .bytes_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!(
                "{}: resynchronized after discarding {} bytes",
                self.protocol.protocol_name(),
                discarded
            );
            self.record_failure()?;
        }
        Ok(())
    }
}

impl<P> Decoder for FrameCodec<P>
where
    P: FrameDetector + MessageCatalog,
{
    type Item = Decoded<P::Message>;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if !self.synchronized {
                self.resynchronize(src, false)?;
            }
            if src.is_empty() {
                return Ok(None);
            }

            let length = match self.protocol.estimate_length(src) {
                FrameLength::Insufficient => {
                    if src.len() > self.config.max_frame_length {
                        debug!("No frame boundary within {} bytes", self.config.max_frame_length);
                        self.resynchronize(src, true)?;
                        continue;
                    }
                    return Ok(None);
                }
                FrameLength::Complete(length) => length,
            };

            if length == 0 || length > self.config.max_frame_length {
                debug!("Implausible frame length {}", length);
                self.resynchronize(src, true)?;
                continue;
            }

            if src.len() < length {
                src.reserve(length - src.len());
                return Ok(None);
            }

            let frame = src.split_to(length).freeze();
            match self.protocol.decode(&frame) {
                Ok(message) => {
                    trace!("{}: decoded {} byte frame", self.protocol.protocol_name(), length);
                    self.consecutive_failures = 0;
                    self.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(Decoded::Message(message)));
                }
                Err(error) => {
                    warn!(
                        "{}: discarding {} byte frame: {}",
                        self.protocol.protocol_name(),
                        length,
                        error
                    );
                    self.synchronized = false;
                    self.stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
                    self.record_failure()?;
                    return Ok(Some(Decoded::Rejected { error, frame }));
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        if !buf.is_empty() {
            debug!(
                "{}: discarding {} bytes of an incomplete frame at end of stream",
                self.protocol.protocol_name(),
                buf.len()
            );
            self.stats
                .bytes_discarded
                .fetch_add(buf.len() as u64, Ordering::Relaxed);
            buf.clear();
        }
        Ok(None)
    }
}

impl<P> Encoder<Bytes> for FrameCodec<P>
where
    P: FrameDetector + MessageCatalog,
{
    type Error = FramingError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
