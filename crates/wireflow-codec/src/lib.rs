/*!
 * Wireflow Codec
 *
 * Bit-level building blocks protocol message catalogs are written against:
 *
 * - [`read_buffer::ReadBuffer`] and [`write_buffer::WriteBuffer`], cursors
 *   over a byte buffer with bit granularity, a configurable byte order and a
 *   diagnostic context stack.
 * - [`message::Message`] and [`message::Parse`], the contract every message
 *   type fulfils, with the field shape helpers in [`field`] and discriminated
 *   unions in [`switch`].
 * - [`frame::FrameDetector`] and [`framed::FrameCodec`], which turn a raw
 *   byte stream into complete frames and resynchronize after corruption.
 */

#![warn(missing_docs)]

pub mod byte_order;
pub mod checksum;
pub mod context;
pub mod error;
pub mod field;
pub mod frame;
pub mod framed;
pub mod json_buffer;
pub mod message;
pub mod read_buffer;
pub mod switch;
pub mod write_buffer;

pub use byte_order::ByteOrder;
pub use checksum::{Checksum, Crc16Modbus, Sum8, Xor8};
pub use error::{CodecError, FramingError, Result};
pub use frame::{FrameDetector, FrameLength, MessageCatalog};
pub use framed::{Decoded, FrameCodec, FramingConfig, FramingStats, FramingStatsSnapshot};
pub use json_buffer::JsonWriteBuffer;
pub use message::{Message, Parse};
pub use read_buffer::ReadBuffer;
pub use switch::{SwitchCase, SwitchTable};
pub use write_buffer::{ByteWriteBuffer, WriteBuffer};

/// Wireflow codec crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
