/*!
 * Message contract.
 *
 * Every message of a protocol catalog implements [`Message`] (length and
 * serialization) and [`Parse`] (construction from a read cursor).
 * `length_in_bits` must agree exactly with what `serialize` writes;
 * [`Message::to_bytes`] enforces that agreement on every encode.
 */
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::json_buffer::JsonWriteBuffer;
use crate::read_buffer::ReadBuffer;
use crate::write_buffer::{check_length, ByteWriteBuffer, WriteBuffer};

/// A value that can report its encoded length and serialize itself
pub trait Message: fmt::Debug {
    /// Name used as the outermost diagnostic context
    fn type_name(&self) -> &'static str;

    /// Encoded length in bits
    fn length_in_bits(&self) -> usize;

    /// Encoded length in whole bytes
    fn length_in_bytes(&self) -> usize {
        (self.length_in_bits() + 7) / 8
    }

    /// Write the message through a cursor
    fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()>;

    /// Encode into a buffer sized from `length_in_bits`
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let declared = self.length_in_bits();
        let mut writer = ByteWriteBuffer::with_capacity(self.length_in_bytes());
        self.serialize(&mut writer)?;
        check_length(self.type_name(), declared, writer.position())?;
        Ok(writer.into_bytes())
    }

    /// Render the message as a diagnostic JSON document
    fn to_json(&self) -> Result<JsonValue> {
        let mut writer = JsonWriteBuffer::new();
        self.serialize(&mut writer)?;
        Ok(writer.into_json())
    }
}

/// A message that can be parsed from a read cursor
pub trait Parse: Sized {
    /// Values from the enclosing message the parse depends on
    type Args;

    /// Parse one message starting at the cursor position
    fn parse(reader: &mut ReadBuffer<'_>, args: Self::Args) -> Result<Self>;

    /// Parse one message from the start of `bytes`
    fn from_bytes(bytes: &[u8], args: Self::Args) -> Result<Self> {
        let mut reader = ReadBuffer::new(bytes);
        Self::parse(&mut reader, args)
    }
}
