/*!
 * Bit-granular write cursors.
 *
 * [`WriteBuffer`] is the contract message serializers write through.
 * [`ByteWriteBuffer`] produces wire bytes; the JSON renderer in
 * [`crate::json_buffer`] produces a diagnostic document from the same
 * serializer. Scoped byte order overrides and contexts are available as
 * [`with_byte_order`] and [`in_context`].
 */
use crate::byte_order::ByteOrder;
use crate::context::ContextStack;
use crate::error::{CodecError, Result};

/// Destination a message serializes itself into
pub trait WriteBuffer {
    /// Bits written so far
    fn position(&self) -> usize;

    /// Byte order in force
    fn byte_order(&self) -> ByteOrder;

    /// Replace the byte order in force
    fn set_byte_order(&mut self, order: ByteOrder);

    /// Enter a diagnostic context
    fn push_context(&mut self, label: &str);

    /// Leave the innermost diagnostic context
    fn pop_context(&mut self, label: &str) -> Result<()>;

    /// Write an unsigned field of `bits` bits (1..=64) in the byte order in force
    fn write_unsigned(&mut self, bits: u8, value: u64, name: &str) -> Result<()>;

    /// Write a two's-complement field of `bits` bits (1..=64) in the byte order in force
    fn write_signed(&mut self, bits: u8, value: i64, name: &str) -> Result<()>;

    /// Write a single bit
    fn write_bit(&mut self, value: bool, name: &str) -> Result<()>;

    /// Write an IEEE 754 single precision value
    fn write_f32(&mut self, value: f32, name: &str) -> Result<()>;

    /// Write an IEEE 754 double precision value
    fn write_f64(&mut self, value: f64, name: &str) -> Result<()>;

    /// Write whole bytes verbatim
    fn write_bytes(&mut self, bytes: &[u8], name: &str) -> Result<()>;

    /// Write a UTF-8 string into `bits` bits, NUL padded
    fn write_string(&mut self, bits: usize, value: &str, name: &str) -> Result<()>;

    /// Write an unsigned 8 bit value
    fn write_u8(&mut self, value: u8, name: &str) -> Result<()> {
        self.write_unsigned(8, u64::from(value), name)
    }

    /// Write an unsigned 16 bit value
    fn write_u16(&mut self, value: u16, name: &str) -> Result<()> {
        self.write_unsigned(16, u64::from(value), name)
    }

    /// Write an unsigned 32 bit value
    fn write_u32(&mut self, value: u32, name: &str) -> Result<()> {
        self.write_unsigned(32, u64::from(value), name)
    }

    /// Write an unsigned 64 bit value
    fn write_u64(&mut self, value: u64, name: &str) -> Result<()> {
        self.write_unsigned(64, value, name)
    }

    /// Write a signed 8 bit value
    fn write_i8(&mut self, value: i8, name: &str) -> Result<()> {
        self.write_signed(8, i64::from(value), name)
    }

    /// Write a signed 16 bit value
    fn write_i16(&mut self, value: i16, name: &str) -> Result<()> {
        self.write_signed(16, i64::from(value), name)
    }

    /// Write a signed 32 bit value
    fn write_i32(&mut self, value: i32, name: &str) -> Result<()> {
        self.write_signed(32, i64::from(value), name)
    }

    /// Write a signed 64 bit value
    fn write_i64(&mut self, value: i64, name: &str) -> Result<()> {
        self.write_signed(64, value, name)
    }
}

/// Run `f` inside a context that is popped even when `f` fails
pub fn in_context<T>(
    writer: &mut dyn WriteBuffer,
    label: &str,
    f: impl FnOnce(&mut dyn WriteBuffer) -> Result<T>,
) -> Result<T> {
    writer.push_context(label);
    let result = f(writer);
    let popped = writer.pop_context(label);
    let value = result?;
    popped?;
    Ok(value)
}

/// Run `f` with `order` in force, restoring the previous order afterwards
pub fn with_byte_order<T>(
    writer: &mut dyn WriteBuffer,
    order: ByteOrder,
    f: impl FnOnce(&mut dyn WriteBuffer) -> Result<T>,
) -> Result<T> {
    let previous = writer.byte_order();
    writer.set_byte_order(order);
    let result = f(writer);
    writer.set_byte_order(previous);
    result
}

/// Check that a serializer wrote exactly the bits it declared
pub fn check_length(context: &str, declared: usize, written: usize) -> Result<()> {
    if declared != written {
        return Err(CodecError::LengthMismatch {
            context: context.to_string(),
            declared,
            written,
        });
    }
    Ok(())
}

pub(crate) fn check_width(bits: u8, kind: &'static str) -> Result<()> {
    if bits == 0 || bits > 64 {
        return Err(CodecError::InvalidBitLength {
            bits: usize::from(bits),
            kind,
        });
    }
    Ok(())
}

pub(crate) fn unsigned_fits(bits: u8, value: u64) -> bool {
    bits >= 64 || value >> bits == 0
}

pub(crate) fn signed_fits(bits: u8, value: i64) -> bool {
    if bits >= 64 {
        return true;
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&value)
}

pub(crate) fn signed_to_raw(bits: u8, value: i64) -> u64 {
    if bits >= 64 {
        return value as u64;
    }
    (value as u64) & ((1u64 << bits) - 1)
}

/// Write cursor producing wire bytes
#[derive(Debug)]
pub struct ByteWriteBuffer {
    data: Vec<u8>,
    position: usize,
    capacity_bits: Option<usize>,
    byte_order: ByteOrder,
    context: ContextStack,
}

impl ByteWriteBuffer {
    /// Create a buffer that grows as needed
    pub fn growable() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
            capacity_bits: None,
            byte_order: ByteOrder::BigEndian,
            context: ContextStack::new(),
        }
    }

    /// Create a buffer holding at most `bytes` bytes
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            position: 0,
            capacity_bits: Some(bytes * 8),
            byte_order: ByteOrder::BigEndian,
            context: ContextStack::new(),
        }
    }

    /// Use a different default byte order
    pub fn byte_order_default(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Bytes written so far; a partially written last byte is zero filled
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning the bytes written
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Slash-separated path of the open contexts
    pub fn context_path(&self) -> String {
        self.context.path()
    }

    fn reserve_bits(&mut self, bits: usize) -> Result<()> {
        if let Some(capacity) = self.capacity_bits {
            if self.position + bits > capacity {
                return Err(CodecError::BufferFull {
                    context: self.context.path(),
                    position: self.position,
                    requested: bits,
                    capacity,
                });
            }
        }
        let needed = (self.position + bits + 7) / 8;
        if needed > self.data.len() {
            self.data.resize(needed, 0);
        }
        Ok(())
    }

    fn put_bits(&mut self, bits: u8, value: u64) -> Result<()> {
        self.reserve_bits(usize::from(bits))?;
        if self.position % 8 == 0 && bits % 8 == 0 {
            let start = self.position / 8;
            let width = usize::from(bits / 8);
            for (i, slot) in self.data[start..start + width].iter_mut().enumerate() {
                *slot = (value >> (8 * (width - 1 - i))) as u8;
            }
            self.position += usize::from(bits);
            return Ok(());
        }
        for shift in (0..bits).rev() {
            let mask = 0x80u8 >> (self.position % 8);
            let byte = &mut self.data[self.position / 8];
            if (value >> shift) & 1 == 1 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
            self.position += 1;
        }
        Ok(())
    }
}

impl Default for ByteWriteBuffer {
    fn default() -> Self {
        Self::growable()
    }
}

impl WriteBuffer for ByteWriteBuffer {
    fn position(&self) -> usize {
        self.position
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn set_byte_order(&mut self, order: ByteOrder) {
        self.byte_order = order;
    }

    fn push_context(&mut self, label: &str) {
        self.context.push(label);
    }

    fn pop_context(&mut self, label: &str) -> Result<()> {
        self.context.pop(label)
    }

    fn write_unsigned(&mut self, bits: u8, value: u64, name: &str) -> Result<()> {
        check_width(bits, "unsigned")?;
        if !unsigned_fits(bits, value) {
            return Err(CodecError::invalid_value(
                self.context.path_with(name),
                format!("{} does not fit in {} bits", value, bits),
            ));
        }
        let arranged = self.byte_order.arrange(usize::from(bits), value);
        self.put_bits(bits, arranged)
    }

    fn write_signed(&mut self, bits: u8, value: i64, name: &str) -> Result<()> {
        check_width(bits, "signed")?;
        if !signed_fits(bits, value) {
            return Err(CodecError::invalid_value(
                self.context.path_with(name),
                format!("{} does not fit in {} signed bits", value, bits),
            ));
        }
        let raw = signed_to_raw(bits, value);
        let arranged = self.byte_order.arrange(usize::from(bits), raw);
        self.put_bits(bits, arranged)
    }

    fn write_bit(&mut self, value: bool, _name: &str) -> Result<()> {
        self.put_bits(1, u64::from(value))
    }

    fn write_f32(&mut self, value: f32, name: &str) -> Result<()> {
        self.write_unsigned(32, u64::from(value.to_bits()), name)
    }

    fn write_f64(&mut self, value: f64, name: &str) -> Result<()> {
        self.write_unsigned(64, value.to_bits(), name)
    }

    fn write_bytes(&mut self, bytes: &[u8], _name: &str) -> Result<()> {
        self.reserve_bits(bytes.len() * 8)?;
        for byte in bytes {
            self.put_bits(8, u64::from(*byte))?;
        }
        Ok(())
    }

    fn write_string(&mut self, bits: usize, value: &str, name: &str) -> Result<()> {
        if bits % 8 != 0 {
            return Err(CodecError::InvalidBitLength {
                bits,
                kind: "string",
            });
        }
        let width = bits / 8;
        if value.len() > width {
            return Err(CodecError::invalid_value(
                self.context.path_with(name),
                format!("string of {} bytes does not fit in {} bytes", value.len(), width),
            ));
        }
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(width, 0);
        self.write_bytes(&bytes, name)
    }
}
