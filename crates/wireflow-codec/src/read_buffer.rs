/*!
 * Bit-granular read cursor.
 *
 * A [`ReadBuffer`] is owned by exactly one parse call. It tracks the bit
 * position, the byte order in force and the context labels used to name
 * failures. Byte order overrides and contexts are scoped through
 * [`ReadBuffer::with_byte_order`] and [`ReadBuffer::in_context`], which
 * restore the previous state whether or not the enclosed parse succeeds.
 */
use tracing::warn;

use crate::byte_order::ByteOrder;
use crate::context::ContextStack;
use crate::error::{CodecError, Result};

/// Read cursor over a borrowed byte slice
#[derive(Debug)]
pub struct ReadBuffer<'a> {
    data: &'a [u8],
    position: usize,
    byte_order: ByteOrder,
    context: ContextStack,
    warnings: Vec<CodecError>,
}

impl<'a> ReadBuffer<'a> {
    /// Create a big-endian cursor at bit 0
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_order(data, ByteOrder::BigEndian)
    }

    /// Create a cursor at bit 0 with a default byte order
    pub fn with_order(data: &'a [u8], byte_order: ByteOrder) -> Self {
        Self {
            data,
            position: 0,
            byte_order,
            context: ContextStack::new(),
            warnings: Vec::new(),
        }
    }

    /// Current position in bits
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current position in whole bytes, rounded down
    pub fn byte_position(&self) -> usize {
        self.position / 8
    }

    /// Length of the underlying buffer in bits
    pub fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    /// Bits left to read
    pub fn remaining_bits(&self) -> usize {
        self.total_bits().saturating_sub(self.position)
    }

    /// Whether at least `bits` more bits can be read
    pub fn has_more(&self, bits: usize) -> bool {
        self.remaining_bits() >= bits
    }

    /// Whether the cursor sits on a byte boundary
    pub fn is_aligned(&self) -> bool {
        self.position % 8 == 0
    }

    /// Move the cursor to an absolute bit position
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.total_bits() {
            return Err(self.out_of_data(position.saturating_sub(self.position)));
        }
        self.position = position;
        Ok(())
    }

    /// Byte order in force
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Run `f` with `order` in force, restoring the previous order afterwards
    pub fn with_byte_order<T>(
        &mut self,
        order: ByteOrder,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let previous = std::mem::replace(&mut self.byte_order, order);
        let result = f(self);
        self.byte_order = previous;
        result
    }

    /// Enter a diagnostic context
    pub fn push_context(&mut self, label: &str) {
        self.context.push(label);
    }

    /// Leave the innermost diagnostic context
    pub fn pop_context(&mut self, label: &str) -> Result<()> {
        self.context.pop(label)
    }

    /// Run `f` inside a context that is popped even when `f` fails
    pub fn in_context<T>(&mut self, label: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.context.push(label);
        let result = f(self);
        let popped = self.context.pop(label);
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Slash-separated path of the open contexts
    pub fn context_path(&self) -> String {
        self.context.path()
    }

    /// Path of a field nested in the innermost context
    pub fn field_path(&self, field: &str) -> String {
        self.context.path_with(field)
    }

    /// Number of open contexts
    pub fn context_depth(&self) -> usize {
        self.context.depth()
    }

    /// Record a soft failure that does not abort the parse
    pub fn warn(&mut self, warning: CodecError) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Soft failures recorded so far
    pub fn warnings(&self) -> &[CodecError] {
        &self.warnings
    }

    /// Take the soft failures recorded so far
    pub fn take_warnings(&mut self) -> Vec<CodecError> {
        std::mem::take(&mut self.warnings)
    }

    pub(crate) fn out_of_data(&self, requested: usize) -> CodecError {
        CodecError::OutOfData {
            context: self.context.path(),
            position: self.position,
            requested,
            remaining: self.remaining_bits(),
        }
    }

    fn check_width(bits: u8, kind: &'static str) -> Result<()> {
        if bits == 0 || bits > 64 {
            return Err(CodecError::InvalidBitLength {
                bits: usize::from(bits),
                kind,
            });
        }
        Ok(())
    }

    fn raw_bits(&self, position: usize, bits: u8) -> u64 {
        let bits = usize::from(bits);
        if position % 8 == 0 && bits % 8 == 0 {
            let start = position / 8;
            return self.data[start..start + bits / 8]
                .iter()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        }
        (position..position + bits).fold(0u64, |acc, index| {
            let bit = (self.data[index / 8] >> (7 - index % 8)) & 1;
            (acc << 1) | u64::from(bit)
        })
    }

    /// Look at the next `bits` bits (1..=64, most significant first) without moving
    pub fn peek_bits(&self, bits: u8) -> Result<u64> {
        Self::check_width(bits, "peek")?;
        if !self.has_more(usize::from(bits)) {
            return Err(self.out_of_data(usize::from(bits)));
        }
        Ok(self.raw_bits(self.position, bits))
    }

    /// Read `bits` bits (1..=64) most significant first, ignoring byte order
    pub fn read_bits(&mut self, bits: u8) -> Result<u64> {
        let value = self.peek_bits(bits)?;
        self.position += usize::from(bits);
        Ok(value)
    }

    /// Skip `bits` bits
    pub fn skip_bits(&mut self, bits: usize) -> Result<()> {
        if !self.has_more(bits) {
            return Err(self.out_of_data(bits));
        }
        self.position += bits;
        Ok(())
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read an unsigned field of `bits` bits in the byte order in force
    pub fn read_unsigned(&mut self, bits: u8) -> Result<u64> {
        Self::check_width(bits, "unsigned")?;
        let raw = self.read_bits(bits)?;
        Ok(self.byte_order.arrange(usize::from(bits), raw))
    }

    /// Read a two's-complement field of `bits` bits in the byte order in force
    pub fn read_signed(&mut self, bits: u8) -> Result<i64> {
        let raw = self.read_unsigned(bits)?;
        let shift = 64 - u32::from(bits);
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Read an unsigned 8 bit value
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_unsigned(8)? as u8)
    }

    /// Read an unsigned 16 bit value
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_unsigned(16)? as u16)
    }

    /// Read an unsigned 32 bit value
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.read_unsigned(32)? as u32)
    }

    /// Read an unsigned 64 bit value
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_unsigned(64)
    }

    /// Read a signed 8 bit value
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_signed(8)? as i8)
    }

    /// Read a signed 16 bit value
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_signed(16)? as i16)
    }

    /// Read a signed 32 bit value
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_signed(32)? as i32)
    }

    /// Read a signed 64 bit value
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_signed(64)
    }

    /// Read an IEEE 754 single precision value
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read an IEEE 754 double precision value
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read `count` whole bytes, which need not be aligned
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        if !self.has_more(count * 8) {
            return Err(self.out_of_data(count * 8));
        }
        if self.is_aligned() {
            let start = self.byte_position();
            self.position += count * 8;
            return Ok(self.data[start..start + count].to_vec());
        }
        (0..count).map(|_| Ok(self.read_bits(8)? as u8)).collect()
    }

    /// Read a UTF-8 string occupying `bits` bits; trailing NUL padding is dropped
    pub fn read_string(&mut self, bits: usize) -> Result<String> {
        if bits % 8 != 0 {
            return Err(CodecError::InvalidBitLength {
                bits,
                kind: "string",
            });
        }
        let mut bytes = self.read_bytes(bits / 8)?;
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8(bytes)
            .map_err(|e| CodecError::invalid_value(self.context.path(), e.to_string()))
    }

    /// Borrow the aligned bytes between two bit positions
    pub fn slice_bytes(&self, start_bit: usize, end_bit: usize) -> Result<&'a [u8]> {
        if start_bit % 8 != 0 || end_bit % 8 != 0 || start_bit > end_bit {
            return Err(CodecError::invalid_value(
                self.context.path(),
                format!("range {}..{} is not byte aligned", start_bit, end_bit),
            ));
        }
        let data: &'a [u8] = self.data;
        data.get(start_bit / 8..end_bit / 8)
            .ok_or_else(|| self.out_of_data(end_bit.saturating_sub(self.position)))
    }
}
