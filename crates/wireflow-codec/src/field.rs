/*!
 * Field shapes.
 *
 * Helpers generated or hand-written message code calls for each field shape.
 * Every helper opens a context named after the field, so a failure inside it
 * carries a path such as `Dlt645Frame/data/identifier`.
 *
 * - *Simple*: [`read_simple`] / [`write_simple`] over any [`Field`].
 * - *Implicit*: [`read_implicit`] / [`write_implicit`]; the value is consumed
 *   by the caller to bound later fields and never stored on the message.
 * - *Optional*: [`read_optional`] / [`write_optional`].
 * - *Array*: [`read_array`] with an [`ArrayBound`], [`read_terminated_array`],
 *   [`write_array`].
 * - *Switch*: see [`crate::switch::SwitchTable`].
 * - *Checksum*: [`verify_checksum`] / [`write_checksum`].
 * - *Padding*, *Reserved* and *Const*: [`read_padding`], [`read_reserved`],
 *   [`read_const`] and their writers. Reserved mismatches are recorded as
 *   warnings on the reader; const mismatches fail the parse.
 * - *Virtual*: plain methods on the message; nothing on the wire.
 * - *Manual*: [`ManualCodec`].
 */
use crate::checksum::Checksum;
use crate::error::{CodecError, Result};
use crate::read_buffer::ReadBuffer;
use crate::write_buffer::{check_length, in_context, with_byte_order, WriteBuffer};

/// A fixed-width value that reads and writes itself
pub trait Field: Sized {
    /// Read one value at the cursor
    fn read_field(reader: &mut ReadBuffer<'_>) -> Result<Self>;

    /// Write the value
    fn write_field(&self, writer: &mut dyn WriteBuffer, name: &str) -> Result<()>;

    /// Encoded width in bits
    fn bit_length(&self) -> usize;
}

macro_rules! impl_field {
    ($ty:ty, $bits:expr, $read:ident, $write:ident) => {
        impl Field for $ty {
            fn read_field(reader: &mut ReadBuffer<'_>) -> Result<Self> {
                reader.$read()
            }

            fn write_field(&self, writer: &mut dyn WriteBuffer, name: &str) -> Result<()> {
                writer.$write(*self, name)
            }

            fn bit_length(&self) -> usize {
                $bits
            }
        }
    };
}

impl_field!(u8, 8, read_u8, write_u8);
impl_field!(u16, 16, read_u16, write_u16);
impl_field!(u32, 32, read_u32, write_u32);
impl_field!(u64, 64, read_u64, write_u64);
impl_field!(i8, 8, read_i8, write_i8);
impl_field!(i16, 16, read_i16, write_i16);
impl_field!(i32, 32, read_i32, write_i32);
impl_field!(i64, 64, read_i64, write_i64);
impl_field!(f32, 32, read_f32, write_f32);
impl_field!(f64, 64, read_f64, write_f64);

impl Field for bool {
    fn read_field(reader: &mut ReadBuffer<'_>) -> Result<Self> {
        reader.read_bit()
    }

    fn write_field(&self, writer: &mut dyn WriteBuffer, name: &str) -> Result<()> {
        writer.write_bit(*self, name)
    }

    fn bit_length(&self) -> usize {
        1
    }
}

/// Read a simple field
pub fn read_simple<T: Field>(reader: &mut ReadBuffer<'_>, name: &str) -> Result<T> {
    reader.in_context(name, |r| T::read_field(r))
}

/// Write a simple field
pub fn write_simple<T: Field>(writer: &mut dyn WriteBuffer, name: &str, value: &T) -> Result<()> {
    value.write_field(writer, name)
}

/// Read an implicit field of `bits` bits and hand its value to the caller
pub fn read_implicit(reader: &mut ReadBuffer<'_>, name: &str, bits: u8) -> Result<u64> {
    reader.in_context(name, |r| r.read_unsigned(bits))
}

/// Write an implicit field whose value the caller derived from other fields
pub fn write_implicit(
    writer: &mut dyn WriteBuffer,
    name: &str,
    bits: u8,
    value: u64,
) -> Result<()> {
    writer.write_unsigned(bits, value, name)
}

/// Read a field only when `present` holds
pub fn read_optional<'a, T>(
    reader: &mut ReadBuffer<'a>,
    name: &str,
    present: bool,
    parse: impl FnOnce(&mut ReadBuffer<'a>) -> Result<T>,
) -> Result<Option<T>> {
    if !present {
        return Ok(None);
    }
    reader.in_context(name, parse).map(Some)
}

/// Write a field only when a value is present
pub fn write_optional<T>(
    writer: &mut dyn WriteBuffer,
    name: &str,
    value: Option<&T>,
    serialize: impl FnOnce(&T, &mut dyn WriteBuffer) -> Result<()>,
) -> Result<()> {
    match value {
        Some(value) => in_context(writer, name, |w| serialize(value, w)),
        None => Ok(()),
    }
}

/// Loop bound of an array field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayBound {
    /// Exactly this many items
    Count(usize),
    /// Items until this many bytes have been consumed
    LengthInBytes(usize),
}

/// Read an array bounded by a count or a byte length
pub fn read_array<'a, T>(
    reader: &mut ReadBuffer<'a>,
    name: &str,
    bound: ArrayBound,
    mut item: impl FnMut(&mut ReadBuffer<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    reader.in_context(name, |r| match bound {
        ArrayBound::Count(count) => {
            if !r.has_more(count) {
                // Every item takes at least one bit
                return Err(r.out_of_data(count));
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(item(r)?);
            }
            Ok(items)
        }
        ArrayBound::LengthInBytes(length) => {
            let end = r.position() + length * 8;
            if end > r.total_bits() {
                return Err(r.out_of_data(length * 8));
            }
            let mut items = Vec::new();
            while r.position() < end {
                items.push(item(r)?);
            }
            if r.position() != end {
                return Err(CodecError::invalid_value(
                    r.context_path(),
                    format!("items overran the {} byte array by {} bits", length, r.position() - end),
                ));
            }
            Ok(items)
        }
    })
}

/// Read items until `terminated` reports the end
///
/// `terminated` runs before each item and may consume the terminator.
pub fn read_terminated_array<'a, T>(
    reader: &mut ReadBuffer<'a>,
    name: &str,
    mut terminated: impl FnMut(&mut ReadBuffer<'a>) -> Result<bool>,
    mut item: impl FnMut(&mut ReadBuffer<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    reader.in_context(name, |r| {
        let mut items = Vec::new();
        while !terminated(r)? {
            items.push(item(r)?);
        }
        Ok(items)
    })
}

/// Write every item of an array
pub fn write_array<T>(
    writer: &mut dyn WriteBuffer,
    name: &str,
    items: &[T],
    mut serialize: impl FnMut(&T, &mut dyn WriteBuffer) -> Result<()>,
) -> Result<()> {
    in_context(writer, name, |w| {
        for item in items {
            serialize(item, w)?;
        }
        Ok(())
    })
}

/// Verify a checksum field against the bytes read since `covered_from`
///
/// The checksum is read at the cursor, after the covered range. On mismatch
/// the cursor has already moved past the checksum.
pub fn verify_checksum<C: Checksum + ?Sized>(
    reader: &mut ReadBuffer<'_>,
    name: &str,
    algorithm: &C,
    covered_from: usize,
) -> Result<u64> {
    let covered = reader.slice_bytes(covered_from, reader.position())?;
    let computed = algorithm.compute(covered);
    let expected = reader.in_context(name, |r| {
        r.with_byte_order(algorithm.byte_order(), |r| r.read_unsigned(algorithm.bits()))
    })?;
    if expected != computed {
        return Err(CodecError::ChecksumMismatch {
            context: reader.field_path(name),
            expected,
            computed,
        });
    }
    Ok(expected)
}

/// Write a checksum field computed over `covered`
pub fn write_checksum<C: Checksum + ?Sized>(
    writer: &mut dyn WriteBuffer,
    name: &str,
    algorithm: &C,
    covered: &[u8],
) -> Result<()> {
    let value = algorithm.compute(covered);
    with_byte_order(writer, algorithm.byte_order(), |w| {
        w.write_unsigned(algorithm.bits(), value, name)
    })
}

/// Skip `count` padding items of `item_bits` bits each, whatever they hold
pub fn read_padding(reader: &mut ReadBuffer<'_>, name: &str, item_bits: u8, count: usize) -> Result<()> {
    reader.in_context(name, |r| r.skip_bits(usize::from(item_bits) * count))
}

/// Write `count` padding items of `item_bits` bits holding `fill`
pub fn write_padding(
    writer: &mut dyn WriteBuffer,
    name: &str,
    item_bits: u8,
    count: usize,
    fill: u64,
) -> Result<()> {
    for _ in 0..count {
        writer.write_unsigned(item_bits, fill, name)?;
    }
    Ok(())
}

/// Read a reserved field; a value other than `expected` is only a warning
pub fn read_reserved(
    reader: &mut ReadBuffer<'_>,
    name: &str,
    bits: u8,
    expected: u64,
) -> Result<u64> {
    let found = reader.in_context(name, |r| r.read_unsigned(bits))?;
    if found != expected {
        let warning = CodecError::ReservedValueMismatch {
            context: reader.field_path(name),
            expected,
            found,
        };
        reader.warn(warning);
    }
    Ok(found)
}

/// Write a reserved field
pub fn write_reserved(writer: &mut dyn WriteBuffer, name: &str, bits: u8, value: u64) -> Result<()> {
    writer.write_unsigned(bits, value, name)
}

/// Read a const field; any value other than `expected` fails the parse
pub fn read_const(reader: &mut ReadBuffer<'_>, name: &str, bits: u8, expected: u64) -> Result<u64> {
    let found = reader.in_context(name, |r| r.read_unsigned(bits))?;
    if found != expected {
        return Err(CodecError::ConstMismatch {
            context: reader.field_path(name),
            expected,
            found,
        });
    }
    Ok(found)
}

/// Write a const field
pub fn write_const(writer: &mut dyn WriteBuffer, name: &str, bits: u8, value: u64) -> Result<()> {
    writer.write_unsigned(bits, value, name)
}

/// Caller-supplied logic for a field the declarative shapes cannot express
///
/// The author must keep `length_in_bits` in agreement with `serialize`;
/// [`ManualCodec::write`] checks the agreement on every write, but an
/// enclosing array or implicit length computed before the write relies on it
/// being right.
pub struct ManualCodec<T> {
    /// Parse the field at the cursor
    pub parse: fn(&mut ReadBuffer<'_>) -> Result<T>,
    /// Write the field
    pub serialize: fn(&T, &mut dyn WriteBuffer) -> Result<()>,
    /// Encoded width of a value in bits
    pub length_in_bits: fn(&T) -> usize,
}

impl<T> Clone for ManualCodec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ManualCodec<T> {}

impl<T> ManualCodec<T> {
    /// Read the field inside a context named `name`
    pub fn read(&self, reader: &mut ReadBuffer<'_>, name: &str) -> Result<T> {
        reader.in_context(name, |r| (self.parse)(r))
    }

    /// Write the field and check the bits written against `length_in_bits`
    pub fn write(&self, value: &T, writer: &mut dyn WriteBuffer, name: &str) -> Result<()> {
        let declared = (self.length_in_bits)(value);
        let start = writer.position();
        in_context(writer, name, |w| (self.serialize)(value, w))?;
        check_length(name, declared, writer.position() - start)
    }

    /// Encoded width of `value` in bits
    pub fn bit_length(&self, value: &T) -> usize {
        (self.length_in_bits)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Crc16Modbus, Sum8};
    use crate::write_buffer::ByteWriteBuffer;

    #[test]
    fn test_simple_fields_round_trip() -> Result<()> {
        let mut writer = ByteWriteBuffer::growable();
        write_simple(&mut writer, "flag", &true)?;
        write_simple(&mut writer, "pad", &0u8)?;
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0x80, 0x00]);

        let mut reader = ReadBuffer::new(&bytes);
        assert!(read_simple::<bool>(&mut reader, "flag")?);
        assert_eq!(read_simple::<u8>(&mut reader, "pad")?, 0);
        Ok(())
    }

    #[test]
    fn test_implicit_length_bounds_array() -> Result<()> {
        let data = [0x04, 0x00, 0x01, 0x00, 0x02, 0xFF];
        let mut reader = ReadBuffer::new(&data);
        let byte_count = read_implicit(&mut reader, "byte_count", 8)? as usize;
        let registers = read_array(
            &mut reader,
            "registers",
            ArrayBound::LengthInBytes(byte_count),
            |r| r.read_u16(),
        )?;
        assert_eq!(registers, vec![1, 2]);
        assert_eq!(reader.byte_position(), 5);
        Ok(())
    }

    #[test]
    fn test_length_bounded_array_overrun() {
        let data = [0x00, 0x01, 0x00];
        let mut reader = ReadBuffer::new(&data);
        let result = read_array(&mut reader, "registers", ArrayBound::LengthInBytes(3), |r| {
            r.read_u16()
        });
        assert!(matches!(result, Err(CodecError::OutOfData { .. })));
    }

    #[test]
    fn test_count_array_and_terminated_array() -> Result<()> {
        let data = [0x01, 0x02, 0x03, b'a', b'b', 0x00, 0x09];
        let mut reader = ReadBuffer::new(&data);
        let counted = read_array(&mut reader, "items", ArrayBound::Count(3), |r| r.read_u8())?;
        assert_eq!(counted, vec![1, 2, 3]);

        let name = read_terminated_array(
            &mut reader,
            "name",
            |r| {
                if r.peek_bits(8)? == 0 {
                    r.skip_bits(8)?;
                    return Ok(true);
                }
                Ok(false)
            },
            |r| r.read_u8(),
        )?;
        assert_eq!(name, b"ab".to_vec());
        assert_eq!(reader.read_u8()?, 0x09);
        Ok(())
    }

    #[test]
    fn test_optional_fields() -> Result<()> {
        let mut writer = ByteWriteBuffer::growable();
        write_optional(&mut writer, "extra", Some(&0xABu8), |v, w| w.write_u8(*v, "extra"))?;
        write_optional::<u8>(&mut writer, "missing", None, |v, w| w.write_u8(*v, "missing"))?;
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0xAB]);

        let mut reader = ReadBuffer::new(&bytes);
        assert_eq!(read_optional(&mut reader, "extra", true, |r| r.read_u8())?, Some(0xAB));
        assert_eq!(read_optional(&mut reader, "missing", false, |r| r.read_u8())?, None);
        Ok(())
    }

    #[test]
    fn test_checksum_verification() -> Result<()> {
        let mut writer = ByteWriteBuffer::growable();
        writer.write_bytes(&[0x10, 0x20], "payload")?;
        write_checksum(&mut writer, "cs", &Sum8, &[0x10, 0x20])?;
        let mut bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0x10, 0x20, 0x30]);

        let mut reader = ReadBuffer::new(&bytes);
        reader.skip_bits(16)?;
        assert_eq!(verify_checksum(&mut reader, "cs", &Sum8, 0)?, 0x30);

        bytes[1] = 0x21;
        let mut reader = ReadBuffer::new(&bytes);
        reader.push_context("frame");
        reader.skip_bits(16)?;
        assert_eq!(
            verify_checksum(&mut reader, "cs", &Sum8, 0),
            Err(CodecError::ChecksumMismatch {
                context: "frame/cs".to_string(),
                expected: 0x30,
                computed: 0x31,
            })
        );
        assert_eq!(reader.remaining_bits(), 0);
        Ok(())
    }

    #[test]
    fn test_crc_written_low_byte_first() -> Result<()> {
        let payload = b"123456789";
        let mut writer = ByteWriteBuffer::growable();
        writer.write_bytes(payload, "payload")?;
        write_checksum(&mut writer, "crc", &Crc16Modbus, payload)?;
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[9..], &[0x37, 0x4B]);

        let mut reader = ReadBuffer::new(&bytes);
        reader.skip_bits(72)?;
        assert_eq!(verify_checksum(&mut reader, "crc", &Crc16Modbus, 0)?, 0x4B37);
        Ok(())
    }

    #[test]
    fn test_padding_is_value_agnostic() -> Result<()> {
        let mut writer = ByteWriteBuffer::growable();
        write_padding(&mut writer, "preamble", 8, 3, 0xFE)?;
        assert_eq!(writer.as_bytes(), &[0xFE, 0xFE, 0xFE]);

        let data = [0x12, 0x34, 0x56, 0x68];
        let mut reader = ReadBuffer::new(&data);
        read_padding(&mut reader, "preamble", 8, 3)?;
        assert_eq!(reader.read_u8()?, 0x68);
        Ok(())
    }

    #[test]
    fn test_reserved_mismatch_is_soft() -> Result<()> {
        let data = [0x00, 0x01, 0x7F];
        let mut reader = ReadBuffer::new(&data);
        let found = read_reserved(&mut reader, "protocol_id", 16, 0)?;
        assert_eq!(found, 1);
        assert_eq!(reader.read_u8()?, 0x7F);
        assert_eq!(reader.warnings().len(), 1);
        assert!(reader.warnings()[0].is_soft());
        Ok(())
    }

    #[test]
    fn test_const_mismatch_is_hard() {
        let data = [0x15];
        let mut reader = ReadBuffer::new(&data);
        assert!(matches!(
            read_const(&mut reader, "end", 8, 0x16),
            Err(CodecError::ConstMismatch {
                expected: 0x16,
                found: 0x15,
                ..
            })
        ));
    }

    fn parse_nibbles(reader: &mut ReadBuffer<'_>) -> Result<Vec<u8>> {
        let count = reader.read_bits(4)? as usize;
        (0..count).map(|_| Ok(reader.read_bits(4)? as u8)).collect()
    }

    fn serialize_nibbles(value: &Vec<u8>, writer: &mut dyn WriteBuffer) -> Result<()> {
        writer.write_unsigned(4, value.len() as u64, "count")?;
        for nibble in value {
            writer.write_unsigned(4, u64::from(*nibble), "nibble")?;
        }
        Ok(())
    }

    fn nibbles_length(value: &Vec<u8>) -> usize {
        4 + 4 * value.len()
    }

    fn wrong_length(_value: &Vec<u8>) -> usize {
        8
    }

    #[test]
    fn test_manual_codec_checks_length_agreement() -> Result<()> {
        let codec = ManualCodec {
            parse: parse_nibbles,
            serialize: serialize_nibbles,
            length_in_bits: nibbles_length,
        };
        let value = vec![0xA, 0xB, 0xC];
        let mut writer = ByteWriteBuffer::growable();
        codec.write(&value, &mut writer, "nibbles")?;
        assert_eq!(writer.position(), codec.bit_length(&value));
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0x3A, 0xBC]);

        let mut reader = ReadBuffer::new(&bytes);
        assert_eq!(codec.read(&mut reader, "nibbles")?, value);

        let broken = ManualCodec {
            length_in_bits: wrong_length,
            ..codec
        };
        let mut writer = ByteWriteBuffer::growable();
        assert!(matches!(
            broken.write(&value, &mut writer, "nibbles"),
            Err(CodecError::LengthMismatch {
                declared: 8,
                written: 16,
                ..
            })
        ));
        Ok(())
    }
}
