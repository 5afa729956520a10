/*!
 * Conversions between register words and tag values.
 *
 * Multi-register elements are big-endian: the first register carries the
 * most significant word.
 */
use wireflow_core::types::{ResponseCode, Value, ValueType};

use super::pdu::unpack_bits;
use super::tag::ModbusTag;

fn collapse(tag: &ModbusTag, mut elements: Vec<Value>) -> Value {
    if tag.count == 1 && elements.len() == 1 {
        elements.remove(0)
    } else {
        Value::Array(elements)
    }
}

/// Decode the registers of a register read into the tag's value
pub fn decode_registers(tag: &ModbusTag, registers: &[u16]) -> Result<Value, ResponseCode> {
    let words = tag.words_per_element();
    if registers.len() < usize::from(tag.quantity()) {
        return Err(ResponseCode::InvalidData);
    }
    let elements = registers
        .chunks(words)
        .take(usize::from(tag.count))
        .map(|chunk| {
            let raw = chunk.iter().fold(0u64, |acc, w| (acc << 16) | u64::from(*w));
            decode_element(tag.value_type, raw)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collapse(tag, elements))
}

fn decode_element(value_type: ValueType, raw: u64) -> Result<Value, ResponseCode> {
    let value = match value_type {
        ValueType::Word => Value::from(raw as u16),
        ValueType::Int => Value::from(raw as u16 as i16),
        ValueType::DWord => Value::from(raw as u32),
        ValueType::DInt => Value::from(raw as u32 as i32),
        ValueType::Real => Value::from(f32::from_bits(raw as u32)),
        ValueType::LReal => Value::from(f64::from_bits(raw)),
        _ => return Err(ResponseCode::InvalidDatatype),
    };
    Ok(value)
}

/// Decode the packed bits of a coil or discrete input read
pub fn decode_bits(tag: &ModbusTag, packed: &[u8]) -> Result<Value, ResponseCode> {
    let count = usize::from(tag.count);
    if packed.len() * 8 < count {
        return Err(ResponseCode::InvalidData);
    }
    let elements = unpack_bits(packed, count).into_iter().map(Value::from).collect();
    Ok(collapse(tag, elements))
}

/// Encode a value for a register write
pub fn encode_registers(tag: &ModbusTag, value: &Value) -> Result<Vec<u16>, ResponseCode> {
    let elements = value.elements();
    if elements.len() != usize::from(tag.count) {
        return Err(ResponseCode::InvalidData);
    }
    let words = tag.words_per_element();
    let mut registers = Vec::with_capacity(elements.len() * words);
    for element in elements {
        let raw = encode_element(tag.value_type, element)?;
        for i in (0..words).rev() {
            registers.push((raw >> (16 * i)) as u16);
        }
    }
    Ok(registers)
}

fn encode_element(value_type: ValueType, value: &Value) -> Result<u64, ResponseCode> {
    let invalid = ResponseCode::InvalidData;
    let raw = match value_type {
        ValueType::Word => u64::from(integer::<u16>(value)?),
        ValueType::Int => u64::from(integer::<i16>(value)? as u16),
        ValueType::DWord => u64::from(integer::<u32>(value)?),
        ValueType::DInt => u64::from(integer::<i32>(value)? as u32),
        ValueType::Real => {
            let v = value.as_float().ok_or(invalid)?;
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(invalid);
            }
            u64::from((v as f32).to_bits())
        }
        ValueType::LReal => value.as_float().ok_or(invalid)?.to_bits(),
        _ => return Err(ResponseCode::InvalidDatatype),
    };
    Ok(raw)
}

fn integer<T: TryFrom<i64>>(value: &Value) -> Result<T, ResponseCode> {
    value
        .as_integer()
        .and_then(|v| T::try_from(v).ok())
        .ok_or(ResponseCode::InvalidData)
}

/// Encode a value for a coil write
pub fn encode_bits(tag: &ModbusTag, value: &Value) -> Result<Vec<bool>, ResponseCode> {
    let elements = value.elements();
    if elements.len() != usize::from(tag.count) {
        return Err(ResponseCode::InvalidData);
    }
    elements
        .into_iter()
        .map(|element| element.as_bool().ok_or(ResponseCode::InvalidData))
        .collect()
}
