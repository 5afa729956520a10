/*!
 * Diagnostic rendering of messages.
 *
 * [`JsonWriteBuffer`] accepts the same calls as the byte writer but builds a
 * JSON document: every context becomes a nested object and every field a
 * member named after it. Repeated names (array items) collapse into a JSON
 * array. Bit positions advance exactly as they would on the wire, so length
 * checks behave the same.
 */
use serde_json::{Map, Value as JsonValue};

use crate::byte_order::ByteOrder;
use crate::context::ContextStack;
use crate::error::{CodecError, Result};
use crate::write_buffer::{check_width, signed_fits, unsigned_fits, WriteBuffer};

/// Write cursor rendering a message as JSON
#[derive(Debug, Default)]
pub struct JsonWriteBuffer {
    root: Map<String, JsonValue>,
    open: Vec<(String, Map<String, JsonValue>)>,
    position: usize,
    byte_order: ByteOrder,
    context: ContextStack,
}

impl JsonWriteBuffer {
    /// Create an empty renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish rendering and return the document
    ///
    /// Contexts still open are closed first.
    pub fn into_json(mut self) -> JsonValue {
        while let Some((label, members)) = self.open.pop() {
            let parent = self.open.last_mut().map(|(_, m)| m).unwrap_or(&mut self.root);
            insert(parent, &label, JsonValue::Object(members));
        }
        JsonValue::Object(self.root)
    }

    fn current(&mut self) -> &mut Map<String, JsonValue> {
        match self.open.last_mut() {
            Some((_, members)) => members,
            None => &mut self.root,
        }
    }

    fn emit(&mut self, bits: usize, name: &str, value: JsonValue) {
        insert(self.current(), name, value);
        self.position += bits;
    }
}

fn insert(map: &mut Map<String, JsonValue>, key: &str, value: JsonValue) {
    match map.get_mut(key) {
        Some(JsonValue::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = JsonValue::Array(vec![first, value]);
        }
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl WriteBuffer for JsonWriteBuffer {
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
        self.open.push((label.to_string(), Map::new()));
    }

    fn pop_context(&mut self, label: &str) -> Result<()> {
        self.context.pop(label)?;
        if let Some((name, members)) = self.open.pop() {
            insert(self.current(), &name, JsonValue::Object(members));
        }
        Ok(())
    }

    fn write_unsigned(&mut self, bits: u8, value: u64, name: &str) -> Result<()> {
        check_width(bits, "unsigned")?;
        if !unsigned_fits(bits, value) {
            return Err(CodecError::invalid_value(
                self.context.path_with(name),
                format!("{} does not fit in {} bits", value, bits),
            ));
        }
        self.emit(usize::from(bits), name, JsonValue::from(value));
        Ok(())
    }

    fn write_signed(&mut self, bits: u8, value: i64, name: &str) -> Result<()> {
        check_width(bits, "signed")?;
        if !signed_fits(bits, value) {
            return Err(CodecError::invalid_value(
                self.context.path_with(name),
                format!("{} does not fit in {} signed bits", value, bits),
            ));
        }
        self.emit(usize::from(bits), name, JsonValue::from(value));
        Ok(())
    }

    fn write_bit(&mut self, value: bool, name: &str) -> Result<()> {
        self.emit(1, name, JsonValue::Bool(value));
        Ok(())
    }

    fn write_f32(&mut self, value: f32, name: &str) -> Result<()> {
        self.emit(32, name, JsonValue::from(f64::from(value)));
        Ok(())
    }

    fn write_f64(&mut self, value: f64, name: &str) -> Result<()> {
        self.emit(64, name, JsonValue::from(value));
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8], name: &str) -> Result<()> {
        self.emit(bytes.len() * 8, name, JsonValue::String(hex(bytes)));
        Ok(())
    }

    fn write_string(&mut self, bits: usize, value: &str, name: &str) -> Result<()> {
        if bits % 8 != 0 {
            return Err(CodecError::InvalidBitLength {
                bits,
                kind: "string",
            });
        }
        self.emit(bits, name, JsonValue::String(value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_buffer::in_context;
    use serde_json::json;

    #[test]
    fn test_contexts_become_objects() -> Result<()> {
        let mut writer = JsonWriteBuffer::new();
        in_context(&mut writer, "adu", |w| {
            w.write_u16(7, "transaction_id")?;
            in_context(w, "pdu", |w| {
                w.write_bit(false, "error_flag")?;
                w.write_unsigned(7, 3, "function")
            })
        })?;
        assert_eq!(writer.position(), 24);
        assert_eq!(
            writer.into_json(),
            json!({"adu": {"transaction_id": 7, "pdu": {"error_flag": false, "function": 3}}})
        );
        Ok(())
    }

    #[test]
    fn test_repeated_names_collapse_into_arrays() -> Result<()> {
        let mut writer = JsonWriteBuffer::new();
        for value in [10u16, 20, 30] {
            writer.write_u16(value, "register")?;
        }
        writer.write_bytes(&[0xCA, 0xFE], "raw")?;
        assert_eq!(
            writer.into_json(),
            json!({"register": [10, 20, 30], "raw": "cafe"})
        );
        Ok(())
    }

    #[test]
    fn test_unbalanced_pop_is_rejected() {
        let mut writer = JsonWriteBuffer::new();
        writer.push_context("frame");
        assert!(writer.pop_context("body").is_err());
        assert!(writer.pop_context("frame").is_ok());
    }
}
