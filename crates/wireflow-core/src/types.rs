/*!
 * Core data types for Wireflow.
 *
 * This module defines the device value model shared by every protocol:
 * identifiers, decoded values, requested value types and per-tag response
 * codes.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for connections and subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self::from_string(uuid.to_string())
    }
}

/// A value read from or written to a device
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value (acknowledged writes, empty subscriptions)
    #[default]
    Null,
    /// Boolean value (coils, bit flags)
    Bool(bool),
    /// Integer value, signed or unsigned up to 63 bits
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values (multi-element tags)
    Array(Vec<Value>),
    /// Raw bytes the protocol does not interpret
    Binary(Vec<u8>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Check if the value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get binary data
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Flatten a scalar or array into its elements
    pub fn elements(&self) -> Vec<&Value> {
        match self {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

/// The value type a tag asks the device for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    /// Single bit
    Bool,
    /// Unsigned 8 bit
    Byte,
    /// Unsigned 16 bit
    Word,
    /// Unsigned 32 bit
    DWord,
    /// Signed 16 bit
    Int,
    /// Signed 32 bit
    DInt,
    /// IEEE 754 single precision
    Real,
    /// IEEE 754 double precision
    LReal,
    /// Character string
    String,
    /// Uninterpreted bytes
    Raw,
}

impl ValueType {
    /// Size of one element on the wire, in bits; `None` for variable-length types
    pub fn bit_size(&self) -> Option<usize> {
        match self {
            ValueType::Bool => Some(1),
            ValueType::Byte => Some(8),
            ValueType::Word | ValueType::Int => Some(16),
            ValueType::DWord | ValueType::DInt | ValueType::Real => Some(32),
            ValueType::LReal => Some(64),
            ValueType::String | ValueType::Raw => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "BOOL",
            ValueType::Byte => "BYTE",
            ValueType::Word => "WORD",
            ValueType::DWord => "DWORD",
            ValueType::Int => "INT",
            ValueType::DInt => "DINT",
            ValueType::Real => "REAL",
            ValueType::LReal => "LREAL",
            ValueType::String => "STRING",
            ValueType::Raw => "RAW",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ValueType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BOOL" => Ok(ValueType::Bool),
            "BYTE" | "USINT" => Ok(ValueType::Byte),
            "WORD" | "UINT" => Ok(ValueType::Word),
            "DWORD" | "UDINT" => Ok(ValueType::DWord),
            "INT" => Ok(ValueType::Int),
            "DINT" => Ok(ValueType::DInt),
            "REAL" => Ok(ValueType::Real),
            "LREAL" => Ok(ValueType::LReal),
            "STRING" => Ok(ValueType::String),
            "RAW" => Ok(ValueType::Raw),
            other => Err(crate::error::Error::value(format!("unknown value type '{}'", other))),
        }
    }
}

/// Outcome of one tag within a logical read, write or subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    /// The tag was served
    Ok,
    /// The device does not know the addressed item
    NotFound,
    /// The device refused access
    AccessDenied,
    /// The address is malformed or out of range for the device
    InvalidAddress,
    /// The requested value type does not fit the item
    InvalidDatatype,
    /// The value or the response carrying it could not be interpreted
    InvalidData,
    /// A local failure prevented the tag from being served
    InternalError,
    /// The device reported it is busy
    RemoteBusy,
    /// The device reported a failure
    RemoteError,
    /// The operation is not supported for this tag or protocol
    Unsupported,
    /// No response arrived before the deadline
    Timeout,
    /// The request was cancelled before a response arrived
    Cancelled,
    /// The connection was lost while the request was outstanding
    ConnectionLost,
    /// The connection already had its maximum number of requests in flight
    TooManyPendingRequests,
}

impl ResponseCode {
    /// Whether the tag was served
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseCode::Ok)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseCode::Ok => "OK",
            ResponseCode::NotFound => "NOT_FOUND",
            ResponseCode::AccessDenied => "ACCESS_DENIED",
            ResponseCode::InvalidAddress => "INVALID_ADDRESS",
            ResponseCode::InvalidDatatype => "INVALID_DATATYPE",
            ResponseCode::InvalidData => "INVALID_DATA",
            ResponseCode::InternalError => "INTERNAL_ERROR",
            ResponseCode::RemoteBusy => "REMOTE_BUSY",
            ResponseCode::RemoteError => "REMOTE_ERROR",
            ResponseCode::Unsupported => "UNSUPPORTED",
            ResponseCode::Timeout => "TIMEOUT",
            ResponseCode::Cancelled => "CANCELLED",
            ResponseCode::ConnectionLost => "CONNECTION_LOST",
            ResponseCode::TooManyPendingRequests => "TOO_MANY_PENDING_REQUESTS",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = Id::new();
        assert!(!id.as_str().is_empty());

        let id: Id = "plc-7".into();
        assert_eq!(id.as_str(), "plc-7");
        assert_eq!(format!("{}", id), "plc-7");
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v.as_bool(), Some(true));

        let v: Value = 0x1234u16.into();
        assert_eq!(v.as_integer(), Some(0x1234));

        let v: Value = (-2i16).into();
        assert_eq!(v.as_integer(), Some(-2));

        let v: Value = 1.5f32.into();
        assert_eq!(v.as_float(), Some(1.5));

        let v = Value::Integer(1);
        assert_eq!(v.as_bool(), Some(true));

        let v = Value::Float(3.25);
        assert_eq!(v.as_integer(), None);
    }

    #[test]
    fn test_value_elements() {
        let scalar = Value::Integer(7);
        assert_eq!(scalar.elements(), vec![&Value::Integer(7)]);

        let array = Value::Array(vec![Value::Bool(true), Value::Bool(false)]);
        assert_eq!(array.elements().len(), 2);
    }

    #[test]
    fn test_value_serde_untagged() -> crate::error::Result<()> {
        let v: Value = serde_json::from_str("[1, 2.5, true, \"x\"]")?;
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Integer(1),
                Value::Float(2.5),
                Value::Bool(true),
                Value::String("x".to_string()),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_value_type_parsing() -> crate::error::Result<()> {
        assert_eq!("word".parse::<ValueType>()?, ValueType::Word);
        assert_eq!("UDINT".parse::<ValueType>()?, ValueType::DWord);
        assert!("QUUX".parse::<ValueType>().is_err());
        assert_eq!(ValueType::Real.bit_size(), Some(32));
        assert_eq!(ValueType::String.bit_size(), None);
        assert_eq!(ValueType::LReal.to_string(), "LREAL");
        Ok(())
    }

    #[test]
    fn test_response_codes() {
        assert!(ResponseCode::Ok.is_ok());
        assert!(!ResponseCode::Timeout.is_ok());
        assert_eq!(ResponseCode::ConnectionLost.to_string(), "CONNECTION_LOST");
    }
}
