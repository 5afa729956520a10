/*!
 * DL/T 645 tag addresses.
 *
 * Grammar: `IDENTIFIER[:FORMAT]`. The identifier is the eight hex digits of
 * the data identifier, most significant first (`00010000` is total forward
 * active energy). The format is a digit picture such as `XXXXXX.XX` for a
 * four-byte BCD value with two decimals, `-XXX.XXX` for a signed one, or
 * `RAW` for the undecoded data bytes. Without a format the bytes are
 * returned raw.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wireflow_core::types::{ResponseCode, Value, ValueType};
use wireflow_engine::Tag;

use super::bcd;
use crate::error::{Result, TagError};

/// Most BCD digits a value may have
pub const MAX_DIGITS: u8 = 18;

/// How the data bytes of an item are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dlt645Format {
    /// Packed BCD, least significant byte first
    Bcd {
        /// Total digits of the picture
        digits: u8,
        /// Digits after the decimal point
        decimals: u8,
        /// Whether the top bit carries the sign
        signed: bool,
    },
    /// Bytes as received
    Raw,
}

impl Dlt645Format {
    /// Width of the value on the wire; `None` for raw data
    pub fn width(&self) -> Option<usize> {
        match self {
            Dlt645Format::Bcd { digits, .. } => Some((usize::from(*digits) + 1) / 2),
            Dlt645Format::Raw => None,
        }
    }

    /// Value type reported for the format
    pub fn value_type(&self) -> ValueType {
        match self {
            Dlt645Format::Bcd { decimals, .. } if *decimals > 0 => ValueType::LReal,
            Dlt645Format::Bcd { signed: true, .. } => ValueType::DInt,
            Dlt645Format::Bcd { .. } => ValueType::DWord,
            Dlt645Format::Raw => ValueType::Raw,
        }
    }

    /// Interpret the data bytes of a response
    pub fn decode(&self, data: &[u8]) -> std::result::Result<Value, ResponseCode> {
        match *self {
            Dlt645Format::Raw => Ok(Value::Binary(data.to_vec())),
            Dlt645Format::Bcd {
                decimals, signed, ..
            } => {
                if Some(data.len()) != self.width() {
                    return Err(ResponseCode::InvalidData);
                }
                let raw = bcd::decode(data, signed).ok_or(ResponseCode::InvalidData)?;
                if decimals == 0 {
                    Ok(Value::Integer(raw))
                } else {
                    Ok(Value::Float(raw as f64 / 10f64.powi(i32::from(decimals))))
                }
            }
        }
    }

    /// Encode a value for a write
    pub fn encode(&self, value: &Value) -> std::result::Result<Vec<u8>, ResponseCode> {
        match *self {
            Dlt645Format::Raw => value
                .as_binary()
                .map(<[u8]>::to_vec)
                .ok_or(ResponseCode::InvalidDatatype),
            Dlt645Format::Bcd {
                decimals, signed, ..
            } => {
                let scaled = match value {
                    Value::Integer(v) if decimals == 0 => *v,
                    _ => {
                        let v = value.as_float().ok_or(ResponseCode::InvalidDatatype)?;
                        (v * 10f64.powi(i32::from(decimals))).round() as i64
                    }
                };
                let width = self.width().ok_or(ResponseCode::InternalError)?;
                bcd::encode(scaled, width, signed).ok_or(ResponseCode::InvalidData)
            }
        }
    }
}

impl fmt::Display for Dlt645Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Dlt645Format::Raw => write!(f, "RAW"),
            Dlt645Format::Bcd {
                digits,
                decimals,
                signed,
            } => {
                if signed {
                    write!(f, "-")?;
                }
                let whole = usize::from(digits - decimals);
                write!(f, "{}", "X".repeat(whole))?;
                if decimals > 0 {
                    write!(f, ".{}", "X".repeat(usize::from(decimals)))?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Dlt645Format {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("raw") {
            return Ok(Dlt645Format::Raw);
        }
        let (signed, picture) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = picture.split_once('.').unwrap_or((picture, ""));
        let is_digits = |part: &str| part.bytes().all(|b| b == b'X' || b == b'x');
        if !is_digits(whole) || !is_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
            return Err(TagError::invalid_value_type(s));
        }
        let digits = whole.len() + fraction.len();
        if digits > usize::from(MAX_DIGITS) {
            return Err(TagError::invalid_value_type(format!(
                "{} has more than {} digits",
                s, MAX_DIGITS
            )));
        }
        Ok(Dlt645Format::Bcd {
            digits: digits as u8,
            decimals: fraction.len() as u8,
            signed,
        })
    }
}

/// One data item of a meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dlt645Tag {
    /// Data identifier DI3 DI2 DI1 DI0
    pub identifier: u32,
    /// Interpretation of the data bytes
    pub format: Dlt645Format,
}

impl Dlt645Tag {
    /// Tag for an identifier with the given format
    pub fn new(identifier: u32, format: Dlt645Format) -> Self {
        Self { identifier, format }
    }
}

impl Tag for Dlt645Tag {
    fn value_type(&self) -> ValueType {
        self.format.value_type()
    }
}

impl fmt::Display for Dlt645Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.identifier)?;
        if self.format != Dlt645Format::Raw {
            write!(f, ":{}", self.format)?;
        }
        Ok(())
    }
}

impl FromStr for Dlt645Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (identifier, format) = match s.split_once(':') {
            Some((identifier, format)) => (identifier, format.parse::<Dlt645Format>()?),
            None => (s, Dlt645Format::Raw),
        };
        if identifier.len() != 8 {
            return Err(TagError::malformed(s));
        }
        let identifier = u32::from_str_radix(identifier, 16)
            .map_err(|_| TagError::UnknownArea(identifier.to_string()))?;
        Ok(Dlt645Tag { identifier, format })
    }
}
