/*!
 * Modbus tag addresses.
 *
 * Grammar: `AREA:ADDRESS[:TYPE][[COUNT]]`, for example `coil:17`,
 * `holding-register:1:REAL[4]` or `input-register:100[10]`. Addresses are
 * one-based as printed in device manuals; the wire carries `ADDRESS - 1`.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wireflow_core::types::ValueType;
use wireflow_engine::Tag;

use super::pdu::FunctionCode;
use crate::error::{Result, TagError};

/// Largest number of bits one read may ask for
pub const MAX_BITS_PER_READ: usize = 2000;

/// Largest number of registers one read may ask for
pub const MAX_REGISTERS_PER_READ: usize = 125;

/// Modbus data model table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModbusArea {
    /// Read-write bits
    Coil,
    /// Read-only bits
    DiscreteInput,
    /// Read-only registers
    InputRegister,
    /// Read-write registers
    HoldingRegister,
}

impl ModbusArea {
    /// Name used in tag addresses
    pub fn name(self) -> &'static str {
        match self {
            ModbusArea::Coil => "coil",
            ModbusArea::DiscreteInput => "discrete-input",
            ModbusArea::InputRegister => "input-register",
            ModbusArea::HoldingRegister => "holding-register",
        }
    }

    /// Whether the area holds single bits
    pub fn is_bit_area(self) -> bool {
        matches!(self, ModbusArea::Coil | ModbusArea::DiscreteInput)
    }

    /// Whether clients may write the area
    pub fn is_writable(self) -> bool {
        matches!(self, ModbusArea::Coil | ModbusArea::HoldingRegister)
    }

    /// Function reading the area
    pub fn read_function(self) -> FunctionCode {
        match self {
            ModbusArea::Coil => FunctionCode::ReadCoils,
            ModbusArea::DiscreteInput => FunctionCode::ReadDiscreteInputs,
            ModbusArea::InputRegister => FunctionCode::ReadInputRegisters,
            ModbusArea::HoldingRegister => FunctionCode::ReadHoldingRegisters,
        }
    }
}

impl FromStr for ModbusArea {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coil" | "coils" => Ok(ModbusArea::Coil),
            "discrete-input" | "discrete-inputs" => Ok(ModbusArea::DiscreteInput),
            "input-register" | "input-registers" => Ok(ModbusArea::InputRegister),
            "holding-register" | "holding-registers" => Ok(ModbusArea::HoldingRegister),
            _ => Err(TagError::UnknownArea(s.to_string())),
        }
    }
}

/// A run of elements in one Modbus table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModbusTag {
    /// Table
    pub area: ModbusArea,
    /// Zero-based protocol address of the first element
    pub address: u16,
    /// Type of each element
    pub value_type: ValueType,
    /// Number of elements
    pub count: u16,
}

impl ModbusTag {
    /// Build a tag from a zero-based protocol address, checking the type and range
    pub fn new(area: ModbusArea, address: u16, value_type: ValueType, count: u16) -> Result<Self> {
        let tag = Self {
            area,
            address,
            value_type,
            count,
        };
        tag.validate()?;
        Ok(tag)
    }

    /// Registers (or bits) occupied by one element
    pub fn words_per_element(&self) -> usize {
        match self.value_type.bit_size() {
            Some(1) | None => 1,
            Some(bits) => (bits + 15) / 16,
        }
    }

    /// Number of bits or registers the tag spans on the wire
    pub fn quantity(&self) -> u16 {
        (usize::from(self.count) * self.words_per_element()) as u16
    }

    fn validate(&self) -> Result<()> {
        let bit_area = self.area.is_bit_area();
        let supported = if bit_area {
            self.value_type == ValueType::Bool
        } else {
            matches!(
                self.value_type,
                ValueType::Word
                    | ValueType::Int
                    | ValueType::DWord
                    | ValueType::DInt
                    | ValueType::Real
                    | ValueType::LReal
            )
        };
        if !supported {
            return Err(TagError::invalid_value_type(format!(
                "{} in {}",
                self.value_type,
                self.area.name()
            )));
        }

        let limit = if bit_area {
            MAX_BITS_PER_READ
        } else {
            MAX_REGISTERS_PER_READ
        };
        let quantity = usize::from(self.count) * self.words_per_element();
        if self.count == 0 || quantity > limit {
            return Err(TagError::invalid_count(format!(
                "{} elements of {} span {} items, limit {}",
                self.count,
                self.value_type,
                quantity,
                limit
            )));
        }
        if usize::from(self.address) + quantity > usize::from(u16::MAX) + 1 {
            return Err(TagError::address_out_of_range(format!(
                "{} items from {} run past the end of the table",
                quantity,
                u32::from(self.address) + 1
            )));
        }
        Ok(())
    }
}

impl Tag for ModbusTag {
    fn value_type(&self) -> ValueType {
        self.value_type
    }

    fn element_count(&self) -> usize {
        usize::from(self.count)
    }
}

impl fmt::Display for ModbusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.area.name(),
            u32::from(self.address) + 1,
            self.value_type
        )?;
        if self.count != 1 {
            write!(f, "[{}]", self.count)?;
        }
        Ok(())
    }
}

impl FromStr for ModbusTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (body, count) = split_count(s)?;

        let mut parts = body.split(':');
        let area = parts
            .next()
            .filter(|part| !part.is_empty())
            .ok_or_else(|| TagError::malformed(s))?
            .parse::<ModbusArea>()?;
        let address = parts.next().ok_or_else(|| TagError::malformed(s))?;
        let address: u32 = address.parse().map_err(|_| TagError::malformed(s))?;
        if !(1..=65536).contains(&address) {
            return Err(TagError::address_out_of_range(format!(
                "{} is not between 1 and 65536",
                address
            )));
        }
        let value_type = match parts.next() {
            Some(name) => name
                .parse::<ValueType>()
                .map_err(|_| TagError::invalid_value_type(name))?,
            None if area.is_bit_area() => ValueType::Bool,
            None => ValueType::Word,
        };
        if parts.next().is_some() {
            return Err(TagError::malformed(s));
        }

        ModbusTag::new(area, (address - 1) as u16, value_type, count)
    }
}

/// Split a trailing `[COUNT]` off an address
pub(crate) fn split_count(s: &str) -> Result<(&str, u16)> {
    match s.strip_suffix(']') {
        Some(rest) => {
            let open = rest.rfind('[').ok_or_else(|| TagError::malformed(s))?;
            let count = rest[open + 1..]
                .parse::<u16>()
                .map_err(|_| TagError::invalid_count(&rest[open + 1..]))?;
            Ok((&rest[..open], count))
        }
        None => Ok((s, 1)),
    }
}
