/*!
 * Header fields of a DL/T 645-2007 frame: the meter address, the control
 * code and the error status word of exception responses.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wireflow_core::types::ResponseCode;

use crate::error::TagError;

/// Six-byte meter address, stored in wire order (least significant byte first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeterAddress(pub [u8; 6]);

impl MeterAddress {
    /// Address every meter on the bus answers to for commands without a response
    pub const BROADCAST: MeterAddress = MeterAddress([0x99; 6]);

    /// Wildcard used to ask the only meter on the bus for its address
    pub const WILDCARD: MeterAddress = MeterAddress([0xAA; 6]);

    /// Wire bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Whether this is the wildcard address
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }

    /// Pack into the low 48 bits of a `u64`
    pub fn to_u64(self) -> u64 {
        self.0
            .iter()
            .rev()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
    }

    /// Unpack from the low 48 bits of a `u64`
    pub fn from_u64(packed: u64) -> Self {
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (packed >> (8 * i)) as u8;
        }
        MeterAddress(bytes)
    }
}

impl fmt::Display for MeterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for MeterAddress {
    type Err = TagError;

    /// Parse the twelve digits printed on the meter, most significant first
    fn from_str(s: &str) -> Result<Self, TagError> {
        let s = s.trim();
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_digit() || b.eq_ignore_ascii_case(&b'a')) {
            return Err(TagError::address_out_of_range(format!(
                "meter address '{}' is not twelve digits",
                s
            )));
        }
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[10 - 2 * i..12 - 2 * i];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| TagError::malformed(s))?;
        }
        Ok(MeterAddress(bytes))
    }
}

/// Function field (D0..D4) of the control code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dlt645Function {
    /// 01000
    BroadcastTimeSync,
    /// 10001
    ReadData,
    /// 10010
    ReadFollowingData,
    /// 10011
    ReadAddress,
    /// 10100
    WriteData,
    /// 10101
    WriteAddress,
    /// 10110
    Freeze,
    /// 10111
    ChangeBaudRate,
    /// 11000
    ChangePassword,
    /// 11001
    ClearMaxDemand,
    /// 11010
    ClearMeter,
    /// 11011
    ClearEvents,
    /// Any other pattern
    Other(u8),
}

impl Dlt645Function {
    /// Decode the low five bits of a control code
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x1F {
            0b01000 => Dlt645Function::BroadcastTimeSync,
            0b10001 => Dlt645Function::ReadData,
            0b10010 => Dlt645Function::ReadFollowingData,
            0b10011 => Dlt645Function::ReadAddress,
            0b10100 => Dlt645Function::WriteData,
            0b10101 => Dlt645Function::WriteAddress,
            0b10110 => Dlt645Function::Freeze,
            0b10111 => Dlt645Function::ChangeBaudRate,
            0b11000 => Dlt645Function::ChangePassword,
            0b11001 => Dlt645Function::ClearMaxDemand,
            0b11010 => Dlt645Function::ClearMeter,
            0b11011 => Dlt645Function::ClearEvents,
            other => Dlt645Function::Other(other),
        }
    }

    /// Low five bits of the control code
    pub fn bits(self) -> u8 {
        match self {
            Dlt645Function::BroadcastTimeSync => 0b01000,
            Dlt645Function::ReadData => 0b10001,
            Dlt645Function::ReadFollowingData => 0b10010,
            Dlt645Function::ReadAddress => 0b10011,
            Dlt645Function::WriteData => 0b10100,
            Dlt645Function::WriteAddress => 0b10101,
            Dlt645Function::Freeze => 0b10110,
            Dlt645Function::ChangeBaudRate => 0b10111,
            Dlt645Function::ChangePassword => 0b11000,
            Dlt645Function::ClearMaxDemand => 0b11001,
            Dlt645Function::ClearMeter => 0b11010,
            Dlt645Function::ClearEvents => 0b11011,
            Dlt645Function::Other(bits) => bits & 0x1F,
        }
    }
}

const RESPONSE: u8 = 0x80;
const EXCEPTION: u8 = 0x40;
const FOLLOWING: u8 = 0x20;

/// The control code byte
///
/// Everything but the raw byte is derived: D7 marks a response, D6 an
/// exception response, D5 a response continued in a following frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlCode(pub u8);

impl ControlCode {
    /// Request from the master station
    pub fn request(function: Dlt645Function) -> Self {
        ControlCode(function.bits())
    }

    /// Normal response from the meter
    pub fn response(function: Dlt645Function) -> Self {
        ControlCode(RESPONSE | function.bits())
    }

    /// Exception response from the meter
    pub fn exception(function: Dlt645Function) -> Self {
        ControlCode(RESPONSE | EXCEPTION | function.bits())
    }

    /// The same control code with the following-frame flag set
    pub fn with_following(self) -> Self {
        ControlCode(self.0 | FOLLOWING)
    }

    /// Function field
    pub fn function(&self) -> Dlt645Function {
        Dlt645Function::from_bits(self.0)
    }

    /// Whether the frame travels from the meter to the master
    pub fn is_response(&self) -> bool {
        self.0 & RESPONSE != 0
    }

    /// Whether the meter rejected the request
    pub fn is_exception(&self) -> bool {
        self.0 & EXCEPTION != 0
    }

    /// Whether more data follows in another frame
    pub fn has_following(&self) -> bool {
        self.0 & FOLLOWING != 0
    }
}

impl fmt::Debug for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ControlCode({:#04x} {:?}{}{}{})",
            self.0,
            self.function(),
            if self.is_response() { " response" } else { "" },
            if self.is_exception() { " exception" } else { "" },
            if self.has_following() { " following" } else { "" }
        )
    }
}

/// Error status word carried by exception responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorStatus(pub u8);

impl ErrorStatus {
    /// Unspecified error
    pub const OTHER: u8 = 0x01;
    /// The requested data identifier is not available
    pub const NO_DATA: u8 = 0x02;
    /// Wrong password or unauthorized
    pub const UNAUTHORIZED: u8 = 0x04;
    /// Communication rate cannot be changed
    pub const BAUD_RATE_FIXED: u8 = 0x08;
    /// Too many annual time zones
    pub const TOO_MANY_ZONES: u8 = 0x10;
    /// Too many daily periods
    pub const TOO_MANY_PERIODS: u8 = 0x20;
    /// Too many tariffs
    pub const TOO_MANY_TARIFFS: u8 = 0x40;

    /// Whether `flag` is set
    pub fn has(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Per-tag response code the status is reported as
    pub fn response_code(&self) -> ResponseCode {
        if self.has(Self::NO_DATA) {
            ResponseCode::NotFound
        } else if self.has(Self::UNAUTHORIZED) {
            ResponseCode::AccessDenied
        } else if self.has(
            Self::BAUD_RATE_FIXED
                | Self::TOO_MANY_ZONES
                | Self::TOO_MANY_PERIODS
                | Self::TOO_MANY_TARIFFS,
        ) {
            ResponseCode::InvalidData
        } else {
            ResponseCode::RemoteError
        }
    }
}
