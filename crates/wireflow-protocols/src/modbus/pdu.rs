/*!
 * Modbus protocol data units.
 *
 * The first PDU byte is a one-bit error flag followed by a seven-bit
 * function code. Together with the direction of the message they select the
 * body layout through [`PDUS`].
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use wireflow_codec::field::{
    read_array, read_implicit, write_array, write_implicit, ArrayBound,
};
use wireflow_codec::write_buffer::in_context;
use wireflow_codec::{CodecError, ReadBuffer, Result, SwitchCase, SwitchTable, WriteBuffer};
use wireflow_core::types::ResponseCode;

/// Function codes this catalog understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read coils (0x01)
    ReadCoils = 0x01,
    /// Read discrete inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read holding registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read input registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write single coil (0x05)
    WriteSingleCoil = 0x05,
    /// Write single register (0x06)
    WriteSingleRegister = 0x06,
    /// Write multiple coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write multiple registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        match code {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x02 => Ok(FunctionCode::ReadDiscreteInputs),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x05 => Ok(FunctionCode::WriteSingleCoil),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            0x0F => Ok(FunctionCode::WriteMultipleCoils),
            0x10 => Ok(FunctionCode::WriteMultipleRegisters),
            other => Err(other),
        }
    }
}

/// Exception code of an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x07
    NegativeAcknowledge,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetFailed,
    /// Any code not listed above
    Other(u8),
}

impl ExceptionCode {
    /// Wire value
    pub fn code(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::NegativeAcknowledge => 0x07,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailed => 0x0B,
            ExceptionCode::Other(code) => code,
        }
    }

    /// Per-tag response code an exception is reported as
    pub fn response_code(self) -> ResponseCode {
        match self {
            ExceptionCode::IllegalFunction => ResponseCode::Unsupported,
            ExceptionCode::IllegalDataAddress => ResponseCode::InvalidAddress,
            ExceptionCode::IllegalDataValue => ResponseCode::InvalidData,
            ExceptionCode::ServerDeviceFailure => ResponseCode::RemoteError,
            ExceptionCode::Acknowledge => ResponseCode::Ok,
            ExceptionCode::ServerDeviceBusy => ResponseCode::RemoteBusy,
            ExceptionCode::NegativeAcknowledge => ResponseCode::RemoteError,
            ExceptionCode::MemoryParityError => ResponseCode::InternalError,
            ExceptionCode::GatewayPathUnavailable => ResponseCode::InternalError,
            ExceptionCode::GatewayTargetFailed => ResponseCode::RemoteError,
            ExceptionCode::Other(_) => ResponseCode::InternalError,
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x07 => ExceptionCode::NegativeAcknowledge,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailed,
            other => ExceptionCode::Other(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#04x})", self, self.code())
    }
}

/// A Modbus PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusPdu {
    /// Error response to `function`
    Exception {
        /// Function code of the failed request, without the error bit
        function: u8,
        /// Reason
        code: ExceptionCode,
    },
    /// Read request for coils, discrete inputs or registers
    ReadRequest {
        /// One of the four read functions
        function: FunctionCode,
        /// Protocol (zero-based) address of the first item
        starting_address: u16,
        /// Number of bits or registers
        quantity: u16,
    },
    /// Packed bits answering a coil or discrete input read
    ReadBitsResponse {
        /// `ReadCoils` or `ReadDiscreteInputs`
        function: FunctionCode,
        /// Bits, least significant bit of the first byte first
        bits: Vec<u8>,
    },
    /// Registers answering a holding or input register read
    ReadRegistersResponse {
        /// `ReadHoldingRegisters` or `ReadInputRegisters`
        function: FunctionCode,
        /// Register values
        registers: Vec<u16>,
    },
    /// Write one coil; the response echoes the request
    WriteSingleCoil {
        /// Coil address
        address: u16,
        /// New state
        value: bool,
    },
    /// Write one register; the response echoes the request
    WriteSingleRegister {
        /// Register address
        address: u16,
        /// New value
        value: u16,
    },
    /// Write consecutive coils
    WriteMultipleCoilsRequest {
        /// Address of the first coil
        starting_address: u16,
        /// New states
        values: Vec<bool>,
    },
    /// Write consecutive registers
    WriteMultipleRegistersRequest {
        /// Address of the first register
        starting_address: u16,
        /// New values
        registers: Vec<u16>,
    },
    /// Acknowledgement of a multiple coil or register write
    WriteMultipleResponse {
        /// `WriteMultipleCoils` or `WriteMultipleRegisters`
        function: FunctionCode,
        /// Address of the first item written
        starting_address: u16,
        /// Number of items written
        quantity: u16,
    },
}

/// Discriminator of [`PDUS`]: error flag, function code and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduKey {
    /// Error flag
    pub error: bool,
    /// Function code without the error flag
    pub function: u8,
    /// Whether the PDU travels from server to client
    pub response: bool,
}

impl PduKey {
    fn is(&self, function: FunctionCode) -> bool {
        self.function == function.code()
    }

    fn is_read(&self) -> bool {
        (0x01..=0x04).contains(&self.function)
    }
}

/// Body layouts of every PDU this catalog parses
pub static PDUS: SwitchTable<PduKey, ModbusPdu, u8> = SwitchTable::new(
    "ModbusPdu",
    &[
        SwitchCase {
            name: "Exception",
            matches: |key| key.error,
            parse: parse_exception,
        },
        SwitchCase {
            name: "ReadRequest",
            matches: |key| !key.response && key.is_read(),
            parse: parse_read_request,
        },
        SwitchCase {
            name: "ReadBitsResponse",
            matches: |key| key.response && (0x01..=0x02).contains(&key.function),
            parse: parse_read_bits_response,
        },
        SwitchCase {
            name: "ReadRegistersResponse",
            matches: |key| key.response && (0x03..=0x04).contains(&key.function),
            parse: parse_read_registers_response,
        },
        SwitchCase {
            name: "WriteSingleCoil",
            matches: |key| key.is(FunctionCode::WriteSingleCoil),
            parse: parse_write_single_coil,
        },
        SwitchCase {
            name: "WriteSingleRegister",
            matches: |key| key.is(FunctionCode::WriteSingleRegister),
            parse: parse_write_single_register,
        },
        SwitchCase {
            name: "WriteMultipleCoilsRequest",
            matches: |key| !key.response && key.is(FunctionCode::WriteMultipleCoils),
            parse: parse_write_multiple_coils_request,
        },
        SwitchCase {
            name: "WriteMultipleRegistersRequest",
            matches: |key| !key.response && key.is(FunctionCode::WriteMultipleRegisters),
            parse: parse_write_multiple_registers_request,
        },
        SwitchCase {
            name: "WriteMultipleResponse",
            matches: |key| {
                key.response
                    && (key.is(FunctionCode::WriteMultipleCoils)
                        || key.is(FunctionCode::WriteMultipleRegisters))
            },
            parse: parse_write_multiple_response,
        },
    ],
);

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

fn function_code(reader: &ReadBuffer<'_>, code: u8) -> Result<FunctionCode> {
    FunctionCode::try_from(code).map_err(|code| {
        CodecError::invalid_value(reader.context_path(), format!("function {:#04x}", code))
    })
}

fn parse_exception(reader: &mut ReadBuffer<'_>, function: u8) -> Result<ModbusPdu> {
    let code = reader.in_context("exceptionCode", |r| r.read_u8())?;
    Ok(ModbusPdu::Exception {
        function,
        code: ExceptionCode::from(code),
    })
}

fn parse_read_request(reader: &mut ReadBuffer<'_>, function: u8) -> Result<ModbusPdu> {
    let function = function_code(reader, function)?;
    let starting_address = reader.in_context("startingAddress", |r| r.read_u16())?;
    let quantity = reader.in_context("quantity", |r| r.read_u16())?;
    Ok(ModbusPdu::ReadRequest {
        function,
        starting_address,
        quantity,
    })
}

fn parse_read_bits_response(reader: &mut ReadBuffer<'_>, function: u8) -> Result<ModbusPdu> {
    let function = function_code(reader, function)?;
    let byte_count = read_implicit(reader, "byteCount", 8)? as usize;
    let bits = read_array(reader, "value", ArrayBound::Count(byte_count), |r| r.read_u8())?;
    Ok(ModbusPdu::ReadBitsResponse { function, bits })
}

fn parse_read_registers_response(reader: &mut ReadBuffer<'_>, function: u8) -> Result<ModbusPdu> {
    let function = function_code(reader, function)?;
    let byte_count = read_implicit(reader, "byteCount", 8)? as usize;
    if byte_count % 2 != 0 {
        return Err(CodecError::invalid_value(
            reader.field_path("byteCount"),
            format!("odd register byte count {}", byte_count),
        ));
    }
    let registers = read_array(reader, "value", ArrayBound::LengthInBytes(byte_count), |r| {
        r.read_u16()
    })?;
    Ok(ModbusPdu::ReadRegistersResponse {
        function,
        registers,
    })
}

fn parse_write_single_coil(reader: &mut ReadBuffer<'_>, _: u8) -> Result<ModbusPdu> {
    let address = reader.in_context("address", |r| r.read_u16())?;
    let raw = reader.in_context("value", |r| r.read_u16())?;
    let value = match raw {
        COIL_ON => true,
        COIL_OFF => false,
        other => {
            return Err(CodecError::invalid_value(
                reader.field_path("value"),
                format!("coil state {:#06x}", other),
            ))
        }
    };
    Ok(ModbusPdu::WriteSingleCoil { address, value })
}

fn parse_write_single_register(reader: &mut ReadBuffer<'_>, _: u8) -> Result<ModbusPdu> {
    let address = reader.in_context("address", |r| r.read_u16())?;
    let value = reader.in_context("value", |r| r.read_u16())?;
    Ok(ModbusPdu::WriteSingleRegister { address, value })
}

fn parse_write_multiple_coils_request(reader: &mut ReadBuffer<'_>, _: u8) -> Result<ModbusPdu> {
    let starting_address = reader.in_context("startingAddress", |r| r.read_u16())?;
    let quantity = read_implicit(reader, "quantity", 16)? as usize;
    let byte_count = read_implicit(reader, "byteCount", 8)? as usize;
    if byte_count != (quantity + 7) / 8 {
        return Err(CodecError::invalid_value(
            reader.field_path("byteCount"),
            format!("{} bytes cannot hold {} coils", byte_count, quantity),
        ));
    }
    let packed = read_array(reader, "value", ArrayBound::Count(byte_count), |r| r.read_u8())?;
    Ok(ModbusPdu::WriteMultipleCoilsRequest {
        starting_address,
        values: unpack_bits(&packed, quantity),
    })
}

fn parse_write_multiple_registers_request(
    reader: &mut ReadBuffer<'_>,
    _: u8,
) -> Result<ModbusPdu> {
    let starting_address = reader.in_context("startingAddress", |r| r.read_u16())?;
    let quantity = read_implicit(reader, "quantity", 16)? as usize;
    let byte_count = read_implicit(reader, "byteCount", 8)? as usize;
    if byte_count != quantity * 2 {
        return Err(CodecError::invalid_value(
            reader.field_path("byteCount"),
            format!("{} bytes for {} registers", byte_count, quantity),
        ));
    }
    let registers = read_array(reader, "value", ArrayBound::Count(quantity), |r| r.read_u16())?;
    Ok(ModbusPdu::WriteMultipleRegistersRequest {
        starting_address,
        registers,
    })
}

fn parse_write_multiple_response(reader: &mut ReadBuffer<'_>, function: u8) -> Result<ModbusPdu> {
    let function = function_code(reader, function)?;
    let starting_address = reader.in_context("startingAddress", |r| r.read_u16())?;
    let quantity = reader.in_context("quantity", |r| r.read_u16())?;
    Ok(ModbusPdu::WriteMultipleResponse {
        function,
        starting_address,
        quantity,
    })
}

/// Pack bits least significant bit first, as coil values travel
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; (values.len() + 7) / 8];
    for (i, value) in values.iter().enumerate() {
        if *value {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Unpack the first `count` bits of `packed`
pub fn unpack_bits(packed: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| packed.get(i / 8).map_or(false, |byte| byte & (1 << (i % 8)) != 0))
        .collect()
}

impl ModbusPdu {
    /// Function code without the error flag
    pub fn function(&self) -> u8 {
        match self {
            ModbusPdu::Exception { function, .. } => *function,
            ModbusPdu::ReadRequest { function, .. }
            | ModbusPdu::ReadBitsResponse { function, .. }
            | ModbusPdu::ReadRegistersResponse { function, .. }
            | ModbusPdu::WriteMultipleResponse { function, .. } => function.code(),
            ModbusPdu::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil.code(),
            ModbusPdu::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister.code(),
            ModbusPdu::WriteMultipleCoilsRequest { .. } => FunctionCode::WriteMultipleCoils.code(),
            ModbusPdu::WriteMultipleRegistersRequest { .. } => {
                FunctionCode::WriteMultipleRegisters.code()
            }
        }
    }

    /// Whether this is an exception response
    pub fn is_exception(&self) -> bool {
        matches!(self, ModbusPdu::Exception { .. })
    }

    /// Bit `index` of a bit read response, least significant bit first
    pub fn bit(&self, index: usize) -> Option<bool> {
        match self {
            ModbusPdu::ReadBitsResponse { bits, .. } => bits
                .get(index / 8)
                .map(|byte| byte & (1 << (index % 8)) != 0),
            _ => None,
        }
    }

    /// Encoded length in bits, error flag and function code included
    pub fn length_in_bits(&self) -> usize {
        let body_bytes = match self {
            ModbusPdu::Exception { .. } => 1,
            ModbusPdu::ReadRequest { .. } => 4,
            ModbusPdu::ReadBitsResponse { bits, .. } => 1 + bits.len(),
            ModbusPdu::ReadRegistersResponse { registers, .. } => 1 + registers.len() * 2,
            ModbusPdu::WriteSingleCoil { .. } | ModbusPdu::WriteSingleRegister { .. } => 4,
            ModbusPdu::WriteMultipleCoilsRequest { values, .. } => 5 + (values.len() + 7) / 8,
            ModbusPdu::WriteMultipleRegistersRequest { registers, .. } => 5 + registers.len() * 2,
            ModbusPdu::WriteMultipleResponse { .. } => 4,
        };
        (1 + body_bytes) * 8
    }

    /// Parse a PDU travelling in the given direction
    pub fn parse(reader: &mut ReadBuffer<'_>, response: bool) -> Result<Self> {
        reader.in_context("ModbusPdu", |r| {
            let error = r.in_context("errorFlag", |r| r.read_bit())?;
            let function = r.in_context("functionFlag", |r| r.read_unsigned(7))? as u8;
            let key = PduKey {
                error,
                function,
                response,
            };
            PDUS.parse(&key, r, function)
        })
    }

    /// Write the PDU
    pub fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()> {
        in_context(writer, "ModbusPdu", |w| {
            w.write_bit(self.is_exception(), "errorFlag")?;
            w.write_unsigned(7, u64::from(self.function()), "functionFlag")?;
            match self {
                ModbusPdu::Exception { code, .. } => w.write_u8(code.code(), "exceptionCode"),
                ModbusPdu::ReadRequest {
                    starting_address,
                    quantity,
                    ..
                } => {
                    w.write_u16(*starting_address, "startingAddress")?;
                    w.write_u16(*quantity, "quantity")
                }
                ModbusPdu::ReadBitsResponse { bits, .. } => {
                    write_implicit(w, "byteCount", 8, bits.len() as u64)?;
                    write_array(w, "value", bits, |b, w| w.write_u8(*b, "value"))
                }
                ModbusPdu::ReadRegistersResponse { registers, .. } => {
                    write_implicit(w, "byteCount", 8, (registers.len() * 2) as u64)?;
                    write_array(w, "value", registers, |v, w| w.write_u16(*v, "value"))
                }
                ModbusPdu::WriteSingleCoil { address, value } => {
                    w.write_u16(*address, "address")?;
                    w.write_u16(if *value { COIL_ON } else { COIL_OFF }, "value")
                }
                ModbusPdu::WriteSingleRegister { address, value } => {
                    w.write_u16(*address, "address")?;
                    w.write_u16(*value, "value")
                }
                ModbusPdu::WriteMultipleCoilsRequest {
                    starting_address,
                    values,
                } => {
                    let packed = pack_bits(values);
                    w.write_u16(*starting_address, "startingAddress")?;
                    write_implicit(w, "quantity", 16, values.len() as u64)?;
                    write_implicit(w, "byteCount", 8, packed.len() as u64)?;
                    write_array(w, "value", &packed, |b, w| w.write_u8(*b, "value"))
                }
                ModbusPdu::WriteMultipleRegistersRequest {
                    starting_address,
                    registers,
                } => {
                    w.write_u16(*starting_address, "startingAddress")?;
                    write_implicit(w, "quantity", 16, registers.len() as u64)?;
                    write_implicit(w, "byteCount", 8, (registers.len() * 2) as u64)?;
                    write_array(w, "value", registers, |v, w| w.write_u16(*v, "value"))
                }
                ModbusPdu::WriteMultipleResponse {
                    starting_address,
                    quantity,
                    ..
                } => {
                    w.write_u16(*starting_address, "startingAddress")?;
                    w.write_u16(*quantity, "quantity")
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wireflow_codec::ByteWriteBuffer;

    fn encode(pdu: &ModbusPdu) -> Vec<u8> {
        let mut writer = ByteWriteBuffer::growable();
        pdu.serialize(&mut writer).unwrap();
        assert_eq!(writer.position(), pdu.length_in_bits());
        writer.into_bytes()
    }

    #[test]
    fn test_read_request_layout() {
        let pdu = ModbusPdu::ReadRequest {
            function: FunctionCode::ReadHoldingRegisters,
            starting_address: 0x006B,
            quantity: 3,
        };
        assert_eq!(encode(&pdu), vec![0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn test_exception_sets_error_flag() {
        let bytes = [0x83, 0x02];
        let mut reader = ReadBuffer::new(&bytes);
        let pdu = ModbusPdu::parse(&mut reader, true).unwrap();
        assert_eq!(
            pdu,
            ModbusPdu::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataAddress,
            }
        );
        assert_eq!(encode(&pdu), bytes.to_vec());
    }

    #[test]
    fn test_direction_selects_layout() {
        // Same function code, request and response bodies differ
        let request = [0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02];
        let mut reader = ReadBuffer::new(&request);
        assert_eq!(
            ModbusPdu::parse(&mut reader, false).unwrap(),
            ModbusPdu::WriteMultipleRegistersRequest {
                starting_address: 1,
                registers: vec![0x000A, 0x0102],
            }
        );

        let response = [0x10, 0x00, 0x01, 0x00, 0x02];
        let mut reader = ReadBuffer::new(&response);
        assert_eq!(
            ModbusPdu::parse(&mut reader, true).unwrap(),
            ModbusPdu::WriteMultipleResponse {
                function: FunctionCode::WriteMultipleRegisters,
                starting_address: 1,
                quantity: 2,
            }
        );
    }

    #[test]
    fn test_bits_are_least_significant_first() {
        let bytes = [0x01, 0x02, 0xCD, 0x01];
        let mut reader = ReadBuffer::new(&bytes);
        let pdu = ModbusPdu::parse(&mut reader, true).unwrap();
        assert_eq!(pdu.bit(0), Some(true));
        assert_eq!(pdu.bit(1), Some(false));
        assert_eq!(pdu.bit(2), Some(true));
        assert_eq!(pdu.bit(8), Some(true));
        assert_eq!(pdu.bit(9), Some(false));
        assert_eq!(pdu.bit(16), None);
        assert_eq!(pack_bits(&unpack_bits(&[0xCD, 0x01], 10)), vec![0xCD, 0x01]);
    }

    #[test]
    fn test_odd_register_byte_count_names_the_field() {
        let bytes = [0x03, 0x03, 0x00, 0x01, 0x02];
        let mut reader = ReadBuffer::new(&bytes);
        match ModbusPdu::parse(&mut reader, true) {
            Err(CodecError::InvalidValue { context, .. }) => {
                assert_eq!(context, "ModbusPdu/ReadRegistersResponse/byteCount")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function() {
        let bytes = [0x2B, 0x0E];
        let mut reader = ReadBuffer::new(&bytes);
        assert!(matches!(
            ModbusPdu::parse(&mut reader, true),
            Err(CodecError::UnknownDiscriminator { type_name: "ModbusPdu", .. })
        ));
    }

    #[test]
    fn test_coil_state_must_be_on_or_off() {
        let bytes = [0x05, 0x00, 0x01, 0x12, 0x34];
        let mut reader = ReadBuffer::new(&bytes);
        assert!(ModbusPdu::parse(&mut reader, false).is_err());
    }

    #[test]
    fn test_exception_response_codes() {
        assert_eq!(
            ExceptionCode::from(0x02u8).response_code(),
            ResponseCode::InvalidAddress
        );
        assert_eq!(ExceptionCode::from(0x06u8).response_code(), ResponseCode::RemoteBusy);
        assert_eq!(
            ExceptionCode::from(0x7Fu8).response_code(),
            ResponseCode::InternalError
        );
        assert_eq!(ExceptionCode::from(0x0Bu8).code(), 0x0B);
    }
}
