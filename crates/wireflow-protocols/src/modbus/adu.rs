/*!
 * Modbus/TCP application data unit.
 *
 * MBAP header (transaction id, protocol id, length, unit id) followed by the
 * PDU. The length field counts the unit id and the PDU and is derived on
 * write; the protocol id is reserved and always 0.
 */
use wireflow_codec::field::{read_implicit, read_reserved, write_implicit, write_reserved};
use wireflow_codec::write_buffer::in_context;
use wireflow_codec::{CodecError, Message, Parse, ReadBuffer, Result, WriteBuffer};

use super::pdu::ModbusPdu;

/// Bytes of the MBAP header before the unit id
pub const MBAP_PREFIX_LENGTH: usize = 6;

/// Largest ADU the protocol allows
pub const MAX_ADU_LENGTH: usize = 260;

/// Value of the reserved protocol id
pub const PROTOCOL_ID: u16 = 0x0000;

/// A Modbus/TCP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusTcpAdu {
    /// Correlates a response with its request
    pub transaction_id: u16,
    /// Addressed unit behind a gateway
    pub unit_id: u8,
    /// Protocol data unit
    pub pdu: ModbusPdu,
}

impl ModbusTcpAdu {
    /// Create a new ADU
    pub fn new(transaction_id: u16, unit_id: u8, pdu: ModbusPdu) -> Self {
        Self {
            transaction_id,
            unit_id,
            pdu,
        }
    }
}

impl Message for ModbusTcpAdu {
    fn type_name(&self) -> &'static str {
        "ModbusTcpAdu"
    }

    fn length_in_bits(&self) -> usize {
        (MBAP_PREFIX_LENGTH + 1) * 8 + self.pdu.length_in_bits()
    }

    fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()> {
        in_context(writer, "ModbusTcpAdu", |w| {
            w.write_u16(self.transaction_id, "transactionIdentifier")?;
            write_reserved(w, "protocolIdentifier", 16, u64::from(PROTOCOL_ID))?;
            let length = 1 + self.pdu.length_in_bits() / 8;
            write_implicit(w, "length", 16, length as u64)?;
            w.write_u8(self.unit_id, "unitIdentifier")?;
            in_context(w, "pdu", |w| self.pdu.serialize(w))
        })
    }
}

impl Parse for ModbusTcpAdu {
    /// Whether the ADU travels from server to client
    type Args = bool;

    fn parse(reader: &mut ReadBuffer<'_>, response: bool) -> Result<Self> {
        reader.in_context("ModbusTcpAdu", |r| {
            let transaction_id = r.in_context("transactionIdentifier", |r| r.read_u16())?;
            read_reserved(r, "protocolIdentifier", 16, u64::from(PROTOCOL_ID))?;
            let length = read_implicit(r, "length", 16)? as usize;
            if length < 2 {
                return Err(CodecError::invalid_value(
                    r.field_path("length"),
                    format!("{} bytes cannot hold a unit id and a function code", length),
                ));
            }
            let unit_id = r.in_context("unitIdentifier", |r| r.read_u8())?;

            let end = r.position() + (length - 1) * 8;
            let pdu = r.in_context("pdu", |r| ModbusPdu::parse(r, response))?;
            if r.position() != end {
                return Err(CodecError::invalid_value(
                    r.field_path("pdu"),
                    format!(
                        "header announces {} PDU bytes, body used {}",
                        length - 1,
                        pdu.length_in_bits() / 8
                    ),
                ));
            }
            Ok(ModbusTcpAdu {
                transaction_id,
                unit_id,
                pdu,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::pdu::FunctionCode;

    #[test]
    fn test_read_request_frame() {
        let adu = ModbusTcpAdu::new(
            0x0001,
            0x11,
            ModbusPdu::ReadRequest {
                function: FunctionCode::ReadHoldingRegisters,
                starting_address: 0x006B,
                quantity: 3,
            },
        );
        let bytes = adu.to_bytes().unwrap();
        assert_eq!(
            bytes,
            vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
        assert_eq!(ModbusTcpAdu::from_bytes(&bytes, false).unwrap(), adu);
    }

    #[test]
    fn test_nonzero_protocol_id_is_only_a_warning() {
        let bytes = [0x00, 0x07, 0x00, 0x01, 0x00, 0x03, 0x01, 0x83, 0x02];
        let mut reader = ReadBuffer::new(&bytes);
        let adu = ModbusTcpAdu::parse(&mut reader, true).unwrap();
        assert!(adu.pdu.is_exception());
        assert_eq!(reader.warnings().len(), 1);
        assert!(reader.warnings()[0].is_soft());
    }

    #[test]
    fn test_length_must_cover_the_pdu() {
        // Header announces one extra byte
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x83, 0x02, 0x00];
        match ModbusTcpAdu::from_bytes(&bytes, true) {
            Err(CodecError::InvalidValue { context, .. }) => assert_eq!(context, "ModbusTcpAdu/pdu"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_diagnostic_json_follows_contexts() {
        let adu = ModbusTcpAdu::new(
            9,
            1,
            ModbusPdu::WriteSingleRegister {
                address: 4,
                value: 0x1234,
            },
        );
        let json = adu.to_json().unwrap();
        assert_eq!(json["ModbusTcpAdu"]["transactionIdentifier"], 9);
        assert_eq!(json["ModbusTcpAdu"]["pdu"]["ModbusPdu"]["value"], 0x1234);
    }
}
