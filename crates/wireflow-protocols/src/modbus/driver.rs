/*!
 * Modbus/TCP protocol driver.
 *
 * Each tag is served by its own exchange, dispatched concurrently; the
 * transaction id of the MBAP header correlates responses, so devices that
 * pipeline requests answer them in any order.
 */
use bytes::BytesMut;
use tracing::{debug, trace};
use wireflow_codec::frame::discard_until;
use wireflow_codec::{FrameDetector, FrameLength, MessageCatalog, Parse, Result};
use wireflow_core::types::{ResponseCode, Value};
use wireflow_engine::{
    Operation, Optimizer, PerTagOptimizer, ProtocolDriver, SubRequest, TagResponse,
    TransactionIds, WireRequest,
};

use super::adu::{ModbusTcpAdu, MAX_ADU_LENGTH, MBAP_PREFIX_LENGTH, PROTOCOL_ID};
use super::pdu::ModbusPdu;
use super::tag::{ModbusArea, ModbusTag};
use super::values;

/// Unit id addressed when none is configured
pub const DEFAULT_UNIT_ID: u8 = 1;

/// Frame boundaries of Modbus/TCP
///
/// The MBAP length field gives the size of everything after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModbusTcpDetector;

impl FrameDetector for ModbusTcpDetector {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        if prefix.len() < MBAP_PREFIX_LENGTH {
            return FrameLength::Insufficient;
        }
        let length = u16::from_be_bytes([prefix[4], prefix[5]]);
        FrameLength::Complete(MBAP_PREFIX_LENGTH + usize::from(length))
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        discard_until(buffer, plausible_header)
    }
}

/// Whether `rest` may start an MBAP header: protocol id 0 and a length that
/// fits a unit id, a function code and the largest PDU
fn plausible_header(rest: &[u8]) -> bool {
    if rest.len() < MBAP_PREFIX_LENGTH {
        return true;
    }
    let protocol = u16::from_be_bytes([rest[2], rest[3]]);
    let length = usize::from(u16::from_be_bytes([rest[4], rest[5]]));
    protocol == PROTOCOL_ID && (2..=MAX_ADU_LENGTH - MBAP_PREFIX_LENGTH).contains(&length)
}

/// Driver of a Modbus/TCP client connection
pub struct ModbusTcpDriver {
    unit_id: u8,
    transactions: TransactionIds,
    optimizer: PerTagOptimizer,
}

impl Default for ModbusTcpDriver {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_ID)
    }
}

impl std::fmt::Debug for ModbusTcpDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTcpDriver")
            .field("unit_id", &self.unit_id)
            .finish()
    }
}

impl ModbusTcpDriver {
    /// Create a driver addressing `unit_id`
    pub fn new(unit_id: u8) -> Self {
        Self {
            unit_id,
            transactions: TransactionIds::new(),
            optimizer: PerTagOptimizer::concurrent(),
        }
    }

    /// Send one exchange at a time, for devices that do not pipeline
    pub fn with_sequential_dispatch(mut self) -> Self {
        self.optimizer = PerTagOptimizer::sequential();
        self
    }

    /// Addressed unit id
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    fn wire_request(&self, pdu: ModbusPdu) -> WireRequest<ModbusTcpAdu> {
        let transaction_id = self.transactions.next_id();
        let unit_id = self.unit_id;
        let function = pdu.function();
        let request = ModbusTcpAdu::new(transaction_id, unit_id, pdu);
        WireRequest::new(request, move |response: &ModbusTcpAdu| {
            response.transaction_id == transaction_id
                && response.unit_id == unit_id
                && response.pdu.function() == function
        })
    }

    fn write_pdu(tag: &ModbusTag, value: &Value) -> std::result::Result<ModbusPdu, ResponseCode> {
        match tag.area {
            ModbusArea::Coil => {
                let bits = values::encode_bits(tag, value)?;
                Ok(match bits.as_slice() {
                    [single] => ModbusPdu::WriteSingleCoil {
                        address: tag.address,
                        value: *single,
                    },
                    _ => ModbusPdu::WriteMultipleCoilsRequest {
                        starting_address: tag.address,
                        values: bits,
                    },
                })
            }
            ModbusArea::HoldingRegister => {
                let registers = values::encode_registers(tag, value)?;
                Ok(match registers.as_slice() {
                    [single] => ModbusPdu::WriteSingleRegister {
                        address: tag.address,
                        value: *single,
                    },
                    _ => ModbusPdu::WriteMultipleRegistersRequest {
                        starting_address: tag.address,
                        registers,
                    },
                })
            }
            ModbusArea::DiscreteInput | ModbusArea::InputRegister => {
                Err(ResponseCode::AccessDenied)
            }
        }
    }

    fn decode_one(
        operation: Operation,
        tag: &ModbusTag,
        pdu: ModbusPdu,
    ) -> std::result::Result<Option<Value>, ResponseCode> {
        match (operation, pdu) {
            (_, ModbusPdu::Exception { code, .. }) => {
                debug!("{} answered with exception {}", tag, code);
                match code.response_code() {
                    ResponseCode::Ok => Ok(None),
                    failure => Err(failure),
                }
            }
            (Operation::Read, ModbusPdu::ReadBitsResponse { bits, .. }) => {
                values::decode_bits(tag, &bits).map(Some)
            }
            (Operation::Read, ModbusPdu::ReadRegistersResponse { registers, .. }) => {
                values::decode_registers(tag, &registers).map(Some)
            }
            (Operation::Write, ModbusPdu::WriteSingleCoil { .. })
            | (Operation::Write, ModbusPdu::WriteSingleRegister { .. }) => Ok(None),
            (Operation::Write, ModbusPdu::WriteMultipleResponse { quantity, .. }) => {
                if quantity == tag.quantity() {
                    Ok(None)
                } else {
                    debug!("{} wrote {} of {} items", tag, quantity, tag.quantity());
                    Err(ResponseCode::RemoteError)
                }
            }
            (_, other) => {
                debug!("Unexpected response {:?} to {} of {}", other, operation, tag);
                Err(ResponseCode::InternalError)
            }
        }
    }
}

impl FrameDetector for ModbusTcpDriver {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        ModbusTcpDetector.estimate_length(prefix)
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        ModbusTcpDetector.recover_from_corruption(buffer)
    }
}

impl MessageCatalog for ModbusTcpDriver {
    type Message = ModbusTcpAdu;

    fn protocol_name(&self) -> &'static str {
        "modbus-tcp"
    }

    fn decode(&self, frame: &[u8]) -> Result<ModbusTcpAdu> {
        trace!("Decoding {} byte Modbus/TCP frame", frame.len());
        ModbusTcpAdu::from_bytes(frame, true)
    }
}

impl ProtocolDriver for ModbusTcpDriver {
    type Tag = ModbusTag;

    fn optimizer(&self) -> &dyn Optimizer<ModbusTag> {
        &self.optimizer
    }

    fn encode_request(
        &self,
        operation: Operation,
        request: &SubRequest<ModbusTag>,
    ) -> std::result::Result<Option<WireRequest<ModbusTcpAdu>>, ResponseCode> {
        let item = match request.items.as_slice() {
            [item] => item,
            _ => return Err(ResponseCode::InternalError),
        };
        let tag = &item.tag;
        let pdu = match operation {
            Operation::Read => ModbusPdu::ReadRequest {
                function: tag.area.read_function(),
                starting_address: tag.address,
                quantity: tag.quantity(),
            },
            Operation::Write => {
                let value = item.value.as_ref().ok_or(ResponseCode::InvalidData)?;
                Self::write_pdu(tag, value)?
            }
            Operation::Subscribe => return Err(ResponseCode::Unsupported),
        };
        Ok(Some(self.wire_request(pdu)))
    }

    fn decode_response(
        &self,
        operation: Operation,
        request: &SubRequest<ModbusTag>,
        response: ModbusTcpAdu,
    ) -> Vec<TagResponse<ModbusTag>> {
        let mut responses = Vec::with_capacity(request.len());
        let mut pdu = Some(response.pdu);
        for tag in request.tags() {
            let outcome = match pdu.take() {
                Some(pdu) => Self::decode_one(operation, tag, pdu),
                None => Err(ResponseCode::InternalError),
            };
            responses.push(match outcome {
                Ok(Some(value)) => TagResponse::ok(*tag, value),
                Ok(None) => TagResponse::done(*tag),
                Err(code) => TagResponse::failed(*tag, code),
            });
        }
        responses
    }
}
