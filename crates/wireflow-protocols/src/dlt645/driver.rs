/*!
 * DL/T 645-2007 master station driver.
 *
 * The RS-485 bus is half duplex and a meter answers one request at a time,
 * so every tag is read or written in its own exchange, one after another.
 * When the driver is built for the wildcard address it asks the meter for
 * its real address as soon as the connection opens.
 */
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use tracing::{debug, info, trace};
use wireflow_codec::{FrameDetector, FrameLength, MessageCatalog, Parse, Result};
use wireflow_core::types::{ResponseCode, Value};
use wireflow_engine::{
    Conversation, ConversationError, Operation, Optimizer, PerTagOptimizer, ProtocolDriver,
    SubRequest, TagResponse, WireRequest,
};

use super::control::{Dlt645Function, MeterAddress};
use super::frame::{Dlt645Body, Dlt645Detector, Dlt645Frame};
use super::tag::Dlt645Tag;

/// Wake-up bytes sent before each request
pub const DEFAULT_PREAMBLE: u8 = 4;

/// Password sent with writes when none is configured (level 02, 000000)
pub const DEFAULT_PASSWORD: u32 = 0x0200_0000;

/// Driver of a DL/T 645-2007 meter
pub struct Dlt645Driver {
    address: AtomicU64,
    password: u32,
    operator: u32,
    preamble: u8,
    optimizer: PerTagOptimizer,
}

impl std::fmt::Debug for Dlt645Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dlt645Driver")
            .field("address", &self.address().to_string())
            .field("preamble", &self.preamble)
            .finish()
    }
}

impl Default for Dlt645Driver {
    fn default() -> Self {
        Self::new(MeterAddress::WILDCARD)
    }
}

impl Dlt645Driver {
    /// Create a driver talking to the meter at `address`
    pub fn new(address: MeterAddress) -> Self {
        Self {
            address: AtomicU64::new(address.to_u64()),
            password: DEFAULT_PASSWORD,
            operator: 0,
            preamble: DEFAULT_PREAMBLE,
            optimizer: PerTagOptimizer::sequential(),
        }
    }

    /// Credentials sent with writes
    pub fn with_credentials(mut self, password: u32, operator: u32) -> Self {
        self.password = password;
        self.operator = operator;
        self
    }

    /// Number of wake-up bytes sent before each request
    pub fn with_preamble(mut self, count: u8) -> Self {
        self.preamble = count;
        self
    }

    /// Current meter address
    pub fn address(&self) -> MeterAddress {
        MeterAddress::from_u64(self.address.load(Ordering::Acquire))
    }

    fn wire_request(&self, function: Dlt645Function, body: Dlt645Body) -> WireRequest<Dlt645Frame> {
        let address = self.address();
        let request = Dlt645Frame::request(address, function, body).with_preamble(self.preamble);
        WireRequest::new(request, move |response: &Dlt645Frame| {
            response.control.is_response()
                && response.control.function() == function
                && (address.is_wildcard() || response.address == address)
        })
    }

    fn decode_one(
        operation: Operation,
        tag: &Dlt645Tag,
        response: Dlt645Frame,
    ) -> std::result::Result<Option<Value>, ResponseCode> {
        if response.control.has_following() {
            debug!("{} has following frames, only the first is used", tag);
        }
        match (operation, response.body) {
            (_, Dlt645Body::Exception { status }) => {
                debug!("{} refused with status {:#04x}", tag, status.0);
                Err(status.response_code())
            }
            (Operation::Read, Dlt645Body::ReadDataResponse { identifier, data }) => {
                if identifier != tag.identifier {
                    debug!("{} answered with identifier {:08X}", tag, identifier);
                    return Err(ResponseCode::RemoteError);
                }
                tag.format.decode(&data).map(Some)
            }
            (Operation::Write, Dlt645Body::WriteDataAck) => Ok(None),
            (_, other) => {
                debug!("Unexpected response {:?} to {} of {}", other, operation, tag);
                Err(ResponseCode::InternalError)
            }
        }
    }
}

impl FrameDetector for Dlt645Driver {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        Dlt645Detector.estimate_length(prefix)
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        Dlt645Detector.recover_from_corruption(buffer)
    }
}

impl MessageCatalog for Dlt645Driver {
    type Message = Dlt645Frame;

    fn protocol_name(&self) -> &'static str {
        "dlt645"
    }

    fn decode(&self, frame: &[u8]) -> Result<Dlt645Frame> {
        trace!("Decoding {} byte DL/T 645 frame", frame.len());
        Dlt645Frame::from_bytes(frame, ())
    }
}

#[async_trait]
impl ProtocolDriver for Dlt645Driver {
    type Tag = Dlt645Tag;

    fn optimizer(&self) -> &dyn Optimizer<Dlt645Tag> {
        &self.optimizer
    }

    async fn on_connect(
        &self,
        conversation: &Conversation<Self>,
    ) -> wireflow_engine::Result<()> {
        if !self.address().is_wildcard() {
            return Ok(());
        }
        let wire = self.wire_request(Dlt645Function::ReadAddress, Dlt645Body::ReadAddress);
        let response = conversation.request(wire.message, wire.matcher, None).await?;
        match response.body {
            Dlt645Body::ReadAddressResponse { address } => {
                info!("Meter answered with address {}", address);
                self.address.store(address.to_u64(), Ordering::Release);
                Ok(())
            }
            other => Err(ConversationError::driver(format!(
                "address query answered with {}",
                other.variant_name()
            ))),
        }
    }

    fn encode_request(
        &self,
        operation: Operation,
        request: &SubRequest<Dlt645Tag>,
    ) -> std::result::Result<Option<WireRequest<Dlt645Frame>>, ResponseCode> {
        let item = match request.items.as_slice() {
            [item] => item,
            _ => return Err(ResponseCode::InternalError),
        };
        let tag = &item.tag;
        let wire = match operation {
            Operation::Read => self.wire_request(
                Dlt645Function::ReadData,
                Dlt645Body::ReadData {
                    identifier: tag.identifier,
                    parameters: Vec::new(),
                },
            ),
            Operation::Write => {
                let value = item.value.as_ref().ok_or(ResponseCode::InvalidData)?;
                self.wire_request(
                    Dlt645Function::WriteData,
                    Dlt645Body::WriteData {
                        identifier: tag.identifier,
                        password: self.password,
                        operator: self.operator,
                        data: tag.format.encode(value)?,
                    },
                )
            }
            Operation::Subscribe => return Err(ResponseCode::Unsupported),
        };
        Ok(Some(wire))
    }

    fn decode_response(
        &self,
        operation: Operation,
        request: &SubRequest<Dlt645Tag>,
        response: Dlt645Frame,
    ) -> Vec<TagResponse<Dlt645Tag>> {
        let mut responses = Vec::with_capacity(request.len());
        let mut frame = Some(response);
        for tag in request.tags() {
            let outcome = match frame.take() {
                Some(frame) => Self::decode_one(operation, tag, frame),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlt645::control::{ControlCode, ErrorStatus};
    use wireflow_engine::TagItem;

    fn meter() -> MeterAddress {
        "000000123456".parse().unwrap()
    }

    fn sub(tag: &str, value: Option<Value>) -> SubRequest<Dlt645Tag> {
        SubRequest::new(vec![TagItem {
            index: 0,
            tag: tag.parse().unwrap(),
            value,
        }])
    }

    #[test]
    fn test_read_request_and_matcher() {
        let driver = Dlt645Driver::new(meter()).with_preamble(2);
        let wire = driver
            .encode_request(Operation::Read, &sub("00010000:XXXXXX.XX", None))
            .unwrap()
            .unwrap();
        assert_eq!(wire.message.preamble, 2);
        assert_eq!(wire.message.control.0, 0x11);
        assert_eq!(
            wire.message.body,
            Dlt645Body::ReadData {
                identifier: 0x0001_0000,
                parameters: Vec::new()
            }
        );

        let answer = Dlt645Frame::new(
            meter(),
            ControlCode::response(Dlt645Function::ReadData),
            Dlt645Body::ReadDataResponse {
                identifier: 0x0001_0000,
                data: vec![0x56, 0x34, 0x12, 0x00],
            },
        );
        assert!((wire.matcher)(&answer));
        let other_meter = Dlt645Frame {
            address: "000000654321".parse().unwrap(),
            ..answer.clone()
        };
        assert!(!(wire.matcher)(&other_meter));
        // Our own request echoed back on the bus
        assert!(!(wire.matcher)(&wire.message));

        let responses = driver.decode_response(Operation::Read, &sub("00010000:XXXXXX.XX", None), answer);
        assert_eq!(responses[0].code, ResponseCode::Ok);
        assert_eq!(responses[0].value, Some(Value::Float(1234.56)));
    }

    #[test]
    fn test_write_carries_credentials() {
        let driver = Dlt645Driver::new(meter()).with_credentials(0x0212_3456, 0x0000_0001);
        let wire = driver
            .encode_request(Operation::Write, &sub("04000401:XXXX", Some(Value::Integer(15))))
            .unwrap()
            .unwrap();
        assert_eq!(wire.message.control.0, 0x14);
        assert_eq!(
            wire.message.body,
            Dlt645Body::WriteData {
                identifier: 0x0400_0401,
                password: 0x0212_3456,
                operator: 1,
                data: vec![0x15, 0x00],
            }
        );

        let ack = Dlt645Frame::new(
            meter(),
            ControlCode::response(Dlt645Function::WriteData),
            Dlt645Body::WriteDataAck,
        );
        let responses = driver.decode_response(Operation::Write, &sub("04000401:XXXX", None), ack);
        assert_eq!(responses[0].code, ResponseCode::Ok);
    }

    #[test]
    fn test_failures_map_to_tag_codes() {
        let driver = Dlt645Driver::new(meter());
        let refused = Dlt645Frame::new(
            meter(),
            ControlCode::exception(Dlt645Function::ReadData),
            Dlt645Body::Exception {
                status: ErrorStatus(ErrorStatus::NO_DATA),
            },
        );
        let responses = driver.decode_response(Operation::Read, &sub("00010000", None), refused);
        assert_eq!(responses[0].code, ResponseCode::NotFound);

        let wrong_item = Dlt645Frame::new(
            meter(),
            ControlCode::response(Dlt645Function::ReadData),
            Dlt645Body::ReadDataResponse {
                identifier: 0x0002_0000,
                data: vec![0x00],
            },
        );
        let responses = driver.decode_response(Operation::Read, &sub("00010000", None), wrong_item);
        assert_eq!(responses[0].code, ResponseCode::RemoteError);

        assert_eq!(
            driver
                .encode_request(Operation::Subscribe, &sub("00010000", None))
                .err(),
            Some(ResponseCode::Unsupported)
        );
        assert_eq!(
            driver
                .encode_request(
                    Operation::Write,
                    &sub("04000401:XXXX", Some(Value::String("x".into())))
                )
                .err(),
            Some(ResponseCode::InvalidDatatype)
        );
    }
}
