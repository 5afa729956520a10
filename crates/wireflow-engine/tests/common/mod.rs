//! A small register protocol and a scripted device for the engine tests.
//!
//! Frame layout: `0x7E`, length of everything after the length byte,
//! transaction id (u16), kind, payload. Read requests carry one address
//! byte per register; read replies carry one u16 per register. Write
//! requests carry `address, value` pairs. Events carry `address, value`
//! pairs and transaction id 0.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;
use wireflow_codec::field::{read_const, read_implicit, write_const, write_implicit};
use wireflow_codec::frame::discard_until;
use wireflow_codec::write_buffer::in_context;
use wireflow_codec::{
    CodecError, Decoded, FrameCodec, FrameDetector, FrameLength, FramingConfig, Message,
    MessageCatalog, Parse, ReadBuffer, WriteBuffer,
};
use wireflow_core::types::{ResponseCode, Value, ValueType};
use wireflow_engine::{
    ConnectionConfig, ConversationConfig, Operation, Optimizer, PerTagOptimizer, ProtocolDriver,
    SubRequest, Tag, TagResponse, TransactionIds, WireRequest,
};

pub const START: u8 = 0x7E;

pub const READ: u8 = 0x01;
pub const WRITE: u8 = 0x02;
pub const EVENT: u8 = 0x40;
pub const REPLY: u8 = 0x80;
pub const FAULT: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub txn: u16,
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(txn: u16, kind: u8, payload: &[u8]) -> Self {
        Self {
            txn,
            kind,
            payload: payload.to_vec(),
        }
    }

    /// Reply to a read with one value per requested address
    pub fn read_reply(request: &Frame, values: &[u16]) -> Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        Self::new(request.txn, READ | REPLY, &payload)
    }

    pub fn write_reply(request: &Frame) -> Self {
        Self::new(request.txn, WRITE | REPLY, &[])
    }

    pub fn fault(request: &Frame, code: u8) -> Self {
        Self::new(request.txn, FAULT, &[code])
    }

    pub fn event(values: &[(u8, u16)]) -> Self {
        let payload: Vec<u8> = values
            .iter()
            .flat_map(|(address, value)| {
                let [hi, lo] = value.to_be_bytes();
                [*address, hi, lo]
            })
            .collect();
        Self::new(0, EVENT, &payload)
    }
}

impl Message for Frame {
    fn type_name(&self) -> &'static str {
        "Frame"
    }

    fn length_in_bits(&self) -> usize {
        (5 + self.payload.len()) * 8
    }

    fn serialize(&self, writer: &mut dyn WriteBuffer) -> wireflow_codec::Result<()> {
        in_context(writer, "Frame", |w| {
            write_const(w, "start", 8, u64::from(START))?;
            write_implicit(w, "length", 8, (self.payload.len() + 3) as u64)?;
            w.write_u16(self.txn, "txn")?;
            w.write_u8(self.kind, "kind")?;
            w.write_bytes(&self.payload, "payload")
        })
    }
}

impl Parse for Frame {
    type Args = ();

    fn parse(reader: &mut ReadBuffer<'_>, _: ()) -> wireflow_codec::Result<Self> {
        reader.in_context("Frame", |r| {
            read_const(r, "start", 8, u64::from(START))?;
            let length = read_implicit(r, "length", 8)? as usize;
            if length < 3 {
                return Err(CodecError::invalid_value(r.field_path("length"), "frame too short"));
            }
            let txn = r.read_u16()?;
            let kind = r.read_u8()?;
            let payload = r.in_context("payload", |r| r.read_bytes(length - 3))?;
            Ok(Frame { txn, kind, payload })
        })
    }
}

/// A register address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(pub u8);

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl Tag for Register {
    fn value_type(&self) -> ValueType {
        ValueType::Word
    }
}

/// Driver of the register protocol
pub struct RegisterDriver {
    optimizer: Box<dyn Optimizer<Register>>,
    txns: TransactionIds,
}

impl Default for RegisterDriver {
    fn default() -> Self {
        Self::with_optimizer(PerTagOptimizer::concurrent())
    }
}

impl RegisterDriver {
    pub fn with_optimizer(optimizer: impl Optimizer<Register> + 'static) -> Self {
        Self {
            optimizer: Box::new(optimizer),
            txns: TransactionIds::new(),
        }
    }

    pub fn next_txn(&self) -> u16 {
        self.txns.next_id()
    }
}

impl FrameDetector for RegisterDriver {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        if prefix.len() < 2 {
            return FrameLength::Insufficient;
        }
        FrameLength::Complete(usize::from(prefix[1]) + 2)
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        discard_until(buffer, |rest| rest[0] == START)
    }
}

impl MessageCatalog for RegisterDriver {
    type Message = Frame;

    fn protocol_name(&self) -> &'static str {
        "register"
    }

    fn decode(&self, frame: &[u8]) -> wireflow_codec::Result<Frame> {
        Frame::from_bytes(frame, ())
    }
}

pub fn answers(txn: u16) -> impl Fn(&Frame) -> bool + Send + Sync + 'static {
    move |frame: &Frame| frame.txn == txn && frame.kind & REPLY != 0
}

impl ProtocolDriver for RegisterDriver {
    type Tag = Register;

    fn optimizer(&self) -> &dyn Optimizer<Register> {
        self.optimizer.as_ref()
    }

    fn encode_request(
        &self,
        operation: Operation,
        request: &SubRequest<Register>,
    ) -> Result<Option<WireRequest<Frame>>, ResponseCode> {
        let txn = self.next_txn();
        match operation {
            Operation::Read => {
                let addresses: Vec<u8> = request.tags().map(|tag| tag.0).collect();
                Ok(Some(WireRequest::new(Frame::new(txn, READ, &addresses), answers(txn))))
            }
            Operation::Write => {
                let mut payload = Vec::new();
                for item in &request.items {
                    let value = item
                        .value
                        .as_ref()
                        .and_then(Value::as_integer)
                        .and_then(|v| u16::try_from(v).ok())
                        .ok_or(ResponseCode::InvalidData)?;
                    let [hi, lo] = value.to_be_bytes();
                    payload.extend_from_slice(&[item.tag.0, hi, lo]);
                }
                Ok(Some(WireRequest::new(Frame::new(txn, WRITE, &payload), answers(txn))))
            }
            Operation::Subscribe => Ok(None),
        }
    }

    fn decode_response(
        &self,
        operation: Operation,
        request: &SubRequest<Register>,
        response: Frame,
    ) -> Vec<TagResponse<Register>> {
        if response.kind == FAULT {
            return request
                .tags()
                .map(|tag| TagResponse::failed(*tag, ResponseCode::RemoteError))
                .collect();
        }
        match operation {
            Operation::Read => request
                .tags()
                .zip(response.payload.chunks(2))
                .map(|(tag, chunk)| match chunk {
                    [hi, lo] => TagResponse::ok(*tag, Value::from(u16::from_be_bytes([*hi, *lo]))),
                    _ => TagResponse::failed(*tag, ResponseCode::InvalidData),
                })
                .collect(),
            _ => request.tags().map(|tag| TagResponse::done(*tag)).collect(),
        }
    }

    fn decode_event(&self, message: &Frame) -> Vec<(Register, Value)> {
        if message.kind != EVENT {
            return Vec::new();
        }
        message
            .payload
            .chunks(3)
            .filter_map(|chunk| match chunk {
                [address, hi, lo] => Some((
                    Register(*address),
                    Value::from(u16::from_be_bytes([*hi, *lo])),
                )),
                _ => None,
            })
            .collect()
    }
}

/// The far end of the transport, played by the test
pub struct Device {
    framed: Framed<DuplexStream, FrameCodec<RegisterDriver>>,
}

impl Device {
    pub fn new(io: DuplexStream) -> Self {
        let codec = FrameCodec::new(Arc::new(RegisterDriver::default()), FramingConfig::default());
        Self {
            framed: Framed::new(io, codec),
        }
    }

    /// Next request the engine sent
    pub async fn recv(&mut self) -> Frame {
        loop {
            match self.framed.next().await {
                Some(Ok(Decoded::Message(frame))) => return frame,
                Some(Ok(Decoded::Rejected { error, .. })) => panic!("engine sent a bad frame: {}", error),
                other => panic!("engine side closed: {:?}", other.map(|r| r.map(|_| ()))),
            }
        }
    }

    /// Send a frame to the engine
    pub async fn send(&mut self, frame: Frame) {
        let bytes = frame.to_bytes().expect("frame encodes");
        self.framed.send(Bytes::from(bytes)).await.expect("device send");
    }

    /// Send raw bytes to the engine
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.framed
            .send(Bytes::copy_from_slice(bytes))
            .await
            .expect("device send");
    }
}

/// Engine-side transport and the scripted device on the other end
pub fn transport() -> (DuplexStream, Device) {
    let (engine, device) = tokio::io::duplex(4096);
    (engine, Device::new(device))
}

pub fn conversation_config(timeout: Duration, max_in_flight: usize) -> ConversationConfig {
    ConversationConfig {
        default_timeout: timeout,
        max_in_flight,
        submission_queue_depth: 16,
        late_response_memory: 8,
    }
}

pub fn connection_config(timeout: Duration) -> ConnectionConfig {
    ConnectionConfig {
        conversation: conversation_config(timeout, 16),
        ..ConnectionConfig::default()
    }
}

/// Let spawned tasks run until they are idle
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
