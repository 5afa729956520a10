//! Scripted devices for the protocol tests.
//!
//! A [`Device`] sits on the far end of an in-memory duplex stream and frames
//! what the driver sends with the same frame detector the driver uses.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;
use wireflow_codec::{
    Decoded, FrameCodec, FrameDetector, FrameLength, FramingConfig, Message, MessageCatalog,
};
use wireflow_engine::{ConnectionConfig, ConversationConfig};

#[cfg(feature = "modbus")]
use wireflow_codec::Parse;
#[cfg(feature = "modbus")]
use wireflow_protocols::modbus::{ModbusTcpAdu, ModbusTcpDetector};

/// Decodes Modbus/TCP requests, the way a server sees them
#[cfg(feature = "modbus")]
#[derive(Debug, Default)]
pub struct ModbusServer;

#[cfg(feature = "modbus")]
impl FrameDetector for ModbusServer {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        ModbusTcpDetector.estimate_length(prefix)
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        ModbusTcpDetector.recover_from_corruption(buffer)
    }
}

#[cfg(feature = "modbus")]
impl MessageCatalog for ModbusServer {
    type Message = ModbusTcpAdu;

    fn protocol_name(&self) -> &'static str {
        "modbus-tcp-server"
    }

    fn decode(&self, frame: &[u8]) -> wireflow_codec::Result<ModbusTcpAdu> {
        ModbusTcpAdu::from_bytes(frame, false)
    }
}

/// The far end of the transport, played by the test
pub struct Device<C: FrameDetector + MessageCatalog> {
    framed: Framed<DuplexStream, FrameCodec<C>>,
}

impl<C: FrameDetector + MessageCatalog> Device<C> {
    pub fn new(io: DuplexStream, catalog: C) -> Self {
        let codec = FrameCodec::new(Arc::new(catalog), FramingConfig::default());
        Self {
            framed: Framed::new(io, codec),
        }
    }

    /// Next request the driver sent
    pub async fn recv(&mut self) -> C::Message {
        match self.framed.next().await {
            Some(Ok(Decoded::Message(message))) => message,
            Some(Ok(Decoded::Rejected { error, .. })) => panic!("driver sent a bad frame: {}", error),
            Some(Err(e)) => panic!("framing failed: {}", e),
            None => panic!("driver side closed"),
        }
    }

    /// Send a message to the driver
    pub async fn send(&mut self, message: &C::Message) {
        let bytes = message.to_bytes().expect("message encodes");
        self.send_raw(&bytes).await;
    }

    /// Send raw bytes to the driver
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.framed
            .send(Bytes::copy_from_slice(bytes))
            .await
            .expect("device send");
    }
}

/// Driver-side transport and the scripted device on the other end
pub fn transport<C: FrameDetector + MessageCatalog>(catalog: C) -> (DuplexStream, Device<C>) {
    let (driver, device) = tokio::io::duplex(4096);
    (driver, Device::new(device, catalog))
}

pub fn connection_config(timeout: Duration) -> ConnectionConfig {
    ConnectionConfig {
        conversation: ConversationConfig {
            default_timeout: timeout,
            max_in_flight: 16,
            submission_queue_depth: 16,
            late_response_memory: 8,
        },
        ..ConnectionConfig::default()
    }
}
