//! A minimal framed protocol shared by the codec integration tests.
//!
//! Frame layout: `0xA5`, length of id plus payload, id, payload, XOR of id
//! and payload.

#![allow(dead_code)]

use bytes::BytesMut;
use wireflow_codec::field::{read_const, read_implicit, read_simple, verify_checksum, write_checksum, write_const, write_implicit};
use wireflow_codec::frame::discard_until;
use wireflow_codec::write_buffer::in_context;
use wireflow_codec::{
    CodecError, FrameDetector, FrameLength, Message, MessageCatalog, Parse, ReadBuffer, Result,
    WriteBuffer, Xor8,
};

pub const START: u8 = 0xA5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: u8, payload: &[u8]) -> Self {
        Self {
            id,
            payload: payload.to_vec(),
        }
    }

    fn covered(&self) -> Vec<u8> {
        let mut covered = vec![self.id];
        covered.extend_from_slice(&self.payload);
        covered
    }
}

impl Message for Packet {
    fn type_name(&self) -> &'static str {
        "Packet"
    }

    fn length_in_bits(&self) -> usize {
        (4 + self.payload.len()) * 8
    }

    fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()> {
        in_context(writer, "Packet", |w| {
            write_const(w, "start", 8, u64::from(START))?;
            write_implicit(w, "length", 8, (self.payload.len() + 1) as u64)?;
            w.write_u8(self.id, "id")?;
            w.write_bytes(&self.payload, "payload")?;
            write_checksum(w, "checksum", &Xor8, &self.covered())
        })
    }
}

impl Parse for Packet {
    type Args = ();

    fn parse(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Self> {
        reader.in_context("Packet", |r| {
            read_const(r, "start", 8, u64::from(START))?;
            let length = read_implicit(r, "length", 8)? as usize;
            if length == 0 {
                return Err(CodecError::invalid_value(r.field_path("length"), "frame without id"));
            }
            let covered_from = r.position();
            let id = read_simple::<u8>(r, "id")?;
            let payload = r.in_context("payload", |r| r.read_bytes(length - 1))?;
            verify_checksum(r, "checksum", &Xor8, covered_from)?;
            Ok(Packet { id, payload })
        })
    }
}

/// Detector and catalog of the packet protocol
#[derive(Debug, Default)]
pub struct PacketProtocol;

impl FrameDetector for PacketProtocol {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        if prefix.len() < 2 {
            return FrameLength::Insufficient;
        }
        FrameLength::Complete(usize::from(prefix[1]) + 3)
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        discard_until(buffer, |rest| rest[0] == START)
    }
}

impl MessageCatalog for PacketProtocol {
    type Message = Packet;

    fn protocol_name(&self) -> &'static str {
        "packet"
    }

    fn decode(&self, frame: &[u8]) -> Result<Packet> {
        Packet::from_bytes(frame, ())
    }
}

/// Encode a packet, panicking on failure
pub fn encode(packet: &Packet) -> Vec<u8> {
    packet.to_bytes().expect("packet encodes")
}
