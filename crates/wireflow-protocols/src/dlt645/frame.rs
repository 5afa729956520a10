/*!
 * DL/T 645-2007 frames.
 *
 * ```text
 * FE..FE  68  A0..A5  68  C  L  DATA(L bytes, each +0x33)  CS  16
 * ```
 *
 * The optional `FE` run wakes the meter's receiver and carries no data. `CS`
 * is the byte sum of everything from the first `68` through the data. The
 * data field is scrambled byte by byte on the wire; its layout is chosen by
 * the control code through [`BODIES`].
 */
use bytes::BytesMut;
use wireflow_codec::field::{
    read_array, read_const, read_implicit, read_padding, verify_checksum, write_array,
    write_checksum, write_const, write_implicit, write_padding, ArrayBound, ManualCodec,
};
use wireflow_codec::write_buffer::{in_context, with_byte_order};
use wireflow_codec::{
    ByteOrder, ByteWriteBuffer, CodecError, FrameDetector, FrameLength, Message, Parse,
    ReadBuffer, Result, Sum8, SwitchCase, SwitchTable, WriteBuffer,
};

use super::control::{ControlCode, Dlt645Function, ErrorStatus, MeterAddress};

/// Start and second delimiter
pub const FRAME_START: u8 = 0x68;

/// End delimiter
pub const FRAME_END: u8 = 0x16;

/// Wake-up byte preceding a frame
pub const WAKE_UP: u8 = 0xFE;

/// Offset added to every data byte on the wire
pub const DATA_OFFSET: u8 = 0x33;

/// Bytes of a frame besides the wake-up run and the data field
pub const FRAME_OVERHEAD: usize = 12;

/// A data field byte, stored plain and sent with [`DATA_OFFSET`] added
pub static SCRAMBLED_BYTE: ManualCodec<u8> = ManualCodec {
    parse: |reader| Ok(reader.read_u8()?.wrapping_sub(DATA_OFFSET)),
    serialize: |value, writer| writer.write_u8(value.wrapping_add(DATA_OFFSET), "scrambled"),
    length_in_bits: |_| 8,
};

/// Layout of the data field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dlt645Body {
    /// Error status of an exception response
    Exception {
        /// Reason
        status: ErrorStatus,
    },
    /// Read the item named by a data identifier
    ReadData {
        /// Data identifier
        identifier: u32,
        /// Optional block count or time parameters
        parameters: Vec<u8>,
    },
    /// Value of a read item
    ReadDataResponse {
        /// Data identifier echoed by the meter
        identifier: u32,
        /// Item value
        data: Vec<u8>,
    },
    /// Write the item named by a data identifier
    WriteData {
        /// Data identifier
        identifier: u32,
        /// Password, level in the top byte
        password: u32,
        /// Operator code
        operator: u32,
        /// New value
        data: Vec<u8>,
    },
    /// Acknowledgement of a write
    WriteDataAck,
    /// Ask the only meter on the bus for its address
    ReadAddress,
    /// Address of the answering meter
    ReadAddressResponse {
        /// Meter address
        address: MeterAddress,
    },
}

/// Data field layouts, selected by the control code
pub static BODIES: SwitchTable<ControlCode, Dlt645Body, ()> = SwitchTable::new(
    "Dlt645Body",
    &[
        SwitchCase {
            name: "Exception",
            matches: |control| control.is_response() && control.is_exception(),
            parse: parse_exception,
        },
        SwitchCase {
            name: "ReadData",
            matches: |control| {
                !control.is_response() && control.function() == Dlt645Function::ReadData
            },
            parse: parse_read_data,
        },
        SwitchCase {
            name: "ReadDataResponse",
            matches: |control| {
                control.is_response() && control.function() == Dlt645Function::ReadData
            },
            parse: parse_read_data_response,
        },
        SwitchCase {
            name: "WriteData",
            matches: |control| {
                !control.is_response() && control.function() == Dlt645Function::WriteData
            },
            parse: parse_write_data,
        },
        SwitchCase {
            name: "WriteDataAck",
            matches: |control| {
                control.is_response() && control.function() == Dlt645Function::WriteData
            },
            parse: |_, _| Ok(Dlt645Body::WriteDataAck),
        },
        SwitchCase {
            name: "ReadAddress",
            matches: |control| {
                !control.is_response() && control.function() == Dlt645Function::ReadAddress
            },
            parse: |_, _| Ok(Dlt645Body::ReadAddress),
        },
        SwitchCase {
            name: "ReadAddressResponse",
            matches: |control| {
                control.is_response() && control.function() == Dlt645Function::ReadAddress
            },
            parse: parse_read_address_response,
        },
    ],
);

fn rest(reader: &mut ReadBuffer<'_>) -> Result<Vec<u8>> {
    let remaining = reader.remaining_bits() / 8;
    reader.read_bytes(remaining)
}

fn parse_exception(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Dlt645Body> {
    let status = reader.in_context("errorStatus", |r| r.read_u8())?;
    Ok(Dlt645Body::Exception {
        status: ErrorStatus(status),
    })
}

fn parse_read_data(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Dlt645Body> {
    let identifier = reader.in_context("identifier", |r| r.read_u32())?;
    let parameters = reader.in_context("parameters", rest)?;
    Ok(Dlt645Body::ReadData {
        identifier,
        parameters,
    })
}

fn parse_read_data_response(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Dlt645Body> {
    let identifier = reader.in_context("identifier", |r| r.read_u32())?;
    let data = reader.in_context("data", rest)?;
    Ok(Dlt645Body::ReadDataResponse { identifier, data })
}

fn parse_write_data(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Dlt645Body> {
    let identifier = reader.in_context("identifier", |r| r.read_u32())?;
    let password = reader.in_context("password", |r| r.read_u32())?;
    let operator = reader.in_context("operator", |r| r.read_u32())?;
    let data = reader.in_context("data", rest)?;
    Ok(Dlt645Body::WriteData {
        identifier,
        password,
        operator,
        data,
    })
}

fn parse_read_address_response(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Dlt645Body> {
    let bytes = reader.in_context("address", |r| r.read_bytes(6))?;
    let mut address = [0u8; 6];
    address.copy_from_slice(&bytes);
    Ok(Dlt645Body::ReadAddressResponse {
        address: MeterAddress(address),
    })
}

impl Dlt645Body {
    /// Name of the variant, matching its [`BODIES`] case
    pub fn variant_name(&self) -> &'static str {
        match self {
            Dlt645Body::Exception { .. } => "Exception",
            Dlt645Body::ReadData { .. } => "ReadData",
            Dlt645Body::ReadDataResponse { .. } => "ReadDataResponse",
            Dlt645Body::WriteData { .. } => "WriteData",
            Dlt645Body::WriteDataAck => "WriteDataAck",
            Dlt645Body::ReadAddress => "ReadAddress",
            Dlt645Body::ReadAddressResponse { .. } => "ReadAddressResponse",
        }
    }

    /// Plain length of the data field in bytes
    pub fn length_in_bytes(&self) -> usize {
        match self {
            Dlt645Body::Exception { .. } => 1,
            Dlt645Body::ReadData { parameters, .. } => 4 + parameters.len(),
            Dlt645Body::ReadDataResponse { data, .. } => 4 + data.len(),
            Dlt645Body::WriteData { data, .. } => 12 + data.len(),
            Dlt645Body::WriteDataAck | Dlt645Body::ReadAddress => 0,
            Dlt645Body::ReadAddressResponse { .. } => 6,
        }
    }

    /// Parse a plain data field
    pub fn parse(plain: &[u8], control: ControlCode) -> Result<Self> {
        let mut reader = ReadBuffer::with_order(plain, ByteOrder::LittleEndian);
        let body = BODIES.parse(&control, &mut reader, ())?;
        if reader.has_more(1) {
            return Err(CodecError::invalid_value(
                body.variant_name(),
                format!("{} unused data bytes", reader.remaining_bits() / 8),
            ));
        }
        Ok(body)
    }

    /// Write the data field in plain form
    pub fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()> {
        with_byte_order(writer, ByteOrder::LittleEndian, |w| {
            in_context(w, self.variant_name(), |w| match self {
                Dlt645Body::Exception { status } => w.write_u8(status.0, "errorStatus"),
                Dlt645Body::ReadData {
                    identifier,
                    parameters,
                } => {
                    w.write_u32(*identifier, "identifier")?;
                    w.write_bytes(parameters, "parameters")
                }
                Dlt645Body::ReadDataResponse { identifier, data } => {
                    w.write_u32(*identifier, "identifier")?;
                    w.write_bytes(data, "data")
                }
                Dlt645Body::WriteData {
                    identifier,
                    password,
                    operator,
                    data,
                } => {
                    w.write_u32(*identifier, "identifier")?;
                    w.write_u32(*password, "password")?;
                    w.write_u32(*operator, "operator")?;
                    w.write_bytes(data, "data")
                }
                Dlt645Body::WriteDataAck | Dlt645Body::ReadAddress => Ok(()),
                Dlt645Body::ReadAddressResponse { address } => {
                    w.write_bytes(address.as_bytes(), "address")
                }
            })
        })
    }

    /// Plain bytes of the data field
    pub fn to_plain_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriteBuffer::with_capacity(self.length_in_bytes());
        self.serialize(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

/// A DL/T 645-2007 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dlt645Frame {
    /// Number of wake-up bytes before the frame
    pub preamble: u8,
    /// Addressed or answering meter
    pub address: MeterAddress,
    /// Control code
    pub control: ControlCode,
    /// Data field
    pub body: Dlt645Body,
}

impl Dlt645Frame {
    /// Frame with an explicit control code
    pub fn new(address: MeterAddress, control: ControlCode, body: Dlt645Body) -> Self {
        Self {
            preamble: 0,
            address,
            control,
            body,
        }
    }

    /// Request to `address`
    pub fn request(address: MeterAddress, function: Dlt645Function, body: Dlt645Body) -> Self {
        Self::new(address, ControlCode::request(function), body)
    }

    /// Prefix the frame with `count` wake-up bytes
    pub fn with_preamble(mut self, count: u8) -> Self {
        self.preamble = count;
        self
    }

    /// Function of the control code
    pub fn function(&self) -> Dlt645Function {
        self.control.function()
    }

    /// Data identifier the frame carries, if its body has one
    pub fn identifier(&self) -> Option<u32> {
        match self.body {
            Dlt645Body::ReadData { identifier, .. }
            | Dlt645Body::ReadDataResponse { identifier, .. }
            | Dlt645Body::WriteData { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    /// Header and scrambled data, the range the checksum covers
    fn checksum_range(&self, plain: &[u8]) -> Vec<u8> {
        let mut covered = Vec::with_capacity(10 + plain.len());
        covered.push(FRAME_START);
        covered.extend_from_slice(self.address.as_bytes());
        covered.push(FRAME_START);
        covered.push(self.control.0);
        covered.push(plain.len() as u8);
        covered.extend(plain.iter().map(|b| b.wrapping_add(DATA_OFFSET)));
        covered
    }
}

impl Message for Dlt645Frame {
    fn type_name(&self) -> &'static str {
        "Dlt645Frame"
    }

    fn length_in_bits(&self) -> usize {
        (usize::from(self.preamble) + FRAME_OVERHEAD + self.body.length_in_bytes()) * 8
    }

    fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()> {
        let case = BODIES.select(&self.control)?;
        if case.name != self.body.variant_name() {
            return Err(CodecError::invalid_value(
                "Dlt645Frame/control",
                format!(
                    "{:?} selects {}, body is {}",
                    self.control,
                    case.name,
                    self.body.variant_name()
                ),
            ));
        }
        let plain = self.body.to_plain_bytes()?;

        in_context(writer, "Dlt645Frame", |w| {
            write_padding(w, "preamble", 8, usize::from(self.preamble), u64::from(WAKE_UP))?;
            write_const(w, "startDelimiter", 8, u64::from(FRAME_START))?;
            w.write_bytes(self.address.as_bytes(), "address")?;
            write_const(w, "secondDelimiter", 8, u64::from(FRAME_START))?;
            w.write_u8(self.control.0, "control")?;
            write_implicit(w, "length", 8, plain.len() as u64)?;
            write_array(w, "data", &plain, |b, w| SCRAMBLED_BYTE.write(b, w, "byte"))?;
            write_checksum(w, "checksum", &Sum8, &self.checksum_range(&plain))?;
            write_const(w, "endDelimiter", 8, u64::from(FRAME_END))
        })
    }
}

impl Parse for Dlt645Frame {
    type Args = ();

    fn parse(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Self> {
        reader.in_context("Dlt645Frame", |r| {
            let ahead = r.slice_bytes(r.position(), r.total_bits())?;
            let preamble = wake_up_run(ahead).min(usize::from(u8::MAX));
            read_padding(r, "preamble", 8, preamble)?;

            let covered_from = r.position();
            read_const(r, "startDelimiter", 8, u64::from(FRAME_START))?;
            let bytes = r.in_context("address", |r| r.read_bytes(6))?;
            let mut address = [0u8; 6];
            address.copy_from_slice(&bytes);
            read_const(r, "secondDelimiter", 8, u64::from(FRAME_START))?;
            let control = ControlCode(r.in_context("control", |r| r.read_u8())?);
            let length = read_implicit(r, "length", 8)? as usize;
            let plain = read_array(r, "data", ArrayBound::Count(length), |r| {
                SCRAMBLED_BYTE.read(r, "byte")
            })?;
            verify_checksum(r, "checksum", &Sum8, covered_from)?;
            read_const(r, "endDelimiter", 8, u64::from(FRAME_END))?;

            let body = r.in_context("data", |_| Dlt645Body::parse(&plain, control))?;
            Ok(Dlt645Frame {
                preamble: preamble as u8,
                address: MeterAddress(address),
                control,
                body,
            })
        })
    }
}

/// Frame boundaries of DL/T 645
///
/// A frame may be preceded by wake-up bytes; its length follows from the
/// length byte nine bytes after the first delimiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dlt645Detector;

fn wake_up_run(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| **b == WAKE_UP).count()
}

impl FrameDetector for Dlt645Detector {
    fn estimate_length(&self, prefix: &[u8]) -> FrameLength {
        let preamble = wake_up_run(prefix);
        match prefix.get(preamble + 9) {
            Some(length) => FrameLength::Complete(preamble + FRAME_OVERHEAD + usize::from(*length)),
            None => FrameLength::Insufficient,
        }
    }

    fn recover_from_corruption(&self, buffer: &mut BytesMut) -> usize {
        wireflow_codec::frame::discard_until(buffer, |rest| {
            let preamble = wake_up_run(rest);
            match (rest.get(preamble), rest.get(preamble + 7)) {
                (None, _) => true,
                (Some(start), _) if *start != FRAME_START => false,
                (Some(_), None) => true,
                (Some(_), Some(second)) => *second == FRAME_START,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> MeterAddress {
        "000000123456".parse().unwrap()
    }

    /// Read request for total active energy (DI 00 01 00 00)
    const READ_ENERGY: [u8; 16] = [
        0x68, 0x56, 0x34, 0x12, 0x00, 0x00, 0x00, 0x68, 0x11, 0x04, 0x33, 0x33, 0x34, 0x33, 0x4E,
        0x16,
    ];

    #[test]
    fn test_read_request_bytes() {
        let frame = Dlt645Frame::request(
            meter(),
            Dlt645Function::ReadData,
            Dlt645Body::ReadData {
                identifier: 0x0001_0000,
                parameters: Vec::new(),
            },
        );
        assert_eq!(frame.to_bytes().unwrap(), READ_ENERGY.to_vec());
        assert_eq!(frame.function(), Dlt645Function::ReadData);
        assert_eq!(frame.identifier(), Some(0x0001_0000));
        assert_eq!(Dlt645Frame::from_bytes(&READ_ENERGY, ()).unwrap(), frame);
    }

    #[test]
    fn test_wake_up_bytes_are_padding() {
        let mut bytes = vec![WAKE_UP; 4];
        bytes.extend_from_slice(&READ_ENERGY);
        let frame = Dlt645Frame::from_bytes(&bytes, ()).unwrap();
        assert_eq!(frame.preamble, 4);
        assert_eq!(frame.to_bytes().unwrap(), bytes);
        assert_eq!(
            Dlt645Detector.estimate_length(&bytes[..14]),
            FrameLength::Complete(20)
        );
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = READ_ENERGY;
        bytes[14] ^= 0x01;
        match Dlt645Frame::from_bytes(&bytes, ()) {
            Err(CodecError::ChecksumMismatch {
                context,
                expected,
                computed,
            }) => {
                assert_eq!(context, "Dlt645Frame/checksum");
                assert_eq!(expected, 0x4F);
                assert_eq!(computed, 0x4E);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_end_delimiter_is_const() {
        let mut bytes = READ_ENERGY;
        bytes[15] = 0x17;
        assert!(matches!(
            Dlt645Frame::from_bytes(&bytes, ()),
            Err(CodecError::ConstMismatch { .. })
        ));
    }

    #[test]
    fn test_control_code_selects_body() {
        let frame = Dlt645Frame::new(
            meter(),
            ControlCode::response(Dlt645Function::ReadData),
            Dlt645Body::ReadDataResponse {
                identifier: 0x0001_0000,
                data: vec![0x56, 0x34, 0x12, 0x00],
            },
        );
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes[8], 0x91);
        assert_eq!(&bytes[10..18], &[0x33, 0x33, 0x34, 0x33, 0x89, 0x67, 0x45, 0x33]);
        assert_eq!(Dlt645Frame::from_bytes(&bytes, ()).unwrap(), frame);

        let mismatched = Dlt645Frame::new(
            meter(),
            ControlCode::response(Dlt645Function::ReadData),
            Dlt645Body::WriteDataAck,
        );
        assert!(mismatched.to_bytes().is_err());
    }

    #[test]
    fn test_exception_response() {
        let frame = Dlt645Frame::new(
            meter(),
            ControlCode::exception(Dlt645Function::ReadData),
            Dlt645Body::Exception {
                status: ErrorStatus(ErrorStatus::NO_DATA),
            },
        );
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes[8], 0xD1);
        assert_eq!(bytes[10], 0x35);
        assert_eq!(Dlt645Frame::from_bytes(&bytes, ()).unwrap(), frame);
    }

    #[test]
    fn test_recovery_finds_the_next_frame() {
        let mut buffer = BytesMut::from(&[0x00, 0x68, 0x01, 0xFE][..]);
        buffer.extend_from_slice(&READ_ENERGY);
        let dropped = Dlt645Detector.recover_from_corruption(&mut buffer);
        assert_eq!(dropped, 3);
        assert_eq!(buffer[0], WAKE_UP);
    }

    #[test]
    fn test_diagnostic_json_shows_wire_data() {
        let frame = Dlt645Frame::request(
            meter(),
            Dlt645Function::ReadData,
            Dlt645Body::ReadData {
                identifier: 0x0001_0000,
                parameters: Vec::new(),
            },
        );
        let json = frame.to_json().unwrap();
        assert_eq!(json["Dlt645Frame"]["control"], 0x11);
        assert_eq!(json["Dlt645Frame"]["data"]["byte"][2]["scrambled"], 0x34);
        assert_eq!(json["Dlt645Frame"]["checksum"], 0x4E);
    }
}
