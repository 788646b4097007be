//! SPORTident wire frames: building and parsing

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    checksum,
    constants::{ETX, FRAME_OVERHEAD, STX},
    error::{Error, Result},
    opcode::Opcode,
};

/// Parsed wire message
///
/// # Frame Structure
///
/// ```text
/// ┌─────┬────────┬───────┬──────────────┬───────┬───────┬─────┐
/// │ STX │ Opcode │ Count │  Parameters  │ CRC1  │ CRC0  │ ETX │
/// │ 02  │ 1 byte │ 1 byte│ Count bytes  │ 1 byte│ 1 byte│ 03  │
/// └─────┴────────┴───────┴──────────────┴───────┴───────┴─────┘
/// ```
///
/// The checksum covers opcode, count and parameters, big-endian.
///
/// # Examples
///
/// ```
/// use sportident_core::{message, Opcode};
///
/// let frame = message::build(Opcode::Beep.into(), &[2]).unwrap();
/// let decoded = message::parse(&frame).unwrap();
///
/// assert_eq!(decoded.opcode(), Ok(Opcode::Beep));
/// assert_eq!(decoded.parameters(), &[2]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    opcode: u8,
    payload: Bytes,
}

impl Message {
    /// Create a message from an opcode and its parameters
    pub fn new(opcode: Opcode, parameters: impl Into<Bytes>) -> Self {
        Self {
            opcode: opcode.into(),
            payload: parameters.into(),
        }
    }

    /// Raw opcode byte
    pub fn opcode_byte(&self) -> u8 {
        self.opcode
    }

    /// Typed opcode, or `UnrecognizedOpcode` for bytes outside the command set
    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::try_from(self.opcode)
    }

    /// Parameters, one byte each
    pub fn parameters(&self) -> &[u8] {
        &self.payload
    }

    /// Parameter at `index`, if present
    pub fn parameter(&self, index: usize) -> Option<u8> {
        self.payload.get(index).copied()
    }

    /// Parameter span as a shared buffer, for decoders indexing by offset
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encode message to a complete frame
    pub fn encode(&self) -> Result<BytesMut> {
        build(self.opcode, &self.payload)
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Build a frame for `opcode` with the given parameters
///
/// # Errors
///
/// Returns `TooManyParameters` when the parameters do not fit the one-byte
/// count field.
pub fn build(opcode: u8, parameters: &[u8]) -> Result<BytesMut> {
    if parameters.len() > usize::from(u8::MAX) {
        return Err(Error::TooManyParameters(parameters.len()));
    }
    Ok(encode_frame(opcode, parameters))
}

/// Frame a command whose parameter count is known to fit
pub(crate) fn encode_frame(opcode: u8, parameters: &[u8]) -> BytesMut {
    debug_assert!(parameters.len() <= usize::from(u8::MAX));

    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + parameters.len());
    buf.put_u8(STX);
    buf.put_u8(opcode);
    buf.put_u8(parameters.len() as u8);
    buf.put_slice(parameters);

    let crc = checksum::calculate(&buf[1..]);
    buf.put_u16(crc);
    buf.put_u8(ETX);

    trace!(opcode = %format!("0x{:02X}", opcode), frame = %hex::encode(&buf), "Built frame");

    buf
}

/// Parse and validate one complete frame
///
/// # Errors
///
/// Returns an error if:
/// - The frame does not start with STX or end with ETX (`Framing`)
/// - The count byte disagrees with the frame size (`Length`)
/// - The checksum does not match (`Checksum`)
pub fn parse(data: &[u8]) -> Result<Message> {
    if data.first() != Some(&STX) {
        return Err(Error::Framing("Missing STX"));
    }
    if data.last() != Some(&ETX) {
        return Err(Error::Framing("Missing ETX"));
    }
    if data.len() < FRAME_OVERHEAD {
        return Err(Error::Length {
            declared: data.get(2).copied().map(usize::from).unwrap_or_default(),
            actual: 0,
        });
    }

    let declared = usize::from(data[2]);
    let actual = data.len() - FRAME_OVERHEAD;
    if declared != actual {
        return Err(Error::Length { declared, actual });
    }

    let end = data.len() - 3;
    let expected = checksum::calculate(&data[1..end]);
    let received = u16::from_be_bytes([data[end], data[end + 1]]);
    if expected != received {
        return Err(Error::Checksum { expected, received });
    }

    let message = Message {
        opcode: data[1],
        payload: Bytes::copy_from_slice(&data[3..end]),
    };

    trace!(frame = %hex::encode(data), "Parsed {:?}", message);

    Ok(message)
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Message");
        match self.opcode() {
            Ok(opcode) => s.field("opcode", &opcode),
            Err(_) => s.field("opcode", &format!("0x{:02X}", self.opcode)),
        };
        s.field("params", &format!("{:02X?}", &self.payload[..self.payload.len().min(8)]))
            .field("len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Ok(opcode) => write!(f, "{}[{} params]", opcode, self.payload.len()),
            Err(_) => write!(f, "0x{:02X}[{} params]", self.opcode, self.payload.len()),
        }
    }
}
