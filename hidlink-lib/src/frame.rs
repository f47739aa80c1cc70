//! Wire framing for the HID bridge serial protocol.
//!
//! Every unit on the wire has the same shape:
//!
//! ```text
//! 57 AB <addr> <cmd> <len> <data: len bytes> <checksum>
//! ```
//!
//! The checksum is the low byte of the sum of every preceding byte. Responses
//! reuse the request layout with the command byte OR-ed with `0x80`; failures
//! come back with a discriminant in the `0xC_` band and do not always respect
//! the length byte, so they are surfaced as-is instead of being rejected.

use crate::constants::{COMMAND_OFFSET, FRAME_HEADER, FRAME_OVERHEAD, LENGTH_OFFSET, MIN_INSPECT_SIZE};
use crate::error::DecodeError;
use bytes::{Buf, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use tracing::debug;

/// Command and response discriminants (byte 3 of a frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum CommandCode {
    // Host to device
    MouseAbsolute = 0x04,
    MouseRelative = 0x05,
    GetParaCfg = 0x08,
    SetParaCfg = 0x09,
    SetUsbString = 0x0B,
    SetDefaultCfg = 0x0C,
    Reset = 0x0F,

    // Device to host: request code | 0x80
    MouseAbsoluteAck = 0x84,
    MouseRelativeAck = 0x85,
    ParaCfgAck = 0x88,
    SetParaCfgAck = 0x89,
    SetUsbStringAck = 0x8B,
    SetDefaultCfgAck = 0x8C,
    ResetAck = 0x8F,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Error codes the bridge reports in the `0xC_` band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive, Display)]
#[repr(u8)]
pub enum ProtocolErrorCode {
    #[strum(to_string = "serial response timeout")]
    Timeout = 0xC1,
    #[strum(to_string = "packet header error")]
    HeaderError = 0xC2,
    #[strum(to_string = "command error")]
    CommandError = 0xC3,
    #[strum(to_string = "checksum error")]
    ChecksumError = 0xC4,
    #[strum(to_string = "argument error")]
    ArgumentError = 0xC5,
    #[strum(to_string = "execution error")]
    ExecutionError = 0xC6,

    #[num_enum(catch_all)]
    #[strum(to_string = "unknown error")]
    Unknown(u8),
}

/// Returns true when a discriminant falls into the device error band.
pub fn is_error_code(code: u8) -> bool {
    code & 0xF0 == 0xC0
}

/// How a decoded frame should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Response(CommandCode),
    ProtocolError(ProtocolErrorCode),
}

/// One decoded frame. Cheap to clone, backed by the received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Bytes,
    complete: bool,
}

impl Frame {
    pub fn address(&self) -> u8 {
        self.raw[2]
    }

    /// Raw discriminant at byte 3
    pub fn code(&self) -> u8 {
        self.raw[COMMAND_OFFSET]
    }

    pub fn kind(&self) -> FrameKind {
        let code = self.code();
        if is_error_code(code) {
            FrameKind::ProtocolError(ProtocolErrorCode::from_primitive(code))
        } else {
            FrameKind::Response(CommandCode::from_primitive(code))
        }
    }

    pub fn has_valid_header(&self) -> bool {
        self.raw[..2] == FRAME_HEADER
    }

    /// Data bytes following the length byte, checksum excluded.
    ///
    /// Error frames that were taken as-is return everything after the
    /// discriminant.
    pub fn data(&self) -> Bytes {
        if self.complete {
            self.raw.slice(LENGTH_OFFSET + 1..self.raw.len() - 1)
        } else {
            self.raw.slice(COMMAND_OFFSET + 1..)
        }
    }

    /// Everything except the trailing checksum, i.e. what `encode` was fed.
    pub fn body(&self) -> Bytes {
        if self.complete {
            self.raw.slice(..self.raw.len() - 1)
        } else {
            self.raw.clone()
        }
    }

    pub fn checksum(&self) -> Option<u8> {
        self.complete.then(|| self.raw[self.raw.len() - 1])
    }

    pub fn verify_checksum(&self) -> Result<(), DecodeError> {
        match self.checksum() {
            Some(carried) => {
                let computed = checksum(&self.body());
                if carried == computed {
                    Ok(())
                } else {
                    Err(DecodeError::ChecksumMismatch { carried, computed })
                }
            }
            // Nothing to verify on a frame that was taken as-is
            None => Ok(()),
        }
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Low byte of the sum of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Concatenates `prefix` and `payload` and appends the checksum.
pub fn encode(prefix: &[u8], payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(prefix.len() + payload.len() + 1);
    frame.extend_from_slice(prefix);
    frame.extend_from_slice(payload);
    let sum = checksum(&frame);
    frame.extend_from_slice(&[sum]);
    frame.freeze()
}

/// Decodes one frame from the start of `buffer`.
///
/// Returns the frame and the number of bytes it occupied. The header bytes
/// are not validated here; callers that need resynchronisation use
/// [`FrameDecoder`].
pub fn decode(buffer: &[u8]) -> Result<(Frame, usize), DecodeError> {
    if buffer.len() < MIN_INSPECT_SIZE {
        return Err(DecodeError::Incomplete {
            expected: MIN_INSPECT_SIZE,
            actual: buffer.len(),
        });
    }

    let code = buffer[COMMAND_OFFSET];
    let declared = buffer
        .get(LENGTH_OFFSET)
        .map(|len| *len as usize + FRAME_OVERHEAD);

    if is_error_code(code) {
        let (consumed, complete) = error_frame_extent(buffer, declared);
        let frame = Frame {
            raw: Bytes::copy_from_slice(&buffer[..consumed]),
            complete,
        };
        return Ok((frame, consumed));
    }

    let total = declared.ok_or(DecodeError::Incomplete {
        expected: LENGTH_OFFSET + 1,
        actual: buffer.len(),
    })?;
    if buffer.len() < total {
        return Err(DecodeError::Incomplete {
            expected: total,
            actual: buffer.len(),
        });
    }

    let frame = Frame {
        raw: Bytes::copy_from_slice(&buffer[..total]),
        complete: true,
    };
    Ok((frame, total))
}

/// Length of an error-band frame at the start of `buffer`, and whether it
/// carried a usable length byte and checksum.
///
/// The chip may send a bare `57 AB 00 Cx` with nothing after it, in which case
/// byte 4 already belongs to the next frame. A declared length is only
/// trusted when its checksum holds; otherwise the frame ends at the next
/// header, so a following ack is not swallowed.
fn error_frame_extent(buffer: &[u8], declared: Option<usize>) -> (usize, bool) {
    let next_header = buffer[LENGTH_OFFSET..]
        .windows(FRAME_HEADER.len())
        .position(|w| w == FRAME_HEADER)
        .map(|pos| pos + LENGTH_OFFSET);

    match (declared, next_header) {
        (_, Some(LENGTH_OFFSET)) => (LENGTH_OFFSET, false),
        (Some(total), _) if buffer.len() >= total && checksum(&buffer[..total - 1]) == buffer[total - 1] => {
            (total, true)
        }
        (_, Some(next)) => (next, false),
        // A trailing 0x57 may be the start of the next header
        _ if buffer.len() > LENGTH_OFFSET && buffer.last() == Some(&FRAME_HEADER[0]) => (buffer.len() - 1, false),
        _ => (buffer.len(), false),
    }
}

/// Streaming decoder: buffers partial frames across reads and skips line
/// noise up to the next frame header.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for the rest of their frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        self.resync();
        match decode(&self.buffer) {
            Ok((frame, consumed)) => {
                self.buffer.advance(consumed);
                Some(frame)
            }
            Err(_) => None,
        }
    }

    fn resync(&mut self) {
        let start = self
            .buffer
            .windows(FRAME_HEADER.len())
            .position(|w| w == FRAME_HEADER);
        let skip = match start {
            Some(0) => return,
            Some(pos) => pos,
            // Keep a trailing 0x57, it may be the first half of a header
            None if self.buffer.last() == Some(&FRAME_HEADER[0]) => self.buffer.len() - 1,
            None => self.buffer.len(),
        };
        if skip > 0 {
            debug!(bytes = hex::encode(&self.buffer[..skip]), "Discarding bytes before frame header");
            self.buffer.advance(skip);
        }
    }
}

impl Iterator for FrameDecoder {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}
