//! The in-memory frame model and its two wire encodings.

use serde::Serialize;

use super::checksum::{sum16, sum8};
use super::error::{DecodeError, EncodeError};
use super::{address, is_pump_address};

/// Which framing (and which equipment family) a frame belongs to.
///
/// Classification on decode follows the bus convention: a chlorinator
/// frame is recognized by its leading `16` byte; for length-prefixed
/// frames, pump traffic uses addresses 96..=111, broadcast traffic is
/// addressed to 15, and everything else is controller traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Controller,
    Broadcast,
    Pump,
    Chlorinator,
}

/// One complete bus message.
///
/// `pad` is the byte between the `165` marker and `dest` in the
/// length-prefixed format. The panel varies it per conversation, so it is
/// preserved verbatim on decode to keep `encode(decode(bytes)) == bytes`.
/// It is meaningless for chlorinator frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub protocol: Protocol,
    pub pad: u8,
    pub dest: u8,
    pub source: u8,
    pub action: u8,
    pub payload: Vec<u8>,
}

/// Length-prefixed frame preamble, `255 0 255` then the `165` marker.
pub const PREAMBLE: [u8; 4] = [255, 0, 255, 165];
/// Leading byte of a chlorinator frame.
pub const CHLOR_START: u8 = 16;
/// Chlorinator frame trailer.
pub const CHLOR_TRAILER: [u8; 2] = [16, 3];

/// Broadcast payloads above this are treated as bus collision noise.
pub const MAX_BROADCAST_PAYLOAD: usize = 75;

// preamble + pad + dest + source + action + len
const HEADER_LEN: usize = PREAMBLE.len() + 5;
// start + ctrl-id + action + checksum + trailer
const CHLOR_MIN_LEN: usize = 6;

impl Frame {
    /// Build a bridge-originated command toward the controller or a pump.
    pub fn command(dest: u8, action: u8, payload: Vec<u8>) -> Frame {
        let (protocol, pad) = if is_pump_address(dest) {
            (Protocol::Pump, 0)
        } else {
            (Protocol::Controller, 33)
        };
        Frame {
            protocol,
            pad,
            dest,
            source: address::BRIDGE,
            action,
            payload,
        }
    }

    /// Build a bridge-originated chlorinator command. `dest` is the
    /// logical chlorinator id, 1..=4.
    pub fn chlorinator(dest: u8, action: u8, payload: Vec<u8>) -> Frame {
        Frame {
            protocol: Protocol::Chlorinator,
            pad: 0,
            dest,
            source: 0,
            action,
            payload,
        }
    }

    /// A reply skeleton with source and dest swapped relative to `self`.
    pub fn reply(&self, action: u8, payload: Vec<u8>) -> Frame {
        Frame {
            protocol: self.protocol,
            pad: self.pad,
            dest: self.source,
            source: self.dest,
            action,
            payload,
        }
    }

    /// Serialize to wire bytes in the format implied by `protocol`.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self.protocol {
            Protocol::Chlorinator => Ok(self.encode_chlorinator()),
            _ => self.encode_prefixed(),
        }
    }

    fn encode_prefixed(&self) -> Result<Vec<u8>, EncodeError> {
        if self.payload.len() > u8::MAX as usize {
            return Err(EncodeError::PayloadTooLong {
                len: self.payload.len(),
            });
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + 2);
        out.extend_from_slice(&PREAMBLE);
        out.push(self.pad);
        out.push(self.dest);
        out.push(self.source);
        out.push(self.action);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        // Sum runs from the 165 marker through the payload end.
        let chk = sum16(&out[3..]);
        out.extend_from_slice(&chk.to_be_bytes());
        Ok(out)
    }

    fn encode_chlorinator(&self) -> Vec<u8> {
        let ctrl_id = if self.dest >= 1 { 79 + self.dest } else { 0 };
        let mut out = Vec::with_capacity(CHLOR_MIN_LEN + self.payload.len());
        out.push(CHLOR_START);
        out.push(ctrl_id);
        out.push(self.action);
        out.extend_from_slice(&self.payload);
        out.push(sum8(&out));
        out.extend_from_slice(&CHLOR_TRAILER);
        out
    }

    /// Parse one complete frame from `bytes`.
    ///
    /// Expects exactly one frame's worth of bytes; resynchronization over
    /// a dirty stream is [`super::BusCodec`]'s job, not this function's.
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        match bytes.first() {
            Some(&255) => Self::decode_prefixed(bytes),
            Some(&CHLOR_START) => Self::decode_chlorinator(bytes),
            _ => Err(DecodeError::UnknownFormat),
        }
    }

    fn decode_prefixed(bytes: &[u8]) -> Result<Frame, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::IncompleteFrame {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        if bytes[..PREAMBLE.len()] != PREAMBLE {
            return Err(DecodeError::UnknownFormat);
        }
        let pad = bytes[4];
        let dest = bytes[5];
        let source = bytes[6];
        let action = bytes[7];
        let len = bytes[8] as usize;
        let total = HEADER_LEN + len + 2;
        if bytes.len() < total {
            return Err(DecodeError::IncompleteFrame {
                need: total,
                have: bytes.len(),
            });
        }
        if dest == address::BROADCAST && len > MAX_BROADCAST_PAYLOAD {
            return Err(DecodeError::PayloadTooLong { len });
        }
        let computed = sum16(&bytes[3..HEADER_LEN + len]);
        let carried = u16::from_be_bytes([bytes[total - 2], bytes[total - 1]]);
        if computed != carried {
            return Err(DecodeError::ChecksumMismatch { computed, carried });
        }
        let protocol = if is_pump_address(source) || is_pump_address(dest) {
            Protocol::Pump
        } else if dest == address::BROADCAST {
            Protocol::Broadcast
        } else {
            Protocol::Controller
        };
        Ok(Frame {
            protocol,
            pad,
            dest,
            source,
            action,
            payload: bytes[HEADER_LEN..HEADER_LEN + len].to_vec(),
        })
    }

    fn decode_chlorinator(bytes: &[u8]) -> Result<Frame, DecodeError> {
        if bytes.len() < CHLOR_MIN_LEN {
            return Err(DecodeError::IncompleteFrame {
                need: CHLOR_MIN_LEN,
                have: bytes.len(),
            });
        }
        if bytes[bytes.len() - 2..] != CHLOR_TRAILER {
            return Err(DecodeError::UnknownFormat);
        }
        let body = &bytes[..bytes.len() - 3];
        let computed = sum8(body);
        let carried = bytes[bytes.len() - 3];
        if computed != carried {
            return Err(DecodeError::ChecksumMismatch {
                computed: u16::from(computed),
                carried: u16::from(carried),
            });
        }
        let ctrl_id = bytes[1];
        // Control-ids 80..=83 address chlorinators 1..=4; 0 addresses the
        // controller, which means the frame came from a chlorinator.
        let (dest, source) = if ctrl_id >= 80 {
            (ctrl_id - 79, 0)
        } else {
            (0, 1)
        };
        Ok(Frame {
            protocol: Protocol::Chlorinator,
            pad: 0,
            dest,
            source,
            action: bytes[2],
            payload: body[3..].to_vec(),
        })
    }

    /// The full on-wire length of the frame starting at `bytes[0]`, if the
    /// header is readable. Used by the codec to wait for complete frames.
    pub(crate) fn prefixed_wire_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        Some(HEADER_LEN + bytes[8] as usize + 2)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {}->{} action={} payload={:02x?}",
            self.protocol, self.source, self.dest, self.action, self.payload
        )
    }
}
