//! Stream codec over the raw bus bytes.
//!
//! The RS485 bus is half-duplex and noisy: frames arrive embedded in
//! collision garbage and partial writes. `BusCodec` resynchronizes by
//! scanning for a frame signature, validating the candidate with
//! [`Frame::decode`], and advancing one byte past anything that does not
//! check out.

use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::tracing::prelude::*;

use super::error::DecodeError;
use super::frame::{Frame, CHLOR_START, CHLOR_TRAILER, PREAMBLE};

/// How far past a chlorinator start byte to look for the trailer before
/// giving up on the candidate. Start + ctrl-id + action + the longest
/// plausible payload + checksum + trailer.
const CHLOR_SCAN_WINDOW: usize = 3 + 25 + 1 + CHLOR_TRAILER.len();

#[derive(Default)]
pub struct BusCodec;

impl Encoder<Frame> for BusCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = frame
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        trace!("TX: {} ({} bytes) => {:02x?}", frame, bytes.len(), bytes);
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Decoder for BusCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Return Ok(Some) with a validated frame, Ok(None) to be called
        // again with more data. Never return Err for bad bytes: that
        // terminates the stream, and bad bytes are routine on this bus.
        const CALL_AGAIN: Result<Option<Frame>, io::Error> = Ok(None);

        loop {
            let Some(&first) = src.first() else {
                return CALL_AGAIN;
            };

            // Skip to the next plausible frame start.
            if first != 255 && first != CHLOR_START {
                src.advance(1);
                continue;
            }

            let outcome = if first == CHLOR_START {
                self.try_chlorinator(src)
            } else {
                self.try_prefixed(src)
            };

            match outcome {
                Candidate::Frame(len) => {
                    // try_* already validated the window.
                    let frame = Frame::decode(&src[..len])
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    trace!("RX: {} ({} bytes)", frame, len);
                    src.advance(len);
                    return Ok(Some(frame));
                }
                Candidate::NeedMore => return CALL_AGAIN,
                Candidate::Garbage => {
                    src.advance(1);
                }
            }
        }
    }
}

enum Candidate {
    /// A validated frame of this many bytes sits at the buffer start.
    Frame(usize),
    NeedMore,
    Garbage,
}

impl BusCodec {
    fn try_prefixed(&self, src: &BytesMut) -> Candidate {
        if src.len() < PREAMBLE.len() {
            return Candidate::NeedMore;
        }
        if src[..PREAMBLE.len()] != PREAMBLE {
            return Candidate::Garbage;
        }
        let Some(total) = Frame::prefixed_wire_len(src) else {
            return Candidate::NeedMore;
        };
        if src.len() < total {
            return Candidate::NeedMore;
        }
        match Frame::decode(&src[..total]) {
            Ok(_) => Candidate::Frame(total),
            Err(err) => {
                trace!("frame sync lost ({err}), searching for next frame");
                Candidate::Garbage
            }
        }
    }

    fn try_chlorinator(&self, src: &BytesMut) -> Candidate {
        // The second byte narrows the scan: only control-ids 0 and
        // 80..=83 exist, anything else is noise or a mid-frame 16.
        if src.len() < 2 {
            return Candidate::NeedMore;
        }
        let ctrl_id = src[1];
        if ctrl_id != 0 && !(80..=83).contains(&ctrl_id) {
            return Candidate::Garbage;
        }

        let window = src.len().min(CHLOR_SCAN_WINDOW);
        // Trailer can appear no earlier than after start/ctrl-id/action
        // plus the checksum byte.
        for end in 6..=window {
            if src[end - 2..end] == CHLOR_TRAILER {
                return match Frame::decode(&src[..end]) {
                    Ok(_) => Candidate::Frame(end),
                    Err(DecodeError::ChecksumMismatch { computed, carried }) => {
                        trace!(
                            "chlorinator frame failed checksum \
                             (computed 0x{computed:02x}, carried 0x{carried:02x})"
                        );
                        Candidate::Garbage
                    }
                    Err(_) => Candidate::Garbage,
                };
            }
        }
        if src.len() < CHLOR_SCAN_WINDOW {
            Candidate::NeedMore
        } else {
            Candidate::Garbage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    const POLL: &[u8] = &[255, 0, 255, 165, 0, 96, 16, 7, 0, 1, 28];
    const SET_ACK: &[u8] = &[255, 0, 255, 165, 0, 16, 96, 1, 2, 3, 32, 1, 59];
    const CHLOR_SET: &[u8] = &[16, 80, 17, 100, 213, 16, 3];

    fn drain(codec: &mut BusCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(POLL);
        buf.extend_from_slice(CHLOR_SET);
        buf.extend_from_slice(SET_ACK);

        let frames = drain(&mut BusCodec, &mut buf);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].action, 7);
        assert_eq!(frames[1].protocol, Protocol::Chlorinator);
        assert_eq!(frames[2].action, 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn skips_leading_garbage() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x00, 0x42, 0xff, 0x17]);
        buf.extend_from_slice(POLL);

        let frames = drain(&mut BusCodec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dest, 96);
    }

    #[test]
    fn waits_for_a_complete_frame() {
        let mut codec = BusCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&POLL[..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&POLL[7..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.action, 7);
    }

    #[test]
    fn recovers_after_a_corrupt_frame() {
        let mut corrupt = POLL.to_vec();
        corrupt[5] ^= 0xff;

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&corrupt);
        buf.extend_from_slice(SET_ACK);

        let frames = drain(&mut BusCodec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].action, 1);
    }

    #[test]
    fn stray_chlor_start_bytes_do_not_stall_the_stream() {
        // A lone 16 followed by non-chlorinator traffic must be skipped.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[16, 42]);
        buf.extend_from_slice(CHLOR_SET);

        let frames = drain(&mut BusCodec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].action, 17);
    }

    #[test]
    fn encoder_and_decoder_agree() {
        let mut codec = BusCodec;
        let mut buf = BytesMut::new();
        let frame = Frame::command(16, 136, vec![90, 0, 0, 0]);
        codec.encode(frame.clone(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), frame);
    }
}
