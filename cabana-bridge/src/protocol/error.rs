//! Error types for frame encode/decode.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("checksum mismatch: computed 0x{computed:04x}, frame carries 0x{carried:04x}")]
    ChecksumMismatch { computed: u16, carried: u16 },

    #[error("incomplete frame: need {need} bytes, have {have}")]
    IncompleteFrame { need: usize, have: usize },

    #[error("bytes do not start a known frame format")]
    UnknownFormat,

    #[error("payload length {len} exceeds the collision-noise bound")]
    PayloadTooLong { len: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("payload of {len} bytes does not fit the one-byte length field")]
    PayloadTooLong { len: usize },
}
