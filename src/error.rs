//! Error taxonomy for PDU decoding.
//!
//! Every error here is scoped to a single PDU. Nothing in this crate treats
//! a decode failure as fatal for the conversation or the capture.

use serde::Serialize;
use thiserror::Error;

/// Why a PDU could not be fully decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum MalformedReason {
    #[error("PDU shorter than the 32-byte header ({0} bytes)")]
    ShortHeader(usize),

    #[error("backward AndX offset {offset} (current block at {current})")]
    BackwardAndX { offset: usize, current: usize },

    #[error("AndX chain exceeds {limit} commands")]
    AndXChainTooLong { limit: usize },

    #[error("AndX offset {offset} beyond PDU length {len}")]
    AndXOffsetOutOfRange { offset: usize, len: usize },

    #[error("word/byte count framing overruns the PDU at offset {0}")]
    Framing(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DissectError {
    #[error("read of {len} bytes at offset {offset} out of bounds ({available} available)")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("not an SMB1 PDU")]
    NotThisProtocol,

    #[error("malformed PDU: {0}")]
    Malformed(#[from] MalformedReason),
}

impl DissectError {
    /// True for errors that mean "could not fully decode", as opposed to a
    /// negative protocol match.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, DissectError::NotThisProtocol)
    }
}

pub type Result<T> = std::result::Result<T, DissectError>;
