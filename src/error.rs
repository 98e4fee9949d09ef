//! Error taxonomy for the BCSV file format engine.
//!
//! One flat enum covers every failure class the library can produce. Each
//! variant corresponds to one kind of fault: stream failures, malformed
//! bytes, checksum mismatches, API misuse, out-of-range access, and sampler
//! expression compilation.
//!
//! Recovery of an unsealed file is deliberately *not* an error: the reader
//! opens such a file successfully and reports through [`warning`]
//! (see `Reader::warning`).

use std::io;

use thiserror::Error;

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, BcsvError>;

/// All error kinds produced by the BCSV engine.
#[derive(Debug, Error)]
pub enum BcsvError {
    /// Underlying stream failure: file not found, short read or write.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Bad magic, unsupported version, bad codec id, malformed layout bytes.
    #[error("format error: {0}")]
    Format(String),

    /// Header, packet, chain, or footer checksum mismatch.
    #[error("checksum mismatch: {0}")]
    Checksum(String),

    /// Operation forbidden in the current state, e.g. write after close.
    #[error("invalid state: {0}")]
    State(String),

    /// Column index out of bounds, oversized bulk set, cell type mismatch.
    #[error("out of range: {0}")]
    Range(String),

    /// Sampler expression failed to compile.
    #[error("expression error: {0}")]
    Expression(String),
}

impl BcsvError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        BcsvError::Format(msg.into())
    }

    pub(crate) fn checksum(msg: impl Into<String>) -> Self {
        BcsvError::Checksum(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        BcsvError::State(msg.into())
    }

    pub(crate) fn range(msg: impl Into<String>) -> Self {
        BcsvError::Range(msg.into())
    }

    pub(crate) fn expression(msg: impl Into<String>) -> Self {
        BcsvError::Expression(msg.into())
    }
}
