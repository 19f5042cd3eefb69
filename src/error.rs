//! # Error Types
//!
//! This module provides the error types used throughout the tscap library.
//! It defines a central error type `TsCapError` that encapsulates all
//! failure kinds the demuxer, decoders, and output layer can produce, plus
//! the mapping from those kinds to process exit codes.
//!
//! Components never panic across boundaries: they return `Result` values to
//! the pipeline, which is the only place that decides between "keep going"
//! and "abort with exit code N".
//!
//! ## Example Usage
//!
//! ```rust
//! use tscap::error::{Result, TsCapError};
//!
//! fn check_sync(packet: &[u8]) -> Result<()> {
//!     if packet.first() != Some(&0x47) {
//!         return Err(TsCapError::InvalidData("lost TS sync".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the tscap library
#[derive(Error, Debug)]
pub enum TsCapError {
    /// I/O errors from file or network input
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised inside a caption decoder (Teletext, CEA-608/708, DVB)
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Errors while parsing container structures (TS packets, PSI, PES)
    #[error("parser error: {0}")]
    Parser(String),

    /// Invalid or malformed input data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Stream requires a feature or hint the caller did not provide,
    /// e.g. a forced PID with a private stream type and no `--streamtype`
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A bounded buffer would have to grow past its cap to make progress
    #[error("not enough memory: {0}")]
    OutOfMemory(String),

    /// RCWT input without the expected magic/version header
    #[error("missing or unknown RCWT header: {0}")]
    MissingRcwtHeader(String),

    /// Internal invariant violation; callers should file a report
    #[error("internal error (please file a bug report): {0}")]
    Bug(String),
}

impl TsCapError {
    /// Maps an error to the process exit code the tool should terminate
    /// with. The pipeline calls this once, at the very end; nothing else
    /// in the crate exits the process.
    pub fn exit_code(&self) -> i32 {
        match self {
            TsCapError::Io(_) => exit_codes::READ_ERROR,
            TsCapError::OutOfMemory(_) => exit_codes::NOT_ENOUGH_MEMORY,
            TsCapError::MissingRcwtHeader(_) => exit_codes::MISSING_RCWT_HEADER,
            TsCapError::Bug(_) => exit_codes::BUG,
            _ => exit_codes::FAILURE,
        }
    }
}

/// Process exit codes for unrecoverable failures
pub mod exit_codes {
    /// Clean termination
    pub const OK: i32 = 0;
    /// Generic failure
    pub const FAILURE: i32 = 1;
    /// Unrecoverable input read error
    pub const READ_ERROR: i32 = 8;
    /// A bounded allocation could not be satisfied
    pub const NOT_ENOUGH_MEMORY: i32 = 500;
    /// Internal assertion failure; a bug report is warranted
    pub const BUG: i32 = 1000;
    /// RCWT input lacked its magic header or carried an unknown version
    pub const MISSING_RCWT_HEADER: i32 = 1002;
}

/// A specialized Result type for tscap operations.
///
/// Used throughout the library for operations that can produce a
/// `TsCapError`.
pub type Result<T> = std::result::Result<T, TsCapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping() {
        let e = TsCapError::MissingRcwtHeader("version 9".into());
        assert_eq!(e.exit_code(), exit_codes::MISSING_RCWT_HEADER);
        let e = TsCapError::OutOfMemory("page buffer".into());
        assert_eq!(e.exit_code(), exit_codes::NOT_ENOUGH_MEMORY);
        let e = TsCapError::Parser("bad section".into());
        assert_eq!(e.exit_code(), exit_codes::FAILURE);
    }
}
