//! # Utility Functions and Types
//!
//! This module provides common utility functions and types used throughout
//! the tscap library. It includes implementations for:
//!
//! - Bit-level operations and manipulation
//! - MPEG-2 CRC32 calculation and PSI section validation
//! - Levenshtein distance over UCS-2 text (Teletext typo merging)
//!
//! ## Bit Operations
//!
//! ```rust
//! use tscap::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```
//!
//! ## CRC Calculation
//!
//! ```rust
//! use tscap::utils::Crc32Mpeg2;
//!
//! let crc = Crc32Mpeg2::new();
//! let checksum = crc.calculate(b"Hello, world!");
//! assert_ne!(checksum, 0);
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

/// Edit-distance computation for subtitle typo merging
pub mod lev;

// Re-export commonly used types
pub use bits::*;
pub use crc::Crc32Mpeg2;
pub use lev::levenshtein;
