//! # MPEG Transport Stream Support
//!
//! Layered exactly like the wire format:
//!
//! - [`parser`] frames 188/192-byte packets and reads headers, adaptation
//!   fields, and PCR
//! - [`section`] reassembles and caches PSI sections (PAT, PMT, EIT)
//! - [`pes`] reassembles PES packets and extracts PTS/DTS
//! - [`registry`] tracks programs and caption-capable streams
//! - [`demuxer`] drives all of the above as a pull source of caption
//!   payloads
//!
//! ## Example
//!
//! ```rust,no_run
//! use tscap::config::Options;
//! use tscap::format::ts::TsDemuxer;
//! use tscap::io::BufferedInput;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let opts = Options::default();
//! let input = BufferedInput::open(&opts).await?;
//! let mut demuxer = TsDemuxer::new(input, opts);
//!
//! while let Some(data) = demuxer.next_payload().await? {
//!     println!("PID {} carries {:?}", data.pid, data.codec);
//! }
//! # Ok(())
//! # }
//! ```

/// Pull demuxer joining packets, sections, and PES
pub mod demuxer;
/// Packet-level parsing: framing, headers, adaptation fields
pub mod parser;
/// PES packet reassembly and timestamp extraction
pub mod pes;
/// Program and caption-stream registry
pub mod registry;
/// PSI section assembly, caching, and table parsing
pub mod section;
/// Constants and wire-format records
pub mod types;

pub use demuxer::TsDemuxer;
pub use parser::{TsPacket, TsPacketParser};
pub use registry::{CapInfo, ProgramInfo, StreamRegistry};
pub use section::{EitEvent, SectionAssembler};
pub use types::{AdaptationField, Descriptor, EsInfo, Pat, PatEntry, Pmt, TsHeader};
