#![doc(html_root_url = "https://docs.rs/tscap/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

//! # tscap - Transport Stream Caption Extractor
//!
//! `tscap` reads MPEG-2 transport streams, finds the caption payloads
//! multiplexed into them, reconstructs the caption stream, and writes
//! standalone subtitle files. The heart of the crate is the TS
//! demultiplexer (PID tracking, PAT/PMT reconstruction, PES reassembly,
//! PCR/PTS clock handling) and the ETSI 300 706 Teletext decoder that
//! turns protected page data into timed text.
//!
//! ## Features
//!
//! ### Demultiplexing
//! - 188-byte TS and 192-byte m2ts framing with sync recovery
//! - PAT/PMT/EIT section reassembly with CRC32 verification and
//!   byte-identical change detection
//! - Program selection: explicit, automatic, or one output per program
//! - PES reassembly with PTS/DTS extraction and continuity checking
//!
//! ### Caption decoding
//! - Teletext (ETSI 300 706 Level 1.5): Hamming-protected byte recovery,
//!   magazine/page state machine, G0/G2 charsets with diacritics,
//!   typo-merging of consecutive page updates
//! - CEA-608/708 user-data dispatch to pluggable decoders
//! - DVB bitmap subtitles behind a pluggable OCR boundary
//!
//! ### Output
//! - SRT, transcript, and RCWT serialization
//! - Per-program and per-language file splitting, interval segmentation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tscap::config::{InputSource, Options};
//! use tscap::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = Options {
//!         input: InputSource::Files(vec!["input.ts".into()]),
//!         output_basename: "captions".into(),
//!         teletext_page: 888,
//!         ..Options::default()
//!     };
//!
//!     let mut pipeline = Pipeline::open(opts).await?;
//!     let report = pipeline.run().await?;
//!     println!("wrote {} subtitles", report.subtitles_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `io`: buffered, rewindable input over files, stdin, UDP, and TCP
//! - `format`: container demuxing; `format::ts` is the transport stream
//!   implementation
//! - `codec`: caption decoders (Teletext, CEA-608/708 dispatch, DVB)
//! - `sub`: the subtitle record, serializers, and the output muxer
//! - `timing`: the per-program presentation timeline (FTS)
//! - `pipeline`: the pull loop tying everything together
//! - `error`: error types and exit-code mapping
//! - `utils`: bit reading, CRC32/MPEG-2, Levenshtein distance

/// Caption decoder implementations
pub mod codec;

/// Runtime configuration consumed by the pipeline
pub mod config;

/// Error types and utilities
pub mod error;

/// Container format implementations (MPEG-TS)
pub mod format;

/// Buffered input backends
pub mod io;

/// Orchestration of demuxer, decoders, and encoders
pub mod pipeline;

/// Subtitle types, serializers, and output muxing
pub mod sub;

/// The monotonic presentation timeline
pub mod timing;

/// Common utilities and helper functions
pub mod utils;

pub use error::{Result, TsCapError};
pub use pipeline::Pipeline;
