//! # Subtitle Types and Output
//!
//! This module holds the subtitle record produced by every caption decoder,
//! the encoder contract the pipeline drives, and the output layer that maps
//! programs to files (naming, segmentation, flushing).
//!
//! Ownership is strict: a decoder builds a [`Subtitle`] and hands it over;
//! whichever encoder receives it consumes it. Nothing is shared and nothing
//! needs freeing behind the caller's back.

use bytes::Bytes;

/// SubRip serializer, the default encoder
pub mod srt;

/// Encoder registry, file naming and segmentation
pub mod output;

pub use output::{Encoder, OutputKey, OutputMuxer};
pub use srt::SrtEncoder;

/// The body of a subtitle, by decoder family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitlePayload {
    /// Rendered text, UTF-8 (Teletext, 608 text modes)
    Text(String),
    /// An undecoded bitmap region (DVB subtitles before OCR)
    Bitmap(Bytes),
    /// Raw caption bytes for round-trip formats
    Raw(Bytes),
}

/// One complete subtitle with resolved presentation times.
///
/// Timestamps are FTS milliseconds (see [`crate::timing`]); the delay and
/// clipping options have already been applied by the time an encoder sees
/// the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitle {
    /// Subtitle content
    pub payload: SubtitlePayload,
    /// Presentation start, in ms
    pub start_ms: i64,
    /// Presentation end, in ms
    pub end_ms: i64,
    /// ISO-639 language tag when the stream advertises one
    pub lang: Option<String>,
    /// Short origin note, e.g. the Teletext page number
    pub info: Option<String>,
    /// Decoder family tag ("TLT", "608", "DVB")
    pub mode: &'static str,
    /// Marks an explicit end-of-display event rather than a replacement
    pub end_of_display: bool,
}

impl Subtitle {
    /// Creates a text subtitle with the given body and time range.
    pub fn text(body: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            payload: SubtitlePayload::Text(body.into()),
            start_ms,
            end_ms,
            lang: None,
            info: None,
            mode: "TLT",
            end_of_display: false,
        }
    }

    /// Creates a raw-bytes subtitle (used by the RCWT round-trip path).
    pub fn raw(body: impl Into<Bytes>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            payload: SubtitlePayload::Raw(body.into()),
            start_ms,
            end_ms,
            lang: None,
            info: None,
            mode: "RAW",
            end_of_display: false,
        }
    }

    /// Attaches a language tag.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Attaches an origin note.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Sets the decoder family tag.
    pub fn with_mode(mut self, mode: &'static str) -> Self {
        self.mode = mode;
        self
    }

    /// Borrows the text body, if this is a text subtitle.
    pub fn text_body(&self) -> Option<&str> {
        match &self.payload {
            SubtitlePayload::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let sub = Subtitle::text("Hello, world.", 1000, 3000)
            .with_lang("eng")
            .with_info("888");
        assert_eq!(sub.text_body(), Some("Hello, world."));
        assert_eq!(sub.lang.as_deref(), Some("eng"));
        assert_eq!(sub.info.as_deref(), Some("888"));
        assert_eq!(sub.start_ms, 1000);
        assert_eq!(sub.end_ms, 3000);
    }
}
