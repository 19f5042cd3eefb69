//! # Container Format Implementations
//!
//! This module holds the demuxer side of the crate: the data contract every
//! container reader speaks, and the MPEG-2 Transport Stream implementation.
//! Other containers (MP4, WTV, MKV, raw captures) plug in by producing the
//! same [`DemuxerData`] records; only TS ships here.

use bytes::Bytes;

/// MPEG-2 Transport Stream demuxing
pub mod ts;

/// Caption codec family carried by a PID, as classified from the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionKind {
    /// ETSI 300 706 Teletext in private PES
    Teletext,
    /// ETSI 300 743 DVB bitmap subtitles
    DvbSubtitle,
    /// CEA-608/708 in video user data / SEI
    AtscCc,
    /// Stream observed but carries no captions
    None,
    /// Stream type not yet classified
    #[default]
    Unknown,
}

impl CaptionKind {
    /// Selection preference: lower sorts first when choosing the best
    /// stream of a program.
    pub fn preference(self) -> u8 {
        match self {
            CaptionKind::Teletext => 0,
            CaptionKind::DvbSubtitle => 1,
            CaptionKind::AtscCc => 2,
            CaptionKind::None => 3,
            CaptionKind::Unknown => 4,
        }
    }

    /// Whether this kind produces subtitles at all.
    pub fn is_caption(self) -> bool {
        matches!(
            self,
            CaptionKind::Teletext | CaptionKind::DvbSubtitle | CaptionKind::AtscCc
        )
    }
}

/// One unit of demuxed data handed from a container reader to the
/// pipeline: a complete PES payload (or raw block) with its addressing and
/// any timing the container supplied.
#[derive(Debug, Clone)]
pub struct DemuxerData {
    /// Program the bytes belong to
    pub program_number: u16,
    /// PID (or container-specific track id) the bytes came from
    pub pid: u16,
    /// Caption codec classification for decoder dispatch
    pub codec: CaptionKind,
    /// The PES payload, header included
    pub payload: Bytes,
    /// PTS from the PES header, raw 33-bit ticks
    pub pts: Option<u64>,
    /// DTS from the PES header, raw 33-bit ticks
    pub dts: Option<u64>,
    /// Latest PCR observed for the program, in 27 MHz units
    pub pcr: Option<u64>,
    /// ISO-639 language advertised for the stream
    pub lang: Option<String>,
    /// A random-access indicator was seen while this payload accumulated
    pub key_frame: bool,
}

impl DemuxerData {
    /// Creates a record with addressing only; timing fields default empty.
    pub fn new(program_number: u16, pid: u16, codec: CaptionKind, payload: impl Into<Bytes>) -> Self {
        Self {
            program_number,
            pid,
            codec,
            payload: payload.into(),
            pts: None,
            dts: None,
            pcr: None,
            lang: None,
            key_frame: false,
        }
    }

    /// Attaches a PTS in 90 kHz ticks.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Attaches the most recent PCR in 27 MHz units.
    pub fn with_pcr(mut self, pcr: u64) -> Self {
        self.pcr = Some(pcr);
        self
    }

    /// Attaches a language tag.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_order_matches_selection_policy() {
        assert!(CaptionKind::Teletext.preference() < CaptionKind::DvbSubtitle.preference());
        assert!(CaptionKind::DvbSubtitle.preference() < CaptionKind::AtscCc.preference());
        assert!(CaptionKind::AtscCc.preference() < CaptionKind::None.preference());
        assert!(CaptionKind::Teletext.is_caption());
        assert!(!CaptionKind::None.is_caption());
    }
}
