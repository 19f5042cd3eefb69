//! # Caption Decoders
//!
//! One decoder family per caption codec, joined by the [`Decoder`] sum
//! type: the pipeline matches on the variant instead of going through
//! function pointers. Every variant follows the same contract — feed a
//! complete PES payload with the program's timing context, get back zero
//! or more finished subtitles; flush on teardown.

use crate::config::Options;
use crate::error::Result;
use crate::format::{CaptionKind, DemuxerData};
use crate::sub::Subtitle;
use crate::timing::{parse_picture_header, GopTimeCode, TimingContext};

/// CEA-608/708 user-data dispatch
pub mod atsc;

/// DVB bitmap subtitles behind the OCR service boundary
pub mod dvb;

/// ETSI 300 706 Teletext
pub mod telx;

use atsc::{find_cc_data, parse_cc_data, AtscDispatcher, CaptionSink, CcOrdering};
use dvb::DvbDecoder;
use telx::TelxDecoder;

/// A caption sink that discards everything. Stands in for the 608/708
/// decoders when none is wired up.
pub struct NullSink;

impl CaptionSink for NullSink {
    fn feed(&mut self, _bytes: &[u8], _fts_ms: i64) -> Vec<Subtitle> {
        Vec::new()
    }
    fn flush(&mut self) -> Vec<Subtitle> {
        Vec::new()
    }
}

/// One decoder instance bound to a `(program, pid)` stream.
pub enum Decoder {
    /// Teletext page decoder
    Teletext(TelxDecoder),
    /// ATSC user-data dispatcher feeding 608/708 sinks
    Atsc(AtscDispatcher),
    /// DVB bitmap subtitles
    Dvb(DvbDecoder),
}

impl Decoder {
    /// Creates the decoder matching a classified stream.
    pub fn for_kind(kind: CaptionKind, opts: &Options, lang: Option<String>) -> Option<Self> {
        match kind {
            CaptionKind::Teletext => Some(Decoder::Teletext(TelxDecoder::new(opts))),
            CaptionKind::AtscCc => Some(Decoder::Atsc(AtscDispatcher::new(
                CcOrdering::Pts,
                Box::new(NullSink),
                Box::new(NullSink),
            ))),
            CaptionKind::DvbSubtitle => Some(Decoder::Dvb(DvbDecoder::new(None, lang, None))),
            CaptionKind::None | CaptionKind::Unknown => None,
        }
    }

    /// Feeds one demuxed PES payload. The timing context belongs to the
    /// stream's program and is borrowed for the duration of the call.
    pub fn feed(&mut self, data: &DemuxerData, timing: &mut TimingContext) -> Result<Vec<Subtitle>> {
        match self {
            Decoder::Teletext(telx) => {
                if let Some(pcr) = data.pcr {
                    // 27 MHz -> ms wall clock for PTS-less teletext PES
                    telx.update_global_timestamp((pcr / 27_000) as i64);
                }
                telx.process_pes(&data.payload, timing)
            }
            Decoder::Atsc(dispatcher) => {
                if let Some(pts) = data.pts {
                    timing.set_current_pts(pts);
                    timing.set_fts();
                }
                let header = crate::format::ts::pes::parse_pes_header(&data.payload);
                let es = match &header {
                    Ok(h) => &data.payload[h.payload_offset.min(data.payload.len())..],
                    Err(_) => &data.payload[..],
                };
                let mut subs = Vec::new();
                if let Some(tc) = GopTimeCode::from_es(es) {
                    // a new GOP re-anchors whatever the reorder window holds
                    timing.set_gop_time(tc);
                    subs.extend(dispatcher.anchor_gop(timing));
                }
                if let Some((frame_type, tref)) = parse_picture_header(es) {
                    timing.current_picture_coding_type = frame_type;
                    timing.current_tref = tref;
                    timing.add_frame();
                }
                if let Some(cc) = find_cc_data(es) {
                    let triples = parse_cc_data(cc);
                    subs.extend(dispatcher.add_picture(
                        triples,
                        timing.get_fts(),
                        0,
                        timing.current_tref,
                    ));
                }
                Ok(subs)
            }
            Decoder::Dvb(dvb) => Ok(dvb.process_pes(&data.payload, timing)),
        }
    }

    /// Flushes everything pending at end of stream or stream switch.
    pub fn flush(&mut self, timing: &mut TimingContext) -> Vec<Subtitle> {
        match self {
            Decoder::Teletext(telx) => telx.close(timing),
            Decoder::Atsc(dispatcher) => dispatcher.flush(),
            Decoder::Dvb(dvb) => {
                dvb.close();
                Vec::new()
            }
        }
    }

    /// The codec family this decoder handles.
    pub fn kind(&self) -> CaptionKind {
        match self {
            Decoder::Teletext(_) => CaptionKind::Teletext,
            Decoder::Atsc(_) => CaptionKind::AtscCc,
            Decoder::Dvb(_) => CaptionKind::DvbSubtitle,
        }
    }
}
