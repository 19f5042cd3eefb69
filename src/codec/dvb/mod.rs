//! # DVB Bitmap Subtitles
//!
//! ETSI 300 743 subtitles arrive as bitmap regions; recovering text needs
//! OCR, which is a pluggable service outside this crate. The decoder here
//! collects the subtitle segments of each display set and hands the bytes
//! to whatever [`BitmapRecognizer`] was configured. Without one, display
//! sets are counted but produce no subtitles, so a stream's output file is
//! created and stays empty.

use crate::format::ts::pes::parse_pes_header;
use crate::sub::Subtitle;
use crate::timing::TimingContext;
use log::debug;

/// End-of-display-set segment type.
const SEGMENT_END_OF_DISPLAY_SET: u8 = 0x80;

/// Pluggable "bitmap subtitle to text" service.
pub trait BitmapRecognizer {
    /// Recognizes the text of one display set's segment bytes. None when
    /// recognition fails.
    fn recognize(&mut self, segments: &[u8]) -> Option<String>;
}

/// Decoder for one DVB subtitle stream.
pub struct DvbDecoder {
    recognizer: Option<Box<dyn BitmapRecognizer>>,
    /// Language from the subtitle descriptor, attached to output
    pub lang: Option<String>,
    composition_page: Option<u16>,
    pending: Vec<u8>,
    pending_since_ms: Option<i64>,
    display_sets: u64,
}

impl DvbDecoder {
    /// Creates a decoder; `recognizer` may be None when no OCR service is
    /// available.
    pub fn new(
        recognizer: Option<Box<dyn BitmapRecognizer>>,
        lang: Option<String>,
        composition_page: Option<u16>,
    ) -> Self {
        Self {
            recognizer,
            lang,
            composition_page,
            pending: Vec::new(),
            pending_since_ms: None,
            display_sets: 0,
        }
    }

    /// Display sets seen so far, for the end-of-run report.
    pub fn display_set_count(&self) -> u64 {
        self.display_sets
    }

    /// Feeds one PES packet from the subtitle PID.
    pub fn process_pes(&mut self, buffer: &[u8], timing: &mut TimingContext) -> Vec<Subtitle> {
        let mut out = Vec::new();
        let Ok(header) = parse_pes_header(buffer) else {
            return out;
        };
        if let Some(pts) = header.pts {
            timing.set_current_pts(pts);
            timing.set_fts();
        }
        let now = timing.get_fts();

        // PES data: data_identifier (0x20) + subtitle_stream_id + segments
        let payload = &buffer[header.payload_offset..];
        if payload.len() < 2 || payload[0] != 0x20 {
            return out;
        }

        let mut pos = 2;
        while pos + 6 <= payload.len() && payload[pos] == 0x0F {
            let segment_type = payload[pos + 1];
            let page_id = u16::from_be_bytes([payload[pos + 2], payload[pos + 3]]);
            let segment_length = u16::from_be_bytes([payload[pos + 4], payload[pos + 5]]) as usize;
            let end = pos + 6 + segment_length;
            if end > payload.len() {
                debug!("DVB subtitle segment overruns PES, dropped");
                break;
            }

            if self.composition_page.map_or(true, |p| p == page_id) {
                if self.pending_since_ms.is_none() {
                    self.pending_since_ms = Some(now);
                }
                self.pending.extend_from_slice(&payload[pos..end]);

                if segment_type == SEGMENT_END_OF_DISPLAY_SET {
                    self.display_sets += 1;
                    let show = self.pending_since_ms.take().unwrap_or(now);
                    let segments = std::mem::take(&mut self.pending);
                    if let Some(rec) = self.recognizer.as_mut() {
                        if let Some(text) = rec.recognize(&segments) {
                            let mut sub = Subtitle::text(text, show, now).with_mode("DVB");
                            if let Some(lang) = &self.lang {
                                sub = sub.with_lang(lang.clone());
                            }
                            out.push(sub);
                        }
                    }
                }
            }
            pos = end;
        }

        out
    }

    /// Drops any partial display set at end of stream.
    pub fn close(&mut self) {
        self.pending.clear();
        self.pending_since_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingMode;

    struct FixedText(&'static str);
    impl BitmapRecognizer for FixedText {
        fn recognize(&mut self, _segments: &[u8]) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn subtitle_pes(pts: u64, segments: &[(u8, &[u8])]) -> Vec<u8> {
        let mut body = vec![0x20, 0x00]; // data identifier + stream id
        for (segment_type, data) in segments {
            body.push(0x0F);
            body.push(*segment_type);
            body.extend_from_slice(&1u16.to_be_bytes()); // page id 1
            body.extend_from_slice(&(data.len() as u16).to_be_bytes());
            body.extend_from_slice(data);
        }

        let mut pes = vec![0x00, 0x00, 0x01, 0xBD];
        let len = 3 + 5 + body.len();
        pes.push((len >> 8) as u8);
        pes.push((len & 0xFF) as u8);
        pes.push(0x80);
        pes.push(0x80);
        pes.push(5);
        pes.push(0x21 | ((pts >> 29) & 0x0E) as u8);
        pes.push((pts >> 22) as u8);
        pes.push(0x01 | ((pts >> 14) & 0xFE) as u8);
        pes.push((pts >> 7) as u8);
        pes.push(0x01 | ((pts << 1) & 0xFE) as u8);
        pes.extend_from_slice(&body);
        pes
    }

    #[test]
    fn recognized_display_set_becomes_subtitle() {
        let mut dec = DvbDecoder::new(Some(Box::new(FixedText("Hallo"))), Some("deu".into()), None);
        let mut timing = TimingContext::new(TimingMode::Auto, 0);

        let pes = subtitle_pes(
            90_000,
            &[(0x10, &[0u8; 4][..]), (SEGMENT_END_OF_DISPLAY_SET, &[][..])],
        );
        let subs = dec.process_pes(&pes, &mut timing);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].text_body(), Some("Hallo"));
        assert_eq!(subs[0].lang.as_deref(), Some("deu"));
        assert_eq!(dec.display_set_count(), 1);
    }

    #[test]
    fn without_recognizer_nothing_is_emitted() {
        let mut dec = DvbDecoder::new(None, None, None);
        let mut timing = TimingContext::new(TimingMode::Auto, 0);
        let pes = subtitle_pes(
            90_000,
            &[(0x10, &[0u8; 4][..]), (SEGMENT_END_OF_DISPLAY_SET, &[][..])],
        );
        assert!(dec.process_pes(&pes, &mut timing).is_empty());
        assert_eq!(dec.display_set_count(), 1);
    }

    #[test]
    fn other_pages_are_filtered() {
        let mut dec = DvbDecoder::new(Some(Box::new(FixedText("x"))), None, Some(7));
        let mut timing = TimingContext::new(TimingMode::Auto, 0);
        let pes = subtitle_pes(
            90_000,
            &[(SEGMENT_END_OF_DISPLAY_SET, &[][..])], // page id 1, want 7
        );
        assert!(dec.process_pes(&pes, &mut timing).is_empty());
        assert_eq!(dec.display_set_count(), 0);
    }
}
