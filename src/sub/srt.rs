use super::Subtitle;

/// Formats milliseconds as the SubRip `HH:MM:SS,mmm` timestamp.
pub fn ms_to_srt_time(ms: i64) -> String {
    let ms = ms.max(0);
    let h = ms / 3_600_000;
    let m = (ms / 60_000) % 60;
    let s = (ms / 1000) % 60;
    let frac = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, frac)
}

/// SubRip cue serializer.
///
/// Cues are numbered from 1 and separated by blank lines. Line endings
/// are CRLF throughout, which every SRT consumer accepts.
#[derive(Debug, Default)]
pub struct SrtEncoder {
    counter: u64,
}

impl SrtEncoder {
    /// Creates a serializer with the cue counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the cue counter, used when output rotates to a new file.
    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Serializes one subtitle as an SRT cue. Non-text payloads yield
    /// nothing.
    pub fn encode(&mut self, sub: &Subtitle) -> Vec<u8> {
        let Some(text) = sub.text_body() else {
            return Vec::new();
        };
        if text.is_empty() {
            return Vec::new();
        }

        self.counter += 1;
        let mut out = String::new();
        out.push_str(&format!("{}\r\n", self.counter));
        out.push_str(&format!(
            "{} --> {}\r\n",
            ms_to_srt_time(sub.start_ms),
            ms_to_srt_time(sub.end_ms),
        ));
        out.push_str(text);
        out.push_str("\r\n\r\n");
        out.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timestamp_formatting() {
        assert_eq!(ms_to_srt_time(0), "00:00:00,000");
        assert_eq!(ms_to_srt_time(1000), "00:00:01,000");
        assert_eq!(ms_to_srt_time(3_723_456), "01:02:03,456");
        assert_eq!(ms_to_srt_time(-5), "00:00:00,000");
    }

    #[test]
    fn encodes_numbered_cues() {
        let mut enc = SrtEncoder::new();
        let cue1 = enc.encode(&Subtitle::text("Hello, world.", 1000, 3000));
        let cue2 = enc.encode(&Subtitle::text("Second line", 4000, 5000));

        assert_eq!(
            String::from_utf8(cue1).unwrap(),
            "1\r\n00:00:01,000 --> 00:00:03,000\r\nHello, world.\r\n\r\n"
        );
        assert!(String::from_utf8(cue2).unwrap().starts_with("2\r\n"));
    }

    #[test]
    fn skips_non_text_subtitles() {
        let mut enc = SrtEncoder::new();
        assert!(enc.encode(&Subtitle::raw(vec![1, 2, 3], 0, 0)).is_empty());
        // the counter does not advance for skipped payloads
        let cue = enc.encode(&Subtitle::text("x", 0, 1000));
        assert!(String::from_utf8(cue).unwrap().starts_with("1\r\n"));
    }
}
