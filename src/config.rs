//! Configuration consumed by the core pipeline.
//!
//! CLI parsing itself lives outside this crate; the front-end fills an
//! [`Options`] record and hands it to [`crate::pipeline::Pipeline`]. Every
//! field maps to one of the documented flags, and the defaults match the
//! tool's behavior when the flag is absent.

use std::path::PathBuf;

/// How the demuxer should treat Teletext streams advertised in the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeletextMode {
    /// Use a Teletext stream if one is found (`default`)
    #[default]
    Auto,
    /// `--teletext`: fail rather than fall back to other caption kinds
    Forced,
    /// `--noteletext`: never select a Teletext stream
    Forbidden,
}

/// Timing-spine mode (`--goptime` / `--nogoptime`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingMode {
    /// PTS when PES wrappers exist, GOP headers otherwise
    #[default]
    Auto,
    /// Always derive time from PTS
    Pts,
    /// Always derive time from GOP headers
    Gop,
}

/// Output format selector (`--out=`). Only the serializers the core ships
/// are listed; everything else hides behind the encoder contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// SubRip cues, the default
    #[default]
    Srt,
    /// Plain transcript lines (optionally with absolute dates)
    Transcript,
    /// Raw caption data with timing, for lossless round-trips
    Rcwt,
}

/// Date rendering for transcript output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// No date, just elapsed time
    #[default]
    None,
    /// Absolute calendar dates anchored to the broadcast UTC reference
    Date,
}

/// Input source selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// One or more regular files, processed in order
    Files(Vec<PathBuf>),
    /// Standard input
    Stdin,
    /// `--udp [[src@]host:]port`: bind and receive datagrams
    Udp {
        /// Local address to bind, e.g. "0.0.0.0:1234"
        bind: String,
    },
    /// `--tcp port`: listen for a single sender
    Tcp {
        /// Port to listen on
        port: u16,
    },
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Files(Vec::new())
    }
}

/// All options the core consumes. Field names follow the flags they mirror.
#[derive(Debug, Clone)]
pub struct Options {
    /// Where the bytes come from
    pub input: InputSource,
    /// Base name for output files (extension added per format)
    pub output_basename: String,
    /// `--out=`: which serializer receives subtitles
    pub output_format: OutputFormat,

    /// `--program-number N`: force a program, fail if absent
    pub forced_program: Option<u16>,
    /// `--autoprogram`: first program with a usable caption stream wins
    pub autoprogram: bool,
    /// `--multiprogram`: one output per program
    pub multiprogram: bool,
    /// `--datapid P`: force the caption PID
    pub forced_cappid: Option<u16>,
    /// `--streamtype T`: assume this stream type for the forced PID
    pub forced_streamtype: Option<u8>,
    /// `--datastreamtype T`: pick the first PID with this type
    pub datastreamtype: Option<u8>,

    /// `--teletext` / `--noteletext`
    pub teletext: TeletextMode,
    /// `--tpage N`: watched Teletext page, decimal (e.g. 888)
    pub teletext_page: u16,

    /// `--goptime` / `--nogoptime`
    pub timing: TimingMode,
    /// `--delay ms`: signed offset added to all emitted timestamps
    pub subs_delay_ms: i64,
    /// `--startat`: drop subtitles hidden before this time
    pub start_at_ms: Option<i64>,
    /// `--endat`: stop once presentation time passes this
    pub end_at_ms: Option<i64>,

    /// `--stream [N]`: live-stream timeout in seconds; 0 = off (plain EOF),
    /// -1 = wait forever
    pub live_stream_timeout_s: i32,
    /// `--binary-concat`: treat consecutive inputs as one logical stream
    pub binary_concat: bool,

    /// `--no-levdist` turns this off
    pub typo_merge: bool,
    /// `--levdistmincnt N`
    pub lev_min_count: usize,
    /// `--levdistmaxpct P`
    pub lev_max_pct: usize,

    /// `--split-dvb-subs`: one file per (PID, language)
    pub split_dvb_subs: bool,
    /// `--outinterval S` in milliseconds; 0 disables segmentation
    pub out_interval_ms: i64,
    /// `--segmentonkeyonly`: defer interval cuts to the next I-frame
    pub segment_on_key_frames_only: bool,
    /// `--keep-output-close`: reopen/append/close around every write
    pub keep_output_closed: bool,

    /// Suppress `<font color=...>` tags in Teletext output
    pub no_font_color: bool,
    /// Suppress HTML entity escaping of `< > &`
    pub no_html_escape: bool,
    /// Transliterate Latin code points to Cyrillic at render time
    pub latin_russian_map: bool,
    /// Capitalize sentence starts, lowercase the rest
    pub sentence_cap: bool,
    /// Proper nouns whose capitalization sentence-capping must restore
    pub cap_words: Vec<String>,
    /// Transcript date rendering
    pub date_format: DateFormat,
    /// Disable taking the UTC reference from Teletext packet 8/30
    pub no_auto_time_ref: bool,

    /// Hex-dump malformed TS packets at debug level
    pub dump_defective_packets: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input: InputSource::default(),
            output_basename: "out".to_string(),
            output_format: OutputFormat::default(),
            forced_program: None,
            autoprogram: false,
            multiprogram: false,
            forced_cappid: None,
            forced_streamtype: None,
            datastreamtype: None,
            teletext: TeletextMode::default(),
            teletext_page: 0,
            timing: TimingMode::default(),
            subs_delay_ms: 0,
            start_at_ms: None,
            end_at_ms: None,
            live_stream_timeout_s: 0,
            binary_concat: false,
            typo_merge: true,
            lev_min_count: 2,
            lev_max_pct: 10,
            split_dvb_subs: false,
            out_interval_ms: 0,
            segment_on_key_frames_only: false,
            keep_output_closed: false,
            no_font_color: false,
            no_html_escape: false,
            latin_russian_map: false,
            sentence_cap: false,
            cap_words: Vec::new(),
            date_format: DateFormat::default(),
            no_auto_time_ref: false,
            dump_defective_packets: false,
        }
    }
}

impl Options {
    /// Extension the chosen output format uses for generated files.
    pub fn output_extension(&self) -> &'static str {
        match self.output_format {
            OutputFormat::Srt => "srt",
            OutputFormat::Transcript => "txt",
            OutputFormat::Rcwt => "bin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_flags() {
        let opts = Options::default();
        assert_eq!(opts.lev_min_count, 2);
        assert_eq!(opts.lev_max_pct, 10);
        assert!(opts.typo_merge);
        assert_eq!(opts.teletext, TeletextMode::Auto);
        assert_eq!(opts.output_extension(), "srt");
        assert_eq!(opts.live_stream_timeout_s, 0);
    }
}
