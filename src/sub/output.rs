use super::srt::SrtEncoder;
use super::{Subtitle, SubtitlePayload};
use crate::codec::telx::rcwt;
use crate::config::{DateFormat, Options, OutputFormat};
use crate::error::Result;
use chrono::{TimeZone, Utc};
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Serializer behind one output file.
///
/// This is the `encode_sub` contract the pipeline drives: subtitles in,
/// bytes out. Per-format serializers beyond these ship outside the core.
pub enum Encoder {
    /// SubRip cues
    Srt(SrtEncoder),
    /// Plain transcript lines, optionally with absolute dates
    Transcript {
        /// Whether to render absolute calendar dates
        dates: bool,
    },
    /// RCWT byte stream
    Rcwt,
}

impl Encoder {
    fn for_options(opts: &Options) -> Self {
        match opts.output_format {
            OutputFormat::Srt => Encoder::Srt(SrtEncoder::new()),
            OutputFormat::Transcript => Encoder::Transcript {
                dates: opts.date_format == DateFormat::Date,
            },
            OutputFormat::Rcwt => Encoder::Rcwt,
        }
    }

    /// Bytes written when a file is created.
    fn file_header(&self) -> Vec<u8> {
        match self {
            Encoder::Rcwt => {
                let mut header = Vec::new();
                rcwt::write_header(&mut header);
                header
            }
            _ => Vec::new(),
        }
    }

    /// Serializes one subtitle.
    pub fn encode_sub(&mut self, sub: &Subtitle) -> Vec<u8> {
        match self {
            Encoder::Srt(srt) => srt.encode(sub),
            Encoder::Transcript { dates } => {
                let Some(text) = sub.text_body() else {
                    return Vec::new();
                };
                let stamp = if *dates {
                    match Utc.timestamp_millis_opt(sub.start_ms).single() {
                        Some(t) => t.format("%Y%m%d%H%M%S%.3f").to_string(),
                        None => sub.start_ms.to_string(),
                    }
                } else {
                    super::srt::ms_to_srt_time(sub.start_ms)
                };
                format!("{}|{}\r\n", stamp, text).into_bytes()
            }
            Encoder::Rcwt => match &sub.payload {
                SubtitlePayload::Raw(bytes) => bytes.to_vec(),
                _ => Vec::new(),
            },
        }
    }

    fn reset(&mut self) {
        if let Encoder::Srt(srt) = self {
            srt.reset();
        }
    }
}

/// Addressing of one output file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputKey {
    /// The single default output
    Single,
    /// One file per program (multiprogram mode)
    Program(u16),
    /// One file per (PID, language) (split DVB subtitles)
    PidLang {
        /// Elementary PID of the subtitle stream
        pid: u16,
        /// Language tag, None for "und"
        lang: Option<String>,
    },
}

struct OutputFile {
    encoder: Encoder,
    path: PathBuf,
    /// Open handle, None in keep-output-closed mode
    file: Option<tokio::fs::File>,
    /// 1-based segment index; 0 = unsegmented
    segment_index: u32,
    segment_start_ms: Option<i64>,
    /// An interval boundary passed; cut at the next opportunity
    cut_pending: bool,
}

/// Maps programs and streams to subtitle files, applying the naming and
/// segmentation rules.
///
/// Files are created the moment their encoder is registered, so a stream
/// that never produces a subtitle still leaves an empty file, which is
/// how callers distinguish "no captions" from "never looked".
pub struct OutputMuxer {
    opts: Options,
    outputs: BTreeMap<OutputKey, OutputFile>,
    /// Key-frame seen since the last interval boundary passed
    key_since_boundary: bool,
}

impl OutputMuxer {
    /// Creates a muxer with no outputs yet.
    pub fn new(opts: Options) -> Self {
        Self {
            opts,
            outputs: BTreeMap::new(),
            key_since_boundary: false,
        }
    }

    fn file_name(&self, key: &OutputKey, segment_index: u32) -> PathBuf {
        let base = &self.opts.output_basename;
        let ext = self.opts.output_extension();
        let name = match key {
            OutputKey::Single => {
                if segment_index > 0 {
                    format!("{}_{:06}.{}", base, segment_index, ext)
                } else {
                    format!("{}.{}", base, ext)
                }
            }
            OutputKey::Program(program) => format!("{}_{}.{}", base, program, ext),
            OutputKey::PidLang { pid, lang } => match lang {
                Some(lang) if lang != "und" => format!("{}_{}_0x{:04X}.{}", base, lang, pid, ext),
                _ => format!("{}_0x{:04X}.{}", base, pid, ext),
            },
        };
        PathBuf::from(name)
    }

    /// Registers (and creates) the output a key maps to. Idempotent.
    pub async fn ensure_output(&mut self, key: OutputKey) -> Result<()> {
        if self.outputs.contains_key(&key) {
            return Ok(());
        }

        let encoder = Encoder::for_options(&self.opts);
        let segment_index = if self.opts.out_interval_ms > 0 && key == OutputKey::Single {
            1
        } else {
            0
        };
        let path = self.file_name(&key, segment_index);
        info!("creating {}", path.display());

        let header = encoder.file_header();
        let file = if self.opts.keep_output_closed {
            if !header.is_empty() {
                let mut f = tokio::fs::File::create(&path).await?;
                f.write_all(&header).await?;
                f.flush().await?;
            } else {
                tokio::fs::File::create(&path).await?;
            }
            None
        } else {
            let mut f = tokio::fs::File::create(&path).await?;
            if !header.is_empty() {
                f.write_all(&header).await?;
            }
            Some(f)
        };

        self.outputs.insert(
            key,
            OutputFile {
                encoder,
                path,
                file,
                segment_index,
                segment_start_ms: None,
                cut_pending: false,
            },
        );
        Ok(())
    }

    /// Notes a video key frame, unlocking any deferred segment cut.
    pub fn note_key_frame(&mut self) {
        self.key_since_boundary = true;
    }

    /// Encodes and writes one subtitle to the output behind `key`,
    /// rotating segment files when the interval rules say so.
    pub async fn encode(&mut self, key: &OutputKey, sub: &Subtitle) -> Result<()> {
        self.ensure_output(key.clone()).await?;
        self.maybe_rotate(key, sub.start_ms).await?;

        let out = self
            .outputs
            .get_mut(key)
            .ok_or_else(|| crate::error::TsCapError::Bug("output vanished after ensure".into()))?;
        if out.segment_start_ms.is_none() {
            out.segment_start_ms = Some(sub.start_ms);
        }

        let bytes = out.encoder.encode_sub(sub);
        if bytes.is_empty() {
            return Ok(());
        }

        if self.opts.keep_output_closed {
            // reopen for append around every write, trading throughput for
            // crash safety
            let mut f = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&out.path)
                .await?;
            f.write_all(&bytes).await?;
            f.flush().await?;
        } else if let Some(f) = out.file.as_mut() {
            f.write_all(&bytes).await?;
        }
        Ok(())
    }

    async fn maybe_rotate(&mut self, key: &OutputKey, fts_ms: i64) -> Result<()> {
        if self.opts.out_interval_ms <= 0 || *key != OutputKey::Single {
            return Ok(());
        }

        let boundary_passed = {
            let out = match self.outputs.get_mut(key) {
                Some(o) => o,
                None => return Ok(()),
            };
            match out.segment_start_ms {
                Some(start) if fts_ms - start >= self.opts.out_interval_ms => {
                    out.cut_pending = true;
                    true
                }
                _ => out.cut_pending,
            }
        };
        if !boundary_passed {
            return Ok(());
        }
        if self.opts.segment_on_key_frames_only && !self.key_since_boundary {
            debug!("segment boundary passed, waiting for a key frame");
            return Ok(());
        }

        // cut: next index, fresh file, counter reset
        let next_index = self.outputs.get(key).map_or(1, |o| o.segment_index + 1);
        let path = self.file_name(key, next_index);
        info!("starting new segment {}", path.display());
        let file = if self.opts.keep_output_closed {
            tokio::fs::File::create(&path).await?;
            None
        } else {
            Some(tokio::fs::File::create(&path).await?)
        };

        if let Some(out) = self.outputs.get_mut(key) {
            if let Some(f) = out.file.as_mut() {
                f.flush().await?;
            }
            out.file = file;
            out.path = path;
            out.segment_index = next_index;
            out.segment_start_ms = Some(fts_ms);
            out.cut_pending = false;
            out.encoder.reset();
        }
        self.key_since_boundary = false;
        Ok(())
    }

    /// Flushes and closes every output.
    pub async fn close(&mut self) -> Result<()> {
        for out in self.outputs.values_mut() {
            if let Some(f) = out.file.as_mut() {
                f.flush().await?;
            }
            out.file = None;
        }
        Ok(())
    }

    /// Paths of every file the muxer created, in key order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.outputs.values().map(|o| o.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    fn opts_in(dir: &std::path::Path, name: &str) -> Options {
        Options {
            output_basename: dir.join(name).to_string_lossy().into_owned(),
            ..Options::default()
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tscap-out-{}", tag));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn single_output_writes_srt() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = temp_dir("single");
            let mut muxer = OutputMuxer::new(opts_in(&dir, "out"));
            muxer
                .encode(&OutputKey::Single, &Subtitle::text("Hello, world.", 1000, 3000))
                .await
                .unwrap();
            muxer.close().await.unwrap();

            let written = std::fs::read_to_string(dir.join("out.srt")).unwrap();
            assert_eq!(
                written,
                "1\r\n00:00:01,000 --> 00:00:03,000\r\nHello, world.\r\n\r\n"
            );
        });
    }

    #[test]
    fn multiprogram_names_by_program() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = temp_dir("multi");
            let mut muxer = OutputMuxer::new(opts_in(&dir, "out"));
            muxer.ensure_output(OutputKey::Program(1)).await.unwrap();
            muxer.ensure_output(OutputKey::Program(2)).await.unwrap();
            muxer
                .encode(&OutputKey::Program(1), &Subtitle::text("only here", 0, 1000))
                .await
                .unwrap();
            muxer.close().await.unwrap();

            assert!(dir.join("out_1.srt").exists());
            // the second program's file exists and is empty
            let empty = std::fs::read_to_string(dir.join("out_2.srt")).unwrap();
            assert!(empty.is_empty());
        });
    }

    #[test]
    fn split_dvb_naming() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = temp_dir("split");
            let mut muxer = OutputMuxer::new(opts_in(&dir, "out"));
            muxer
                .ensure_output(OutputKey::PidLang {
                    pid: 0x0234,
                    lang: Some("deu".into()),
                })
                .await
                .unwrap();
            muxer
                .ensure_output(OutputKey::PidLang {
                    pid: 0x0235,
                    lang: None,
                })
                .await
                .unwrap();
            muxer.close().await.unwrap();

            assert!(dir.join("out_deu_0x0234.srt").exists());
            // "und" language omits the tag
            assert!(dir.join("out_0x0235.srt").exists());
        });
    }

    #[test]
    fn interval_segmentation_rotates_files() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = temp_dir("interval");
            let mut opts = opts_in(&dir, "out");
            opts.out_interval_ms = 10_000;
            let mut muxer = OutputMuxer::new(opts);

            muxer
                .encode(&OutputKey::Single, &Subtitle::text("first", 1000, 2000))
                .await
                .unwrap();
            muxer
                .encode(&OutputKey::Single, &Subtitle::text("second", 12_000, 13_000))
                .await
                .unwrap();
            muxer.close().await.unwrap();

            let first = std::fs::read_to_string(dir.join("out_000001.srt")).unwrap();
            let second = std::fs::read_to_string(dir.join("out_000002.srt")).unwrap();
            assert!(first.contains("first"));
            assert!(second.contains("second"));
            // cue numbering restarts per segment
            assert!(second.starts_with("1\r\n"));
        });
    }

    #[test]
    fn key_frame_only_segmentation_defers_cut() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = temp_dir("keyonly");
            let mut opts = opts_in(&dir, "out");
            opts.out_interval_ms = 10_000;
            opts.segment_on_key_frames_only = true;
            let mut muxer = OutputMuxer::new(opts);

            muxer
                .encode(&OutputKey::Single, &Subtitle::text("first", 1000, 2000))
                .await
                .unwrap();
            // boundary passed but no key frame yet: same file
            muxer
                .encode(&OutputKey::Single, &Subtitle::text("second", 12_000, 13_000))
                .await
                .unwrap();
            muxer.note_key_frame();
            muxer
                .encode(&OutputKey::Single, &Subtitle::text("third", 13_000, 14_000))
                .await
                .unwrap();
            muxer.close().await.unwrap();

            let first = std::fs::read_to_string(dir.join("out_000001.srt")).unwrap();
            let second = std::fs::read_to_string(dir.join("out_000002.srt")).unwrap();
            assert!(first.contains("first"));
            assert!(first.contains("second"));
            assert!(second.contains("third"));
        });
    }
}
