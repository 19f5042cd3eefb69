//! # Pipeline
//!
//! The orchestrator: a single-threaded pull loop that asks the demuxer
//! for the next caption payload, routes it to the right decoder, and
//! pushes completed subtitles into the output muxer. All lifecycle
//! decisions live here — decoder/encoder creation, end-time clipping,
//! the processed-enough check, EOF flushing, and the mapping from errors
//! to process exit codes.

use crate::codec::Decoder;
use crate::config::Options;
use crate::error::{exit_codes, Result, TsCapError};
use crate::format::ts::TsDemuxer;
use crate::format::{CaptionKind, DemuxerData};
use crate::io::BufferedInput;
use crate::sub::{OutputKey, OutputMuxer, Subtitle};
use crate::timing::{FrameType, TimingContext};
use log::{info, warn};
use std::collections::BTreeMap;

/// Counters reported when a run finishes.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// Subtitles written across all outputs
    pub subtitles_written: u64,
    /// Continuity gaps observed by the TS parser
    pub cc_gaps: u64,
    /// Programs that produced at least one subtitle
    pub programs_with_output: u64,
}

/// The top-level processing pipeline.
pub struct Pipeline {
    opts: Options,
    demuxer: TsDemuxer,
    muxer: OutputMuxer,
    decoders: BTreeMap<(u16, u16), Decoder>,
    timing: BTreeMap<u16, TimingContext>,
    done: BTreeMap<u16, bool>,
    report: RunReport,
}

impl Pipeline {
    /// Opens the input described by the options and builds the pipeline.
    pub async fn open(opts: Options) -> Result<Self> {
        let input = BufferedInput::open(&opts).await?;
        Ok(Self::with_input(input, opts))
    }

    /// Builds a pipeline over an already opened input (tests, replay).
    pub fn with_input(input: BufferedInput, opts: Options) -> Self {
        let demuxer = TsDemuxer::new(input, opts.clone());
        let muxer = OutputMuxer::new(opts.clone());
        Self {
            opts,
            demuxer,
            muxer,
            decoders: BTreeMap::new(),
            timing: BTreeMap::new(),
            done: BTreeMap::new(),
            report: RunReport::default(),
        }
    }

    /// Runs the pull loop until the input ends, every decoder is done, or
    /// the user interrupts. Pending subtitles are flushed in all cases.
    pub async fn run(&mut self) -> Result<RunReport> {
        let mut interrupted = Box::pin(async {
            if tokio::signal::ctrl_c().await.is_err() {
                // no signal handling available; never trigger this arm
                std::future::pending::<()>().await;
            }
        });

        loop {
            if self.processed_enough() {
                info!("requested range processed, stopping");
                break;
            }

            let data = tokio::select! {
                biased;
                _ = &mut interrupted => {
                    warn!("interrupt received, shutting down cleanly");
                    break;
                }
                data = self.demuxer.next_payload() => data?,
            };

            if self.demuxer.take_psi_reset() {
                // a PAT change removed the decoders' programs: flush their
                // pending subtitles with the best-known end times, rebuild
                self.teardown_decoders().await?;
            }
            if self.demuxer.take_file_boundary() {
                // next input file without binary concat: clocks restart,
                // output files stay open and FTS keeps growing
                for timing in self.timing.values_mut() {
                    timing.reset_for_new_file();
                }
            }

            match data {
                Some(data) => self.step(data).await?,
                None => break,
            }
        }

        self.flush_all().await?;
        self.muxer.close().await?;
        info!(
            "done: {} subtitles, {} continuity gaps",
            self.report.subtitles_written, self.report.cc_gaps
        );
        Ok(self.report.clone())
    }

    /// One pull step: route a payload to its decoder and encode whatever
    /// completed.
    async fn step(&mut self, data: DemuxerData) -> Result<()> {
        let program = data.program_number;
        if *self.done.get(&program).unwrap_or(&false) {
            return Ok(());
        }

        let timing = self
            .timing
            .entry(program)
            .or_insert_with(|| TimingContext::new(self.opts.timing, self.opts.subs_delay_ms));

        let key = output_key(&self.opts, &data);
        let decoder_id = (program, data.pid);
        if !self.decoders.contains_key(&decoder_id) {
            match Decoder::for_kind(data.codec, &self.opts, data.lang.clone()) {
                Some(decoder) => {
                    self.muxer.ensure_output(key.clone()).await?;
                    self.decoders.insert(decoder_id, decoder);
                }
                None => return Ok(()),
            }
        }
        let decoder = self
            .decoders
            .get_mut(&decoder_id)
            .ok_or_else(|| TsCapError::Bug("decoder vanished after insert".into()))?;

        if data.key_frame {
            self.muxer.note_key_frame();
        }

        let subs = decoder.feed(&data, timing)?;
        if timing.current_picture_coding_type == FrameType::IFrame {
            self.muxer.note_key_frame();
        }
        let fts_now = timing.get_fts();
        for sub in subs {
            self.write_subtitle(&key, program, sub).await?;
        }

        if let Some(end) = self.opts.end_at_ms {
            if fts_now > end {
                self.done.insert(program, true);
            }
        }
        Ok(())
    }

    async fn write_subtitle(&mut self, key: &OutputKey, program: u16, sub: Subtitle) -> Result<()> {
        if let Some(end) = self.opts.end_at_ms {
            // a subtitle that starts past the end time is never emitted;
            // one that merely ends past it keeps its natural end time
            if sub.start_ms > end {
                self.done.insert(program, true);
                return Ok(());
            }
        }
        if let Some(start) = self.opts.start_at_ms {
            if sub.end_ms < start {
                return Ok(());
            }
        }
        self.muxer.encode(key, &sub).await?;
        self.report.subtitles_written += 1;
        Ok(())
    }

    /// In single-program mode, done as soon as the active decoder says
    /// so; in multiprogram mode, only when every known program is done.
    fn processed_enough(&self) -> bool {
        if self.done.is_empty() {
            return false;
        }
        if self.opts.multiprogram {
            !self.done.is_empty()
                && self.demuxer.registry().programs().count() > 0
                && self
                    .demuxer
                    .registry()
                    .programs()
                    .all(|p| *self.done.get(&p.program_number).unwrap_or(&false))
        } else {
            self.done.values().any(|&d| d)
        }
    }

    /// Flushes every decoder and encodes what falls out, with the same
    /// clipping rules as live subtitles.
    async fn flush_all(&mut self) -> Result<()> {
        let ids: Vec<(u16, u16)> = self.decoders.keys().copied().collect();
        let mut seen_programs = std::collections::BTreeSet::new();
        for id in ids {
            let (program, pid) = id;
            let timing = self
                .timing
                .entry(program)
                .or_insert_with(|| TimingContext::new(self.opts.timing, self.opts.subs_delay_ms));
            let (key, subs) = {
                let decoder = match self.decoders.get_mut(&id) {
                    Some(d) => d,
                    None => continue,
                };
                let kind = decoder.kind();
                let key = output_key_for(&self.opts, program, pid, kind, None);
                (key, decoder.flush(timing))
            };
            for sub in subs {
                self.write_subtitle(&key, program, sub).await?;
                seen_programs.insert(program);
            }
        }
        self.report.cc_gaps = self.demuxer.cc_gap_count();
        self.report.programs_with_output = seen_programs.len() as u64;
        Ok(())
    }

    /// Flushes and drops every decoder after a PSI change invalidated
    /// their programs. Output files stay open; new decoders are built as
    /// the new tables arrive.
    async fn teardown_decoders(&mut self) -> Result<()> {
        self.flush_all().await?;
        self.decoders.clear();
        Ok(())
    }

    /// Files created during the run, for reporting.
    pub fn output_paths(&self) -> Vec<std::path::PathBuf> {
        self.muxer.paths()
    }
}

/// Maps a run outcome to the process exit code.
pub fn exit_code(result: &Result<RunReport>) -> i32 {
    match result {
        Ok(_) => exit_codes::OK,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn output_key(opts: &Options, data: &DemuxerData) -> OutputKey {
    output_key_for(opts, data.program_number, data.pid, data.codec, data.lang.clone())
}

fn output_key_for(
    opts: &Options,
    program: u16,
    pid: u16,
    codec: CaptionKind,
    lang: Option<String>,
) -> OutputKey {
    if opts.split_dvb_subs && codec == CaptionKind::DvbSubtitle {
        return OutputKey::PidLang { pid, lang };
    }
    if opts.multiprogram {
        return OutputKey::Program(program);
    }
    OutputKey::Single
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_key_selection() {
        let mut opts = Options::default();
        assert_eq!(
            output_key_for(&opts, 1, 0x200, CaptionKind::Teletext, None),
            OutputKey::Single
        );

        opts.multiprogram = true;
        assert_eq!(
            output_key_for(&opts, 7, 0x200, CaptionKind::Teletext, None),
            OutputKey::Program(7)
        );

        opts.split_dvb_subs = true;
        assert_eq!(
            output_key_for(&opts, 7, 0x200, CaptionKind::DvbSubtitle, Some("deu".into())),
            OutputKey::PidLang {
                pid: 0x200,
                lang: Some("deu".into())
            }
        );
    }

    #[test]
    fn exit_code_mapping() {
        assert_eq!(exit_code(&Ok(RunReport::default())), exit_codes::OK);
        assert_eq!(
            exit_code(&Err(TsCapError::OutOfMemory("x".into()))),
            exit_codes::NOT_ENOUGH_MEMORY
        );
        assert_eq!(
            exit_code(&Err(TsCapError::Unsupported("x".into()))),
            exit_codes::FAILURE
        );
    }
}
