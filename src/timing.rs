//! # Timing Spine
//!
//! Joins PTS, PCR, GOP headers, and wall clock into one monotonic
//! presentation timeline — the FTS ("file timestamp", milliseconds since
//! the start of the input) that every encoder consumes.
//!
//! One [`TimingContext`] exists per program. Decoders report raw 33-bit PTS
//! values through [`TimingContext::set_current_pts`]; the context tracks the
//! minimum anchor, detects 33-bit rollovers versus discontinuities, and
//! serves [`TimingContext::get_fts`] queries.

use crate::config::TimingMode;
use crate::utils::BitReader;
use log::{debug, info};

/// One 33-bit PTS period, in 90 kHz ticks.
pub const PTS_ROLLOVER: u64 = 1 << 33;

/// Backward jumps smaller than this (in ticks) are jitter and ignored;
/// larger ones are classified as rollover or discontinuity. 60 seconds.
pub const DEFAULT_PTS_JUMP_THRESHOLD: u64 = 60 * 90_000;

/// Progress of PTS acquisition for a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtsSet {
    /// No PTS observed yet
    #[default]
    Unset,
    /// First value seen, anchor not yet confirmed by a second sample
    FirstSeen,
    /// Anchored; `get_fts` results are meaningful
    Locked,
}

/// Picture coding type from the video elementary stream, for GOP timing
/// and keyframe-only segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    /// Unknown or not yet parsed
    #[default]
    Unknown,
    /// Intra frame
    IFrame,
    /// Predicted frame
    PFrame,
    /// Bidirectional frame
    BFrame,
}

/// GOP header timestamp `H:MM:SS:FF` with drop-frame awareness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopTimeCode {
    /// Hours field
    pub hours: u8,
    /// Minutes field
    pub minutes: u8,
    /// Seconds field
    pub seconds: u8,
    /// Frame counter within the second
    pub frames: u8,
    /// Drop-frame flag from the GOP header
    pub drop_frame: bool,
}

impl GopTimeCode {
    /// Milliseconds represented by this time code at the given frame rate.
    pub fn to_ms(self, fps: f64) -> i64 {
        let base =
            (self.hours as i64) * 3_600_000 + (self.minutes as i64) * 60_000 + (self.seconds as i64) * 1000;
        base + ((self.frames as f64) * 1000.0 / fps) as i64
    }

    /// Scans an MPEG-2 video elementary stream chunk for a
    /// group-of-pictures header (start code 000001B8) and decodes its
    /// 25-bit time code. None when no GOP header is present or the chunk
    /// ends inside it.
    pub fn from_es(data: &[u8]) -> Option<GopTimeCode> {
        let pos = data.windows(4).position(|w| w == [0x00, 0x00, 0x01, 0xB8])?;
        let mut bits = BitReader::new(&data[pos + 4..]);
        let drop_frame = bits.read_bits(1).ok()? == 1;
        let hours = bits.read_bits(5).ok()? as u8;
        let minutes = bits.read_bits(6).ok()? as u8;
        bits.skip_bits(1).ok()?; // marker bit
        let seconds = bits.read_bits(6).ok()? as u8;
        let frames = bits.read_bits(6).ok()? as u8;
        Some(GopTimeCode {
            hours,
            minutes,
            seconds,
            frames,
            drop_frame,
        })
    }
}

/// Reads the picture header fields the timing spine consumes: temporal
/// reference and picture coding type (ISO 13818-2 picture start code
/// 00000100). Reserved coding types come back as `Unknown`.
pub fn parse_picture_header(data: &[u8]) -> Option<(FrameType, i32)> {
    let pos = data.windows(4).position(|w| w == [0x00, 0x00, 0x01, 0x00])?;
    let mut bits = BitReader::new(&data[pos + 4..]);
    let tref = bits.read_bits(10).ok()? as i32;
    let frame_type = match bits.read_bits(3).ok()? {
        1 => FrameType::IFrame,
        2 => FrameType::PFrame,
        3 => FrameType::BFrame,
        _ => FrameType::Unknown,
    };
    Some((frame_type, tref))
}

/// Per-program timing state.
#[derive(Debug)]
pub struct TimingContext {
    mode: TimingMode,
    pts_set: PtsSet,
    /// Monotonic anchor: the first (rollover-extended) PTS of the program
    min_pts: u64,
    /// Last raw 33-bit PTS observed, pre-extension
    last_raw_pts: u64,
    /// Rollover periods accumulated so far
    rollover_count: u32,
    /// Last extended PTS
    current_pts: u64,
    fts_now: i64,
    fts_max: i64,
    /// Carried across discontinuities and input-file switches
    fts_offset: i64,
    subs_delay: i64,
    jump_threshold: u64,

    /// Current picture type as reported by the video parser
    pub current_picture_coding_type: FrameType,
    /// Temporal reference of the current picture within its GOP
    pub current_tref: i32,

    gop_time_ms: Option<i64>,
    first_gop_time_ms: Option<i64>,
    frames_since_gop: u32,
    fps: f64,
}

impl TimingContext {
    /// Creates a timing context in the given mode with a signed subtitle
    /// delay in milliseconds.
    pub fn new(mode: TimingMode, subs_delay_ms: i64) -> Self {
        Self {
            mode,
            pts_set: PtsSet::Unset,
            min_pts: 0,
            last_raw_pts: 0,
            rollover_count: 0,
            current_pts: 0,
            fts_now: 0,
            fts_max: 0,
            fts_offset: 0,
            subs_delay: subs_delay_ms,
            jump_threshold: DEFAULT_PTS_JUMP_THRESHOLD,
            current_picture_coding_type: FrameType::Unknown,
            current_tref: 0,
            gop_time_ms: None,
            first_gop_time_ms: None,
            frames_since_gop: 0,
            fps: 25.0,
        }
    }

    /// Whether GOP headers, not PTS, drive this context. In auto mode the
    /// demuxer flips this when it detects an elementary stream with no PES
    /// wrapper.
    pub fn uses_gop_timing(&self) -> bool {
        matches!(self.mode, TimingMode::Gop)
    }

    /// Switches the context to GOP-derived timing (auto-mode fallback).
    pub fn force_gop_timing(&mut self) {
        if self.mode == TimingMode::Auto {
            info!("No PES timestamps available, switching to GOP timing");
            self.mode = TimingMode::Gop;
        }
    }

    /// Feeds a raw 33-bit PTS. Classifies backward jumps: a drop of almost
    /// a full 33-bit period is a rollover (the counter wrapped), anything
    /// else past the jump threshold is a discontinuity that re-anchors the
    /// timeline without disturbing already-emitted FTS values.
    pub fn set_current_pts(&mut self, raw_pts: u64) {
        let raw = raw_pts & (PTS_ROLLOVER - 1);

        match self.pts_set {
            PtsSet::Unset => {
                self.pts_set = PtsSet::FirstSeen;
                self.min_pts = raw;
                self.current_pts = raw;
            }
            PtsSet::FirstSeen | PtsSet::Locked => {
                if raw < self.last_raw_pts {
                    let drop = self.last_raw_pts - raw;
                    if drop > PTS_ROLLOVER - self.jump_threshold {
                        // counter wrapped at 2^33
                        self.rollover_count += 1;
                        info!(
                            "PTS rollover detected (drop of {} ticks), period {}",
                            drop, self.rollover_count
                        );
                    } else if drop > self.jump_threshold {
                        debug!("PTS discontinuity, re-anchoring timeline at {} ticks", raw);
                        self.reanchor(raw);
                        return;
                    }
                } else if raw - self.last_raw_pts > self.jump_threshold && self.pts_set == PtsSet::Locked {
                    debug!("forward PTS jump, re-anchoring timeline at {} ticks", raw);
                    self.reanchor(raw);
                    return;
                }
                self.current_pts = raw + (self.rollover_count as u64) * PTS_ROLLOVER;
            }
        }
        self.last_raw_pts = raw;
    }

    fn reanchor(&mut self, raw: u64) {
        // continue the timeline from where it stood
        self.fts_offset = self.fts_now;
        self.rollover_count = 0;
        self.min_pts = raw;
        self.current_pts = raw;
        self.last_raw_pts = raw;
    }

    /// Recomputes `fts_now` from the current PTS and updates the running
    /// maximum. Locks the PTS state on first success.
    pub fn set_fts(&mut self) {
        if self.pts_set == PtsSet::Unset {
            return;
        }
        let elapsed_ticks = self.current_pts.saturating_sub(self.min_pts);
        self.fts_now = (elapsed_ticks / 90) as i64 + self.subs_delay + self.fts_offset;
        if self.fts_now > self.fts_max {
            self.fts_max = self.fts_now;
        }
        self.pts_set = PtsSet::Locked;
    }

    /// Current presentation time in ms. Meaningful once `pts_set` is locked.
    pub fn get_fts(&self) -> i64 {
        if self.uses_gop_timing() {
            return self.gop_fts();
        }
        self.fts_now
    }

    /// Largest FTS handed out so far.
    pub fn get_fts_max(&self) -> i64 {
        self.fts_max
    }

    /// PTS acquisition state.
    pub fn pts_state(&self) -> PtsSet {
        self.pts_set
    }

    /// Carries accumulated time across an input-file switch when inputs are
    /// not binary-concatenated: the clock restarts but FTS keeps growing.
    pub fn reset_for_new_file(&mut self) {
        self.fts_offset = self.fts_max;
        self.pts_set = PtsSet::Unset;
        self.rollover_count = 0;
        self.gop_time_ms = None;
        self.frames_since_gop = 0;
    }

    /// Records a GOP header time code and restarts the intra-GOP frame
    /// counter.
    pub fn set_gop_time(&mut self, tc: GopTimeCode) {
        let ms = tc.to_ms(self.fps);
        if self.first_gop_time_ms.is_none() {
            self.first_gop_time_ms = Some(ms);
        }
        self.gop_time_ms = Some(ms);
        self.frames_since_gop = 0;
    }

    /// Counts one decoded frame against the current GOP.
    pub fn add_frame(&mut self) {
        self.frames_since_gop += 1;
    }

    /// Sets the frame rate used for GOP arithmetic.
    pub fn set_fps(&mut self, fps: f64) {
        if fps > 0.0 {
            self.fps = fps;
        }
    }

    fn gop_fts(&self) -> i64 {
        match (self.gop_time_ms, self.first_gop_time_ms) {
            (Some(gop), Some(first)) => {
                gop - first
                    + ((self.frames_since_gop as f64) * 1000.0 / self.fps) as i64
                    + self.subs_delay
                    + self.fts_offset
            }
            _ => self.fts_offset + self.subs_delay,
        }
    }

    /// Re-anchors buffered caption blocks to the start of the current GOP:
    /// returns the FTS that a block with the given temporal reference
    /// should carry. Used when GOP timing governs 608/708 data that was
    /// buffered across a GOP boundary.
    pub fn anchor_gop(&mut self, tref: i32) -> i64 {
        self.current_tref = tref;
        let base = match (self.gop_time_ms, self.first_gop_time_ms) {
            (Some(gop), Some(first)) => gop - first,
            _ => 0,
        };
        base + ((tref.max(0) as f64) * 1000.0 / self.fps) as i64 + self.subs_delay + self.fts_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TimingContext {
        TimingContext::new(TimingMode::Auto, 0)
    }

    #[test]
    fn fts_follows_pts() {
        let mut t = ctx();
        t.set_current_pts(90_000);
        t.set_fts();
        assert_eq!(t.get_fts(), 0);
        t.set_current_pts(270_000);
        t.set_fts();
        assert_eq!(t.get_fts(), 2000);
        assert_eq!(t.get_fts_max(), 2000);
        assert_eq!(t.pts_state(), PtsSet::Locked);
    }

    #[test]
    fn rollover_keeps_timeline_growing() {
        let mut t = ctx();
        let before = PTS_ROLLOVER - 45_000;
        t.set_current_pts(before);
        t.set_fts();
        let fts_before = t.get_fts();
        t.set_current_pts(45_000);
        t.set_fts();
        // the two samples are 90_000 ticks apart across the wrap: 1000 ms
        assert_eq!(t.get_fts() - fts_before, 1000);
    }

    #[test]
    fn discontinuity_reanchors_monotonically() {
        let mut t = ctx();
        t.set_current_pts(200_000_000);
        t.set_fts();
        t.set_current_pts(200_090_000);
        t.set_fts();
        let before = t.get_fts();
        // jump back 20 minutes: discontinuity, not rollover
        t.set_current_pts(200_090_000 - 20 * 60 * 90_000);
        t.set_fts();
        assert!(t.get_fts() >= before);
    }

    #[test]
    fn subs_delay_shifts_output() {
        let mut t = TimingContext::new(TimingMode::Auto, 250);
        t.set_current_pts(90_000);
        t.set_fts();
        assert_eq!(t.get_fts(), 250);
    }

    #[test]
    fn gop_time_code_ms() {
        let tc = GopTimeCode {
            hours: 1,
            minutes: 2,
            seconds: 3,
            frames: 5,
            drop_frame: false,
        };
        assert_eq!(tc.to_ms(25.0), 3_723_000 + 200);
    }

    // MSB-first bit packer for building header fixtures
    fn pack_bits(fields: &[(u32, u8)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut acc = 0u32;
        let mut nbits = 0u8;
        for &(value, width) in fields {
            for i in (0..width).rev() {
                acc = (acc << 1) | ((value >> i) & 1);
                nbits += 1;
                if nbits == 8 {
                    out.push(acc as u8);
                    acc = 0;
                    nbits = 0;
                }
            }
        }
        if nbits > 0 {
            out.push((acc << (8 - nbits)) as u8);
        }
        out
    }

    #[test]
    fn gop_header_time_code_from_es() {
        let mut es = vec![0xAB, 0xCD, 0x00, 0x00, 0x01, 0xB8];
        // drop(1) hours(5) minutes(6) marker(1) seconds(6) frames(6)
        es.extend(pack_bits(&[(0, 1), (1, 5), (2, 6), (1, 1), (3, 6), (4, 6)]));
        let tc = GopTimeCode::from_es(&es).unwrap();
        assert_eq!((tc.hours, tc.minutes, tc.seconds, tc.frames), (1, 2, 3, 4));
        assert!(!tc.drop_frame);

        // a picture start code is not a GOP header
        assert!(GopTimeCode::from_es(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x00]).is_none());
        // truncated inside the time code
        assert!(GopTimeCode::from_es(&[0x00, 0x00, 0x01, 0xB8, 0x12]).is_none());
    }

    #[test]
    fn picture_header_fields_from_es() {
        let mut es = vec![0x00, 0x00, 0x01, 0x00];
        // temporal_reference(10) picture_coding_type(3), then padding
        es.extend(pack_bits(&[(5, 10), (1, 3), (0, 3)]));
        let (frame_type, tref) = parse_picture_header(&es).unwrap();
        assert_eq!(frame_type, FrameType::IFrame);
        assert_eq!(tref, 5);

        let mut es = vec![0x00, 0x00, 0x01, 0x00];
        es.extend(pack_bits(&[(1023, 10), (3, 3), (0, 3)]));
        let (frame_type, tref) = parse_picture_header(&es).unwrap();
        assert_eq!(frame_type, FrameType::BFrame);
        assert_eq!(tref, 1023);
    }

    #[test]
    fn new_file_resets_but_keeps_max() {
        let mut t = ctx();
        t.set_current_pts(90_000);
        t.set_fts();
        t.set_current_pts(990_000);
        t.set_fts();
        let max = t.get_fts_max();
        t.reset_for_new_file();
        t.set_current_pts(90_000);
        t.set_fts();
        assert_eq!(t.get_fts(), max);
    }
}
