//! # CEA-608/708 Dispatcher
//!
//! Extracts ATSC `cc_data` user-data sections from MPEG-2 picture user
//! data or H.264 SEI payloads and routes the byte pairs to the 608 and 708
//! decoders. The decoders themselves live behind the [`CaptionSink`]
//! contract; this module owns triple parsing, presentation ordering, and
//! the per-service byte counters used for rate estimation when PTS is
//! absent.

use crate::sub::Subtitle;
use crate::timing::TimingContext;
use log::debug;

/// ATSC identifier preceding `cc_data` in user data ("GA94").
pub const ATSC_IDENTIFIER: [u8; 4] = [0x47, 0x41, 0x39, 0x34];
/// user_data_type_code for cc_data
pub const USER_DATA_TYPE_CC: u8 = 0x03;

/// Decoded `cc_type` values of a caption triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcType {
    /// NTSC field 1 pair (CEA-608)
    Field1,
    /// NTSC field 2 pair (CEA-608)
    Field2,
    /// DTVCC channel packet continuation (CEA-708)
    DtvccContinue,
    /// DTVCC channel packet start (CEA-708)
    DtvccStart,
}

impl CcType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => CcType::Field1,
            1 => CcType::Field2,
            2 => CcType::DtvccContinue,
            _ => CcType::DtvccStart,
        }
    }
}

/// One `(cc_valid, cc_type, cc_data_1, cc_data_2)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcTriple {
    /// Whether the pair carries data
    pub valid: bool,
    /// Routing type
    pub cc_type: CcType,
    /// First data byte
    pub data1: u8,
    /// Second data byte
    pub data2: u8,
}

/// How caption blocks are ordered before being fed to the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CcOrdering {
    /// By PES presentation timestamp
    #[default]
    Pts,
    /// By H.264 `pic_order_cnt_lsb`
    PicOrderCnt,
}

/// Contract of the 608 and 708 decoders: consume caption bytes with their
/// presentation time, possibly completing subtitles.
pub trait CaptionSink {
    /// Feeds one byte pair (608) or DTVCC packet fragment (708).
    fn feed(&mut self, bytes: &[u8], fts_ms: i64) -> Vec<Subtitle>;
    /// Flushes any partial caption at end of stream.
    fn flush(&mut self) -> Vec<Subtitle>;
}

/// Parses the `cc_data` construct that follows a GA94/type-3 user data
/// header. Returns the triples in transmission order.
pub fn parse_cc_data(data: &[u8]) -> Vec<CcTriple> {
    let mut triples = Vec::new();
    if data.len() < 2 {
        return triples;
    }

    // flags: process_cc_data_flag (bit 6) and cc_count (low 5 bits)
    let process_cc_data = data[0] & 0x40 != 0;
    let cc_count = (data[0] & 0x1F) as usize;
    if !process_cc_data {
        return triples;
    }

    let mut pos = 2; // skip em_data
    for _ in 0..cc_count {
        if pos + 3 > data.len() {
            debug!("cc_data truncated mid-triple");
            break;
        }
        let b = data[pos];
        triples.push(CcTriple {
            valid: b & 0x04 != 0,
            cc_type: CcType::from_bits(b),
            data1: data[pos + 1],
            data2: data[pos + 2],
        });
        pos += 3;
    }
    triples
}

/// Locates the `cc_data` construct within a user-data payload: the GA94
/// identifier followed by user_data_type_code 0x03.
pub fn find_cc_data(user_data: &[u8]) -> Option<&[u8]> {
    let idx = user_data
        .windows(5)
        .position(|w| w[..4] == ATSC_IDENTIFIER && w[4] == USER_DATA_TYPE_CC)?;
    Some(&user_data[idx + 5..])
}

#[derive(Debug)]
struct PendingPicture {
    /// Ordering key: PTS ms or pic_order_cnt_lsb
    key: i64,
    /// Arrival order tie-breaker
    seq: u64,
    /// Temporal reference within the GOP, for GOP-timed streams
    tref: i32,
    triples: Vec<CcTriple>,
}

/// Routes caption triples to the 608/708 sinks in presentation order.
///
/// Pictures arrive in decode order; their captions must be fed in
/// presentation order. The dispatcher keeps a small reorder window and
/// drains it whenever it exceeds the B-frame depth any real stream uses.
pub struct AtscDispatcher {
    ordering: CcOrdering,
    pending: Vec<PendingPicture>,
    seq: u64,
    reorder_depth: usize,

    sink_608: Box<dyn CaptionSink>,
    sink_708: Box<dyn CaptionSink>,

    /// Field-1 byte pairs seen, for rate estimation without PTS
    pub cb_field1: u64,
    /// Field-2 byte pairs seen
    pub cb_field2: u64,
    /// DTVCC byte pairs seen
    pub cb_708: u64,
}

impl AtscDispatcher {
    /// Creates a dispatcher feeding the given decoder sinks.
    pub fn new(ordering: CcOrdering, sink_608: Box<dyn CaptionSink>, sink_708: Box<dyn CaptionSink>) -> Self {
        Self {
            ordering,
            pending: Vec::new(),
            seq: 0,
            reorder_depth: 8,
            sink_608,
            sink_708,
            cb_field1: 0,
            cb_field2: 0,
            cb_708: 0,
        }
    }

    /// Buffers one picture's caption triples. `pts_ms` keys PTS ordering,
    /// `poc` keys picture-order ordering; `tref` is kept for GOP-timed
    /// re-anchoring.
    pub fn add_picture(&mut self, triples: Vec<CcTriple>, pts_ms: i64, poc: i32, tref: i32) -> Vec<Subtitle> {
        if triples.is_empty() {
            return Vec::new();
        }
        let key = match self.ordering {
            CcOrdering::Pts => pts_ms,
            CcOrdering::PicOrderCnt => poc as i64,
        };
        self.pending.push(PendingPicture {
            key,
            seq: self.seq,
            tref,
            triples,
        });
        self.seq += 1;

        if self.pending.len() > self.reorder_depth {
            self.drain(self.pending.len() - self.reorder_depth)
        } else {
            Vec::new()
        }
    }

    /// Re-anchors every buffered picture to the start of a new GOP and
    /// feeds it out: captions flushed during the old GOP get wall-clock
    /// times derived from their temporal reference.
    pub fn anchor_gop(&mut self, timing: &mut TimingContext) -> Vec<Subtitle> {
        if timing.uses_gop_timing() {
            for p in &mut self.pending {
                p.key = timing.anchor_gop(p.tref);
            }
        }
        self.drain(self.pending.len())
    }

    /// Flushes everything buffered plus the decoder sinks.
    pub fn flush(&mut self) -> Vec<Subtitle> {
        let mut subs = self.drain(self.pending.len());
        subs.extend(self.sink_608.flush());
        subs.extend(self.sink_708.flush());
        subs
    }

    fn drain(&mut self, count: usize) -> Vec<Subtitle> {
        let mut subs = Vec::new();
        if count == 0 {
            return subs;
        }
        self.pending.sort_by_key(|p| (p.key, p.seq));
        let take = count.min(self.pending.len());
        for picture in self.pending.drain(..take) {
            let fts = picture.key;
            for t in &picture.triples {
                if !t.valid {
                    continue;
                }
                let pair = [t.data1, t.data2];
                match t.cc_type {
                    CcType::Field1 => {
                        self.cb_field1 += 1;
                        subs.extend(self.sink_608.feed(&pair, fts));
                    }
                    CcType::Field2 => {
                        self.cb_field2 += 1;
                        subs.extend(self.sink_608.feed(&pair, fts));
                    }
                    CcType::DtvccStart | CcType::DtvccContinue => {
                        self.cb_708 += 1;
                        subs.extend(self.sink_708.feed(&pair, fts));
                    }
                }
            }
        }
        subs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingMode;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingSink {
        log: Rc<RefCell<Vec<(Vec<u8>, i64)>>>,
    }

    impl CaptionSink for RecordingSink {
        fn feed(&mut self, bytes: &[u8], fts_ms: i64) -> Vec<Subtitle> {
            self.log.borrow_mut().push((bytes.to_vec(), fts_ms));
            Vec::new()
        }
        fn flush(&mut self) -> Vec<Subtitle> {
            Vec::new()
        }
    }

    fn cc_data_bytes(triples: &[(bool, u8, u8, u8)]) -> Vec<u8> {
        let mut data = vec![0x40 | triples.len() as u8, 0x00];
        for &(valid, cc_type, d1, d2) in triples {
            let mut b = 0xF8 | (cc_type & 0x03);
            if valid {
                b |= 0x04;
            }
            data.push(b);
            data.push(d1);
            data.push(d2);
        }
        data.push(0xFF); // marker
        data
    }

    #[test]
    fn parses_triples() {
        let data = cc_data_bytes(&[(true, 0, 0x41, 0x42), (false, 3, 0x00, 0x00)]);
        let triples = parse_cc_data(&data);
        assert_eq!(triples.len(), 2);
        assert!(triples[0].valid);
        assert_eq!(triples[0].cc_type, CcType::Field1);
        assert_eq!((triples[0].data1, triples[0].data2), (0x41, 0x42));
        assert!(!triples[1].valid);
        assert_eq!(triples[1].cc_type, CcType::DtvccStart);
    }

    #[test]
    fn finds_ga94_block() {
        let mut user_data = vec![0xB5, 0x00, 0x31];
        user_data.extend_from_slice(&ATSC_IDENTIFIER);
        user_data.push(USER_DATA_TYPE_CC);
        user_data.extend_from_slice(&cc_data_bytes(&[(true, 0, 0x20, 0x20)]));
        let cc = find_cc_data(&user_data).unwrap();
        assert_eq!(parse_cc_data(cc).len(), 1);
    }

    #[test]
    fn orders_by_pts_and_counts_bytes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log708 = Rc::new(RefCell::new(Vec::new()));
        let mut d = AtscDispatcher::new(
            CcOrdering::Pts,
            Box::new(RecordingSink { log: log.clone() }),
            Box::new(RecordingSink { log: log708.clone() }),
        );
        let t1 = vec![CcTriple { valid: true, cc_type: CcType::Field1, data1: 1, data2: 1 }];
        let t2 = vec![CcTriple { valid: true, cc_type: CcType::Field1, data1: 2, data2: 2 }];
        let t708 = vec![CcTriple { valid: true, cc_type: CcType::DtvccStart, data1: 9, data2: 9 }];

        // decode order: 2000, 1000 (B-frame reorder), 3000 for the 708 pair
        d.add_picture(t1, 2000, 0, 0);
        d.add_picture(t2, 1000, 0, 0);
        d.add_picture(t708, 3000, 0, 0);
        d.flush();

        let fed: Vec<i64> = log.borrow().iter().map(|(_, t)| *t).collect();
        assert_eq!(fed, vec![1000, 2000], "608 pairs fed in presentation order");
        assert_eq!(log708.borrow().len(), 1);
        assert_eq!(d.cb_field1, 2);
        assert_eq!(d.cb_708, 1);
        assert_eq!(d.cb_field2, 0);
    }

    #[test]
    fn gop_anchor_rekeys_pending() {
        use crate::timing::GopTimeCode;

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = AtscDispatcher::new(
            CcOrdering::Pts,
            Box::new(RecordingSink { log: log.clone() }),
            Box::new(RecordingSink { log: Rc::new(RefCell::new(Vec::new())) }),
        );
        let mut timing = TimingContext::new(TimingMode::Gop, 0);
        timing.set_gop_time(GopTimeCode {
            hours: 0,
            minutes: 0,
            seconds: 10,
            frames: 0,
            drop_frame: false,
        });

        let triples = vec![CcTriple { valid: true, cc_type: CcType::Field1, data1: 1, data2: 1 }];
        d.add_picture(triples, 0, 0, 5);
        d.anchor_gop(&mut timing);

        let fed = log.borrow();
        assert_eq!(fed.len(), 1);
        // tref 5 at 25 fps is 200 ms past the GOP start
        assert_eq!(fed[0].1, 200);
    }

    #[test]
    fn invalid_triples_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = AtscDispatcher::new(
            CcOrdering::Pts,
            Box::new(RecordingSink { log: log.clone() }),
            Box::new(RecordingSink { log: Rc::new(RefCell::new(Vec::new())) }),
        );
        let triples = vec![CcTriple { valid: false, cc_type: CcType::Field1, data1: 0, data2: 0 }];
        d.add_picture(triples, 0, 0, 0);
        d.flush();
        assert!(log.borrow().is_empty());
        assert_eq!(d.cb_field1, 0);
    }
}
