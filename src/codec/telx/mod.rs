//! # Teletext Decoder
//!
//! ETSI 300 706 Presentation Level 1.5 page decoder. Level 1 defines the
//! basic Teletext page with spacing attributes; Level 1.5 extends the
//! character repertoire through packets X/26, and selected national-option
//! features of Level 2.5 are implemented (X/28/0 Format 1, X/28/4, M/29/0,
//! M/29/4).
//!
//! The decoder consumes whole PES packets from private stream 1, walks
//! their 46-byte data units, and maintains the magazine/row/page state
//! machine that turns rows into timed subtitles. Timing comes from the
//! per-program [`TimingContext`]; when the Teletext PES carries no PTS the
//! PCR-derived global timestamp supplied by the demuxer is used instead,
//! and the choice is latched on the first PES.
//!
//! Ordering contract: packets X/26 arrive before the display rows they
//! enhance (ETS 300 706 annex B.2.2), so display rows only write grid
//! cells that are still empty, and the grid is cleared exclusively on a
//! watched-page header transition. In parallel transmission mode an
//! enhancement for the next page may land before that page's header; that
//! is accepted, exactly like the mode's ordering allows.

use crate::config::{DateFormat, Options, OutputFormat};
use crate::error::Result;
use crate::format::ts::pes::parse_pes_header;
use crate::format::ts::types::STREAM_ID_PRIVATE_1;
use crate::sub::Subtitle;
use crate::timing::TimingContext;
use chrono::{TimeZone, Utc};
use log::{debug, info};
use std::collections::BTreeSet;

/// Character tables and Hamming/parity decoding
pub mod tables;

/// Page grid, rendering, and the typo-merge commit cell
pub mod page;

/// RCWT round-trip framing for Teletext data units
pub mod rcwt;

use page::{CommitCell, CommittedPage, RenderOptions, TeletextPage, TransmissionMode};
use tables::{
    accented_char, bcd_page_to_int, g0_char, g2_char, latin_subset_index, parity_valid,
    reverse_bits, unham_24_18, unham_8_4, G0Charset, UNHAM_24_18_ERROR,
};

/// EBU Teletext non-subtitle data unit id
pub const DATA_UNIT_TELETEXT_NONSUBTITLE: u8 = 0x02;
/// EBU Teletext subtitle data unit id
pub const DATA_UNIT_TELETEXT_SUBTITLE: u8 = 0x03;
/// Fixed payload size of a Teletext data unit
pub const DATA_UNIT_PAYLOAD_LEN: usize = 44;

fn magazine_of(page: u16) -> u16 {
    (page >> 8) & 0xf
}

fn page_of(page: u16) -> u16 {
    page & 0xff
}

/// Converts a decimal page number (888) to the magazine/BCD form the page
/// headers carry (0x888).
pub fn decimal_page_to_bcd(page: u16) -> u16 {
    ((page / 100) << 8) | (((page / 10) % 10) << 4) | (page % 10)
}

#[derive(Debug, Default)]
struct PrimaryCharset {
    current_subset: usize,
    g0_m29: Option<u8>,
    g0_x28: Option<u8>,
    default_g0: G0Charset,
}

/// The Teletext decoder for one elementary stream.
pub struct TelxDecoder {
    /// Page the user (or auto-detection) wants, magazine/BCD form; 0 means
    /// "not locked yet"
    watched_page: u16,

    page_buffer: TeletextPage,
    transmission_mode: TransmissionMode,
    receiving_data: bool,
    charset: PrimaryCharset,
    commit: CommitCell,
    render_opts: RenderOptions,

    sentence_cap: bool,
    cap_words: Vec<String>,
    output_format: OutputFormat,
    date_format: DateFormat,
    no_auto_time_ref: bool,
    start_at_ms: Option<i64>,
    end_at_ms: Option<i64>,

    /// Pages that carried the subtitle flag, decimal form, for reporting
    seen_sub_pages: BTreeSet<u16>,
    programme_info_processed: bool,
    /// UTC reference taken from packet 8/30, seconds since the epoch
    utc_ref: Option<i64>,

    /// Whether PES PTS (true) or the demuxer PCR clock (false) drives
    /// timestamps; latched on the first PES
    using_pts: Option<bool>,
    /// Latest PCR-derived wall clock from the demuxer, ms
    global_timestamp_ms: i64,
    last_timestamp_ms: i64,

    packet_counter: u64,
}

impl TelxDecoder {
    /// Creates a decoder configured from the pipeline options.
    pub fn new(opts: &Options) -> Self {
        let watched_page = if opts.teletext_page > 0 {
            decimal_page_to_bcd(opts.teletext_page)
        } else {
            0
        };
        Self {
            watched_page,
            page_buffer: TeletextPage::default(),
            transmission_mode: TransmissionMode::Serial,
            receiving_data: false,
            charset: PrimaryCharset::default(),
            commit: CommitCell::new(opts.typo_merge, opts.lev_min_count, opts.lev_max_pct),
            render_opts: RenderOptions {
                colour: !opts.no_font_color,
                escape_entities: !opts.no_html_escape,
                latin_russian: opts.latin_russian_map,
                line_separator: match opts.output_format {
                    OutputFormat::Transcript => " ",
                    _ => "\r\n",
                },
            },
            sentence_cap: opts.sentence_cap,
            cap_words: opts.cap_words.clone(),
            output_format: opts.output_format,
            date_format: opts.date_format,
            no_auto_time_ref: opts.no_auto_time_ref,
            start_at_ms: opts.start_at_ms,
            end_at_ms: opts.end_at_ms,
            seen_sub_pages: BTreeSet::new(),
            programme_info_processed: false,
            utc_ref: None,
            using_pts: None,
            global_timestamp_ms: 0,
            last_timestamp_ms: 0,
            packet_counter: 0,
        }
    }

    /// Updates the PCR-derived wall clock used when the PES has no PTS.
    pub fn update_global_timestamp(&mut self, ms: i64) {
        self.global_timestamp_ms = ms;
    }

    /// The watched page in decimal, once known.
    pub fn watched_page_decimal(&self) -> Option<u16> {
        if self.watched_page == 0 {
            None
        } else {
            Some(bcd_page_to_int(self.watched_page))
        }
    }

    /// Pages observed with the subtitle flag set, decimal, sorted.
    pub fn seen_pages(&self) -> Vec<u16> {
        self.seen_sub_pages.iter().copied().collect()
    }

    /// UTC reference learned from Broadcast Service Data, if any.
    pub fn utc_reference(&self) -> Option<i64> {
        self.utc_ref
    }

    /// Feeds one complete PES packet from the Teletext PID. Returns every
    /// subtitle completed by this packet.
    pub fn process_pes(&mut self, buffer: &[u8], timing: &mut TimingContext) -> Result<Vec<Subtitle>> {
        let mut out = Vec::new();
        if buffer.len() < 6 {
            return Ok(out);
        }

        let header = match parse_pes_header(buffer) {
            Ok(h) => h,
            Err(_) => return Ok(out), // not a PES start; nothing to do
        };
        if header.stream_id != STREAM_ID_PRIVATE_1 {
            return Ok(out);
        }

        // ETSI EN 301 775 chapter 4.3: (N x 184) - 6 bytes plus the header
        let mut pes_len = 6 + header.packet_length;
        if pes_len == 6 {
            return Ok(out);
        }
        if pes_len > buffer.len() {
            pes_len = buffer.len(); // truncated PES
        }

        if self.using_pts.is_none() {
            let has_pts = header.pts.is_some();
            self.using_pts = Some(has_pts);
            if has_pts {
                debug!("teletext PES carries PTS");
            } else {
                debug!("teletext PES has no PTS, using PCR clock");
            }
        }

        let timestamp = if self.using_pts == Some(true) {
            if let Some(pts) = header.pts {
                timing.set_current_pts(pts);
                timing.set_fts();
            }
            timing.get_fts()
        } else {
            self.global_timestamp_ms
        };
        self.last_timestamp_ms = timestamp;

        // skip the data_identifier byte, then walk 46-byte data units
        let mut i = header.payload_offset + 1;
        while i + 2 <= pes_len {
            let data_unit_id = buffer[i];
            let data_unit_len = buffer[i + 1] as usize;
            i += 2;

            if (data_unit_id == DATA_UNIT_TELETEXT_NONSUBTITLE
                || data_unit_id == DATA_UNIT_TELETEXT_SUBTITLE)
                && data_unit_len == DATA_UNIT_PAYLOAD_LEN
                && i + DATA_UNIT_PAYLOAD_LEN <= pes_len
            {
                // the transport is LSB-first, the decoder logic MSB-first
                let mut unit = [0u8; DATA_UNIT_PAYLOAD_LEN];
                for (j, b) in buffer[i..i + DATA_UNIT_PAYLOAD_LEN].iter().enumerate() {
                    unit[j] = reverse_bits(*b);
                }
                self.packet_counter += 1;

                if self.output_format == OutputFormat::Rcwt {
                    out.push(rcwt::frame_subtitle(data_unit_id, timestamp, &unit));
                } else {
                    self.process_telx_packet(data_unit_id, &unit, timestamp, &mut out);
                }
            }

            i += data_unit_len;
        }

        Ok(out)
    }

    /// Feeds one already bit-reversed data unit with an explicit
    /// timestamp. This is the RCWT replay entry point.
    pub fn process_data_unit(
        &mut self,
        data_unit_id: u8,
        unit: &[u8; DATA_UNIT_PAYLOAD_LEN],
        timestamp_ms: i64,
    ) -> Vec<Subtitle> {
        let mut out = Vec::new();
        self.packet_counter += 1;
        self.last_timestamp_ms = timestamp_ms;
        self.process_telx_packet(data_unit_id, unit, timestamp_ms, &mut out);
        out
    }

    /// Flushes the in-flight page and the held previous subtitle. Called
    /// at end of stream and when the watched page changes.
    pub fn close(&mut self, timing: &TimingContext) -> Vec<Subtitle> {
        let mut out = Vec::new();
        info!("teletext decoder: {} packets processed", self.packet_counter);
        if !self.seen_sub_pages.is_empty() {
            let pages: Vec<String> = self.seen_sub_pages.iter().map(|p| format!("{:03}", p)).collect();
            info!("teletext pages with subtitles seen: {}", pages.join(" "));
        }

        if self.page_buffer.tainted {
            // no more frames: the last page hides at the last known time
            let hide = self.last_timestamp_ms.max(timing.get_fts_max());
            self.finalize_page_grid();
            self.page_buffer.hide_ms = hide;
            let page = std::mem::take(&mut self.page_buffer);
            self.commit_page(page, &mut out);
        }
        if let Some(prev) = self.commit.flush() {
            out.push(self.subtitle_from(prev));
        }
        out
    }

    // variable names follow ETS 300 706 chapter 7.1.2
    fn process_telx_packet(
        &mut self,
        data_unit_id: u8,
        packet: &[u8; DATA_UNIT_PAYLOAD_LEN],
        timestamp: i64,
        out: &mut Vec<Subtitle>,
    ) {
        let (Some(a0), Some(a1)) = (unham_8_4(packet[2]), unham_8_4(packet[3])) else {
            debug!("unrecoverable Hamming error in packet address, dropped");
            return;
        };
        let address = (a1 << 4) | a0;
        let mut m = (address & 0x7) as u16;
        if m == 0 {
            m = 8;
        }
        let y = (address >> 3) & 0x1f;
        let data = &packet[4..44];
        let designation_code = if y > 25 { unham_8_4(data[0]).unwrap_or(0xf) } else { 0 };

        if y == 0 {
            self.handle_header_row(data_unit_id, m, data, timestamp, out);
        } else if (1..=23).contains(&y) && m == magazine_of(self.watched_page) && self.receiving_data {
            // ETS 300 706 annex B.2.2: X/26 packets precede rows 1..25, so
            // cells already holding an enhancement must not be overwritten
            for (i, &b) in data.iter().enumerate() {
                if self.page_buffer.text[y as usize][i] == 0x00 {
                    self.page_buffer.text[y as usize][i] = b as u16;
                }
            }
            self.page_buffer.tainted = true;
        } else if y == 26 && m == magazine_of(self.watched_page) && self.receiving_data {
            self.handle_x26(data);
        } else if y == 28 && m == magazine_of(self.watched_page) && self.receiving_data {
            if designation_code == 0 || designation_code == 4 {
                self.handle_charset_triplet(data, CharsetPacket::X28);
            }
        } else if y == 29 && m == magazine_of(self.watched_page) {
            if designation_code == 0 || designation_code == 4 {
                self.handle_charset_triplet(data, CharsetPacket::M29);
            }
        } else if m == 8 && y == 30 {
            self.handle_broadcast_service_data(data);
        }
    }

    fn handle_header_row(
        &mut self,
        data_unit_id: u8,
        m: u16,
        data: &[u8],
        timestamp: i64,
        out: &mut Vec<Subtitle>,
    ) {
        let (Some(d0), Some(d1)) = (unham_8_4(data[0]), unham_8_4(data[1])) else {
            return;
        };
        let page_digits = ((d1 << 4) | d0) as u16;
        let flag_subtitle = unham_8_4(data[5]).map_or(false, |v| v & 0x08 != 0);
        let page_number = (m << 8) | page_digits;

        if flag_subtitle && page_digits < 0xFF {
            let decimal = bcd_page_to_int(page_number);
            if self.seen_sub_pages.insert(decimal) {
                info!("teletext page with possible subtitles detected: {:03}", decimal);
            }
        }

        if self.watched_page == 0 && flag_subtitle && page_digits < 0xFF {
            self.watched_page = page_number;
            info!(
                "no teletext page specified, first suitable page is {:03}, not guaranteed",
                bcd_page_to_int(page_number)
            );
        }

        let charset_bits = unham_8_4(data[7]).map_or(0, |v| (v & 0x0E) >> 1);
        // ETS 300 706 chapter 9.3.1.3: bit set designates serial mode; the
        // page ends at the next header with a different page number (any
        // magazine when serial, same magazine when parallel)
        self.transmission_mode = if unham_8_4(data[7]).map_or(1, |v| v & 0x01) == 1 {
            TransmissionMode::Serial
        } else {
            TransmissionMode::Parallel
        };

        if self.transmission_mode == TransmissionMode::Parallel
            && data_unit_id != DATA_UNIT_TELETEXT_SUBTITLE
        {
            return;
        }

        if self.receiving_data {
            let leaves_page = match self.transmission_mode {
                TransmissionMode::Serial => page_of(page_number) != page_of(self.watched_page),
                TransmissionMode::Parallel => {
                    page_of(page_number) != page_of(self.watched_page)
                        && m == magazine_of(self.watched_page)
                }
            };
            if leaves_page {
                self.receiving_data = false;
                return;
            }
        }

        if page_number != self.watched_page {
            return;
        }

        // begin of a new transmission of the watched page: commit whatever
        // the previous transmission left in the grid
        if self.page_buffer.tainted {
            self.finalize_page_grid();
            // hide on the previous frame: contract by 40 ms (1 frame @25)
            self.page_buffer.hide_ms = (timestamp - 40).max(0);
            let page = std::mem::take(&mut self.page_buffer);
            self.commit_page(page, out);
        }

        self.page_buffer.clear(timestamp);
        self.receiving_data = true;

        if self.charset.default_g0 == G0Charset::Latin {
            // national option selection applies to Latin sets only
            self.charset.g0_x28 = None;
            let c = self.charset.g0_m29.unwrap_or(charset_bits);
            self.remap_g0_charset(c);
        }
    }

    fn handle_x26(&mut self, data: &[u8]) {
        // ETS 300 706 chapter 12.3.2: X/26 carries 13 Hamming 24/18
        // triplets addressing character cells of the Level 1 page
        let mut x26_row: usize = 0;
        let mut x26_col: usize = 0;

        let mut triplets = [0u32; 13];
        for (j, chunk) in data[1..40].chunks_exact(3).enumerate() {
            triplets[j] =
                unham_24_18(((chunk[2] as u32) << 16) | ((chunk[1] as u32) << 8) | chunk[0] as u32);
        }

        for &triplet in &triplets {
            if triplet == UNHAM_24_18_ERROR {
                debug!("unrecoverable Hamming 24/18 error in X/26 triplet, skipped");
                continue;
            }

            let data_field = ((triplet & 0x3f800) >> 11) as u8;
            let mode = ((triplet & 0x7c0) >> 6) as u8;
            let address = (triplet & 0x3f) as u8;
            let row_address_group = (40..=63).contains(&address);

            // ETS 300 706 chapter 12.3.1, table 27: set active position
            if mode == 0x04 && row_address_group {
                x26_row = (address - 40) as usize;
                if x26_row == 0 {
                    x26_row = 24;
                }
                x26_col = 0;
            }

            // table 27: termination marker
            if (0x11..=0x1f).contains(&mode) && row_address_group {
                break;
            }

            // table 27: character from G2 supplementary set
            if mode == 0x0f && !row_address_group {
                x26_col = address as usize;
                if data_field > 31 {
                    if let Some(ch) = g2_char(data_field) {
                        self.page_buffer.text[x26_row][x26_col] = ch;
                        self.page_buffer.g2_present[x26_row][x26_col] = true;
                    }
                }
            }

            // chapter 12.3.4 table 29: G0 character without diacritical
            // mark; '@' is transmitted as '*'
            if mode == 0x10 && !row_address_group {
                x26_col = address as usize;
                if data_field == 64 {
                    self.remap_g0_charset(0);
                    self.page_buffer.text[x26_row][x26_col] = 0x40;
                }
            }

            // table 27: G0 character with diacritical mark
            if (0x11..=0x1f).contains(&mode) && !row_address_group {
                x26_col = address as usize;
                let composed = accented_char(mode, data_field).unwrap_or_else(|| {
                    // no precomposed form: fall back to the base letter
                    g0_char(self.charset.default_g0, self.charset.current_subset, data_field)
                });
                self.page_buffer.text[x26_row][x26_col] = composed;
                self.page_buffer.g2_present[x26_row][x26_col] = true;
            }
        }
    }

    fn handle_charset_triplet(&mut self, data: &[u8], packet: CharsetPacket) {
        let triplet0 =
            unham_24_18(((data[3] as u32) << 16) | ((data[2] as u32) << 8) | data[1] as u32);
        if triplet0 == UNHAM_24_18_ERROR {
            debug!("unrecoverable Hamming 24/18 error in charset packet, skipped");
            return;
        }

        match packet {
            // X/28/0 Format 1 only
            CharsetPacket::X28 if (triplet0 & 0x0f) == 0x00 => {
                self.set_g0_charset(triplet0);
                if self.charset.default_g0 == G0Charset::Latin {
                    let c = ((triplet0 & 0x3f80) >> 7) as u8;
                    self.charset.g0_x28 = Some(c);
                    self.remap_g0_charset(c);
                }
            }
            CharsetPacket::M29 if (triplet0 & 0xff) == 0x00 => {
                self.set_g0_charset(triplet0);
                if self.charset.default_g0 == G0Charset::Latin {
                    let c = ((triplet0 & 0x3f80) >> 7) as u8;
                    self.charset.g0_m29 = Some(c);
                    // X/28 takes precedence over M/29
                    if self.charset.g0_x28.is_none() {
                        self.remap_g0_charset(c);
                    }
                }
            }
            _ => {}
        }
    }

    // ETS 300 706 table 32
    fn set_g0_charset(&mut self, triplet: u32) {
        self.charset.default_g0 = if (triplet & 0x3c00) == 0x1000 {
            match triplet & 0x0380 {
                0x0000 => G0Charset::Cyrillic1,
                0x0200 => G0Charset::Cyrillic2,
                0x0280 => G0Charset::Cyrillic3,
                _ => G0Charset::Latin,
            }
        } else {
            G0Charset::Latin
        };
    }

    fn remap_g0_charset(&mut self, designation: u8) {
        match latin_subset_index(designation) {
            Some(idx) => {
                if idx != self.charset.current_subset {
                    debug!(
                        "using G0 Latin national subset 0x{:x}.{:x} ({})",
                        designation >> 3,
                        designation & 0x7,
                        tables::G0_LATIN_NATIONAL_SUBSETS[idx].language
                    );
                    self.charset.current_subset = idx;
                }
            }
            None => {
                debug!(
                    "G0 Latin national subset 0x{:x}.{:x} is not implemented",
                    designation >> 3,
                    designation & 0x7
                );
            }
        }
    }

    fn handle_broadcast_service_data(&mut self, data: &[u8]) {
        // ETS 300 706 chapter 9.8.1: Packet 8/30 Format 1
        if self.programme_info_processed || unham_8_4(data[0]).map_or(true, |v| v >= 2) {
            return;
        }

        let mut station = String::new();
        for &b in &data[20..40] {
            let c = self.telx_to_ucs2(b);
            if c >= 0x20 {
                if let Some(ch) = char::from_u32(c as u32) {
                    station.push(ch);
                }
            }
        }
        info!("programme identification data: {}", station.trim());

        // timestamp is 7 bytes: BCD Modified Julian Day plus BCD HH:MM:SS,
        // every decimal incremented by 1 before transmission
        let mut t: i64 = 0;
        t += ((data[10] & 0x0f) as i64) * 10000;
        t += (((data[11] & 0xf0) >> 4) as i64) * 1000;
        t += ((data[11] & 0x0f) as i64) * 100;
        t += (((data[12] & 0xf0) >> 4) as i64) * 10;
        t += (data[12] & 0x0f) as i64;
        t -= 11111;
        // MJD to unix epoch
        t = (t - 40587) * 86400;
        t += 3600 * ((((data[13] & 0xf0) >> 4) as i64) * 10 + (data[13] & 0x0f) as i64);
        t += 60 * ((((data[14] & 0xf0) >> 4) as i64) * 10 + (data[14] & 0x0f) as i64);
        t += (((data[15] & 0xf0) >> 4) as i64) * 10 + (data[15] & 0x0f) as i64;
        t -= 40271;

        if let Some(utc) = Utc.timestamp_opt(t, 0).single() {
            info!("universal time co-ordinated: {}", utc);
        }
        debug!(
            "transmission mode: {}",
            match self.transmission_mode {
                TransmissionMode::Serial => "serial",
                TransmissionMode::Parallel => "parallel",
            }
        );

        if self.output_format == OutputFormat::Transcript
            && self.date_format == DateFormat::Date
            && !self.no_auto_time_ref
        {
            info!("broadcast service data packet received, resetting UTC reference");
            self.utc_ref = Some(t);
        }

        self.programme_info_processed = true;
    }

    /// Checks parity and maps a transmitted byte into UCS-2 through the
    /// current G0 set. Bad parity yields a space.
    fn telx_to_ucs2(&self, c: u8) -> u16 {
        if !parity_valid(c) {
            debug!("unrecoverable parity error, 0x{:02x} replaced by space", c);
            return 0x20;
        }
        let r = c & 0x7f;
        if r >= 0x20 {
            g0_char(self.charset.default_g0, self.charset.current_subset, r)
        } else {
            r as u16
        }
    }

    /// Maps raw G0 bytes in the grid to UCS-2, skipping cells that X/26
    /// already resolved.
    fn finalize_page_grid(&mut self) {
        for row in 1..=23 {
            for col in 0..page::PAGE_COLS {
                let v = self.page_buffer.text[row][col];
                if v != 0x00 && !self.page_buffer.g2_present[row][col] {
                    self.page_buffer.text[row][col] = self.telx_to_ucs2(v as u8);
                }
            }
        }
    }

    fn commit_page(&mut self, mut page: TeletextPage, out: &mut Vec<Subtitle>) {
        if self.start_at_ms.map_or(false, |start| page.hide_ms < start)
            || self.end_at_ms.map_or(false, |end| page.show_ms > end)
            || page.hide_ms == 0
        {
            return;
        }
        if page.show_ms > page.hide_ms {
            page.hide_ms = page.show_ms;
        }

        let Some((mut text, mut ucs2)) = page::render_page(&page, &self.render_opts) else {
            return;
        };

        if self.sentence_cap {
            // applied before the typo merge so the comparison runs on the
            // final visible form
            text = page::sentence_case(&text, &self.cap_words);
            let plain: String = String::from_utf16_lossy(&ucs2);
            ucs2 = page::sentence_case(&plain, &self.cap_words)
                .encode_utf16()
                .collect();
        }

        let committed = CommittedPage {
            text,
            ucs2,
            show_ms: page.show_ms,
            hide_ms: page.hide_ms,
        };
        if let Some(flushed) = self.commit.push(committed) {
            out.push(self.subtitle_from(flushed));
        }
    }

    fn subtitle_from(&self, page: CommittedPage) -> Subtitle {
        let info = self
            .watched_page_decimal()
            .map(|p| format!("{:03}", p))
            .unwrap_or_default();
        let offset = match (self.date_format, self.utc_ref) {
            (DateFormat::Date, Some(utc)) => utc * 1000,
            _ => 0,
        };
        Subtitle::text(page.text, page.show_ms + offset, page.hide_ms + offset)
            .with_info(info)
            .with_mode("TLT")
    }
}

#[derive(Debug, Clone, Copy)]
enum CharsetPacket {
    X28,
    M29,
}
