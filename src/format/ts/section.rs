use super::types::*;
use crate::error::{Result, TsCapError};
use crate::utils::Crc32Mpeg2;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use std::collections::HashMap;

/// Hard cap on accumulated section bytes; PSI sections are at most 4 KiB
/// (1 KiB for PAT/PMT), so anything past this is corruption.
const MAX_SECTION_SIZE: usize = 4096;

/// Reassembles PSI sections from TS packet payloads.
///
/// Sections begin behind a pointer field in payload-unit-start packets and
/// may span several packets; back-to-back sections within one packet are
/// also legal. Completed sections are CRC-checked before being handed out;
/// failures keep whatever was cached from the previous version.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buffers: HashMap<u16, SectionBuffer>,
    crc_fail_count: u64,
}

#[derive(Debug, Default)]
struct SectionBuffer {
    data: Vec<u8>,
    /// 3 + section_length once the length field is available
    expected: Option<usize>,
    /// Set after a malformed fragment; cleared by the next unit start
    in_error: bool,
}

impl SectionAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sections dropped for CRC mismatch, for the final report.
    pub fn crc_fail_count(&self) -> u64 {
        self.crc_fail_count
    }

    /// Feeds one packet payload for a PSI PID. Returns every section that
    /// completed and passed CRC verification, in arrival order.
    pub fn feed(&mut self, crc: &Crc32Mpeg2, pid: u16, unit_start: bool, payload: &[u8]) -> Vec<Vec<u8>> {
        let buf = self.buffers.entry(pid).or_default();
        let mut complete = Vec::new();

        if unit_start {
            if payload.is_empty() {
                buf.in_error = true;
                return complete;
            }
            let pointer = payload[0] as usize;
            if 1 + pointer > payload.len() {
                warn!("PSI pointer field past payload end on PID {}", pid);
                buf.reset();
                buf.in_error = true;
                return complete;
            }
            // bytes before the pointer target close the previous section
            if !buf.in_error && !buf.data.is_empty() {
                buf.push(&payload[1..1 + pointer]);
                buf.try_complete(pid, crc, &mut self.crc_fail_count, &mut complete);
            }
            buf.reset();
            buf.in_error = false;
            buf.push(&payload[1 + pointer..]);
        } else {
            if buf.in_error || buf.data.is_empty() {
                return complete;
            }
            buf.push(payload);
        }

        buf.try_complete(pid, crc, &mut self.crc_fail_count, &mut complete);
        complete
    }

    /// Drops all partially assembled sections (input switch, PAT change).
    pub fn reset(&mut self) {
        self.buffers.clear();
    }
}

impl SectionBuffer {
    fn reset(&mut self) {
        self.data.clear();
        self.expected = None;
    }

    fn push(&mut self, bytes: &[u8]) {
        if self.data.len() + bytes.len() > MAX_SECTION_SIZE {
            warn!("PSI section exceeds {} bytes, discarding", MAX_SECTION_SIZE);
            self.reset();
            self.in_error = true;
            return;
        }
        self.data.extend_from_slice(bytes);
        if self.expected.is_none() && self.data.len() >= 3 {
            let section_length = (((self.data[1] & 0x0F) as usize) << 8) | self.data[2] as usize;
            self.expected = Some(3 + section_length);
        }
    }

    /// Pops as many complete sections as the buffer holds, CRC-checking
    /// each. Stuffing bytes (0xFF table id) end the packet.
    fn try_complete(&mut self, pid: u16, crc: &Crc32Mpeg2, crc_fails: &mut u64, out: &mut Vec<Vec<u8>>) {
        loop {
            let Some(expected) = self.expected else { return };
            if self.data.len() < expected {
                return;
            }
            let section: Vec<u8> = self.data[..expected].to_vec();
            let rest: Vec<u8> = self.data[expected..].to_vec();
            self.reset();

            if crc.verify_section(&section) {
                out.push(section);
            } else {
                *crc_fails += 1;
                warn!("CRC32 mismatch on PSI section, PID {}", pid);
            }

            if rest.first().map_or(true, |&b| b == 0xFF) {
                return;
            }
            self.push(&rest);
        }
    }
}

/// Cache of the last PAT payload. The PAT is re-parsed only when its bytes
/// change; a change invalidates every cached PMT and restarts program
/// selection downstream.
#[derive(Debug, Default)]
pub struct PatCache {
    last: Option<Vec<u8>>,
}

impl PatCache {
    /// Records the section and reports whether it differs from the cached
    /// copy. The first PAT always counts as changed.
    pub fn update(&mut self, section: &[u8]) -> bool {
        if self.last.as_deref() == Some(section) {
            return false;
        }
        let had_previous = self.last.is_some();
        self.last = Some(section.to_vec());
        if had_previous {
            debug!("PAT changed, downstream state must reset");
        }
        true
    }

    /// Whether any PAT has been seen.
    pub fn seen(&self) -> bool {
        self.last.is_some()
    }

    /// Forgets the cached PAT (input switch).
    pub fn clear(&mut self) {
        self.last = None;
    }
}

/// Per-program cache of PMT payloads keyed by program number.
#[derive(Debug, Default)]
pub struct PmtCache {
    entries: HashMap<u16, PmtCacheEntry>,
}

#[derive(Debug)]
struct PmtCacheEntry {
    pmt_pid: u16,
    payload: Vec<u8>,
    version: u8,
}

impl PmtCache {
    /// Records a PMT section for a program. Returns false when the bytes
    /// match the cached copy (nothing to re-parse); the version number is
    /// only the tie-breaker when lengths differ but content checks are
    /// inconclusive.
    pub fn update(&mut self, program_number: u16, pmt_pid: u16, section: &[u8], version: u8) -> bool {
        if let Some(entry) = self.entries.get(&program_number) {
            if entry.payload == section {
                return false;
            }
            if entry.version == version && entry.pmt_pid == pmt_pid && entry.payload.len() == section.len() {
                debug!(
                    "PMT for program {} changed bytes but kept version {}; re-parsing",
                    program_number, version
                );
            }
        }
        self.entries.insert(
            program_number,
            PmtCacheEntry {
                pmt_pid,
                payload: section.to_vec(),
                version,
            },
        );
        true
    }

    /// Drops every cached PMT. Called when the PAT changes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// PMT PID recorded for a program, if one was cached.
    pub fn pmt_pid(&self, program_number: u16) -> Option<u16> {
        self.entries.get(&program_number).map(|e| e.pmt_pid)
    }
}

/// Parses a complete, CRC-verified PAT section.
///
/// Long PATs (more than one section) are rejected with a warning, matching
/// the demuxer's single-section policy. Network entries (program 0) are
/// skipped.
pub fn parse_pat(section: &[u8]) -> Result<Pat> {
    if section.len() < 12 {
        return Err(TsCapError::Parser("PAT section too short".into()));
    }
    if section[0] != TABLE_ID_PAT {
        return Err(TsCapError::Parser(format!(
            "invalid PAT table id 0x{:02x}",
            section[0]
        )));
    }

    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    let total = 3 + section_length;
    if section.len() < total {
        return Err(TsCapError::Parser("PAT shorter than section length".into()));
    }

    let current_next = section[5] & 0x01;
    let section_number = section[6];
    let last_section_number = section[7];
    if section_number > last_section_number {
        return Err(TsCapError::Parser("defective PAT section numbering".into()));
    }
    if last_section_number > 0 {
        warn!("long PATs are not supported, skipping");
        return Err(TsCapError::Unsupported("long PAT".into()));
    }

    let mut pat = Pat {
        transport_stream_id: u16::from_be_bytes([section[3], section[4]]),
        version_number: (section[5] & 0x3E) >> 1,
        entries: Vec::new(),
    };

    if current_next == 0 {
        // table not yet active; expose the header but no programs
        return Ok(pat);
    }

    let mut pos = 8;
    while pos + 4 <= total - 4 {
        let program_number = u16::from_be_bytes([section[pos], section[pos + 1]]);
        let pid = u16::from_be_bytes([section[pos + 2], section[pos + 3]]) & 0x1FFF;
        pos += 4;
        if program_number == 0 {
            continue; // network PID
        }
        pat.entries.push(PatEntry {
            program_number,
            pmt_pid: pid,
        });
    }

    Ok(pat)
}

/// Parses a complete, CRC-verified PMT section into stream records with
/// their descriptors.
pub fn parse_pmt(section: &[u8]) -> Result<Pmt> {
    if section.len() < 16 {
        return Err(TsCapError::Parser("PMT section too short".into()));
    }
    if section[0] != TABLE_ID_PMT {
        return Err(TsCapError::Parser(format!(
            "invalid PMT table id 0x{:02x}",
            section[0]
        )));
    }

    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    let total = 3 + section_length;
    if section.len() < total {
        return Err(TsCapError::Parser("PMT shorter than section length".into()));
    }

    let current_next = section[5] & 0x01;
    if current_next == 0 {
        return Err(TsCapError::Parser("PMT not current".into()));
    }
    if section[7] > 0 {
        warn!("long PMTs are not supported, skipping");
        return Err(TsCapError::Unsupported("long PMT".into()));
    }

    let mut pmt = Pmt {
        program_number: u16::from_be_bytes([section[3], section[4]]),
        version_number: (section[5] & 0x3E) >> 1,
        pcr_pid: u16::from_be_bytes([section[8], section[9]]) & 0x1FFF,
        program_descriptors: Vec::new(),
        streams: Vec::new(),
    };

    let program_info_length = (((section[10] & 0x0F) as usize) << 8) | section[11] as usize;
    let mut pos = 12;
    if program_info_length > 0 {
        if pos + program_info_length > total - 4 {
            return Err(TsCapError::Parser("program info overruns PMT".into()));
        }
        pmt.program_descriptors = parse_descriptors(&section[pos..pos + program_info_length])?;
        pos += program_info_length;
    }

    while pos + 5 <= total - 4 {
        let stream_type = section[pos];
        let elementary_pid = u16::from_be_bytes([section[pos + 1], section[pos + 2]]) & 0x1FFF;
        let es_info_length = (((section[pos + 3] & 0x0F) as usize) << 8) | section[pos + 4] as usize;
        pos += 5;

        if pos + es_info_length > total - 4 {
            return Err(TsCapError::Parser("ES info overruns PMT".into()));
        }
        let descriptors = parse_descriptors(&section[pos..pos + es_info_length])?;
        pos += es_info_length;

        pmt.streams.push(EsInfo {
            stream_type,
            elementary_pid,
            descriptors,
        });
    }

    Ok(pmt)
}

fn parse_descriptors(data: &[u8]) -> Result<Vec<Descriptor>> {
    let mut descriptors = Vec::new();
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let tag = data[pos];
        let length = data[pos + 1] as usize;
        pos += 2;

        if pos + length > data.len() {
            return Err(TsCapError::Parser("descriptor data too short".into()));
        }

        descriptors.push(Descriptor {
            tag,
            data: data[pos..pos + length].to_vec(),
        });
        pos += length;
    }

    Ok(descriptors)
}

/// One event from an Event Information Table section, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitEvent {
    /// Service (program) the event belongs to
    pub service_id: u16,
    /// Broadcast-assigned event id
    pub event_id: u16,
    /// Event start, when the MJD/BCD fields decode cleanly
    pub start: Option<DateTime<Utc>>,
    /// Scheduled duration in seconds
    pub duration_s: u32,
    /// DVB running status (4 = running)
    pub running_status: u8,
}

/// Converts a DVB Modified Julian Day plus BCD time to UTC.
pub fn mjd_bcd_to_utc(mjd: u16, h: u8, m: u8, s: u8) -> Option<DateTime<Utc>> {
    let bcd = |b: u8| -> Option<u32> {
        let hi = (b >> 4) as u32;
        let lo = (b & 0x0F) as u32;
        if hi > 9 || lo > 9 {
            None
        } else {
            Some(hi * 10 + lo)
        }
    };
    let unix = (mjd as i64 - 40587) * 86400
        + (bcd(h)? as i64) * 3600
        + (bcd(m)? as i64) * 60
        + bcd(s)? as i64;
    Utc.timestamp_opt(unix, 0).single()
}

/// Parses the events of an EIT section (table ids 0x4E..0x6F). Only the
/// fields the registry reports are extracted; descriptors are skipped.
pub fn parse_eit(section: &[u8]) -> Result<Vec<EitEvent>> {
    if section.len() < 18 {
        return Err(TsCapError::Parser("EIT section too short".into()));
    }
    let table_id = section[0];
    if !(TABLE_ID_EIT_MIN..=TABLE_ID_EIT_MAX).contains(&table_id) {
        return Err(TsCapError::Parser(format!("not an EIT table id: 0x{:02x}", table_id)));
    }

    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    let total = 3 + section_length;
    if section.len() < total {
        return Err(TsCapError::Parser("EIT shorter than section length".into()));
    }

    let service_id = u16::from_be_bytes([section[3], section[4]]);
    let mut events = Vec::new();
    let mut pos = 14;

    while pos + 12 <= total - 4 {
        let event_id = u16::from_be_bytes([section[pos], section[pos + 1]]);
        let mjd = u16::from_be_bytes([section[pos + 2], section[pos + 3]]);
        let start = mjd_bcd_to_utc(mjd, section[pos + 4], section[pos + 5], section[pos + 6]);
        let bcd = |b: u8| ((b >> 4) as u32) * 10 + (b & 0x0F) as u32;
        let duration_s =
            bcd(section[pos + 7]) * 3600 + bcd(section[pos + 8]) * 60 + bcd(section[pos + 9]);
        let running_status = (section[pos + 10] >> 5) & 0x07;
        let descriptors_loop_length =
            (((section[pos + 10] & 0x0F) as usize) << 8) | section[pos + 11] as usize;
        pos += 12 + descriptors_loop_length;

        events.push(EitEvent {
            service_id,
            event_id,
            start,
            duration_s,
            running_status,
        });
    }

    Ok(events)
}
