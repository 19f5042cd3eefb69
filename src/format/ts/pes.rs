use crate::error::{Result, TsCapError};
use bytes::{Bytes, BytesMut};
use log::warn;
use std::collections::HashMap;

/// Largest PES we will accumulate for a caption PID. Teletext and DVB
/// subtitle PES packets are tiny; anything near this size is corruption.
const MAX_PES_SIZE: usize = 4 << 20;

/// Parsed PES packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    /// Stream id byte (0xBD = private stream 1)
    pub stream_id: u8,
    /// Declared packet length; 0 means unbounded (video only)
    pub packet_length: usize,
    /// Presentation timestamp, raw 33-bit 90 kHz ticks
    pub pts: Option<u64>,
    /// Decode timestamp, raw 33-bit 90 kHz ticks
    pub dts: Option<u64>,
    /// Offset of the first payload byte after the header
    pub payload_offset: usize,
}

/// Reads the 33-bit timestamp packed in the 5-byte PES marker layout.
fn read_timestamp(b: &[u8]) -> u64 {
    let mut ts = (b[0] as u64 & 0x0E) << 29;
    ts |= (b[1] as u64) << 22;
    ts |= (b[2] as u64 & 0xFE) << 14;
    ts |= (b[3] as u64) << 7;
    ts |= (b[4] as u64 & 0xFE) >> 1;
    ts
}

/// Parses a PES packet header from the start of a reassembled PES.
///
/// Handles the optional header (marker bits `10` at byte 6), PTS/DTS
/// extraction per the flag bits, and the "length 0 = unbounded video"
/// convention. Streams without an optional header (padding and similar)
/// get their payload at byte 6.
pub fn parse_pes_header(data: &[u8]) -> Result<PesHeader> {
    if data.len() < 6 {
        return Err(TsCapError::Parser("PES shorter than base header".into()));
    }
    if data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
        return Err(TsCapError::Parser("missing PES start code".into()));
    }

    let stream_id = data[3];
    let packet_length = ((data[4] as usize) << 8) | data[5] as usize;

    let mut header = PesHeader {
        stream_id,
        packet_length,
        pts: None,
        dts: None,
        payload_offset: 6,
    };

    // optional PES header marker bits (10.. ....)
    if data.len() >= 9 && (data[6] & 0xC0) == 0x80 {
        let pts_dts_flags = data[7] >> 6;
        let header_length = data[8] as usize;
        header.payload_offset = 9 + header_length;

        if pts_dts_flags & 0x02 != 0 {
            if data.len() < 14 {
                return Err(TsCapError::Parser("PES PTS field truncated".into()));
            }
            header.pts = Some(read_timestamp(&data[9..14]));
        }
        if pts_dts_flags == 0x03 {
            if data.len() < 19 {
                return Err(TsCapError::Parser("PES DTS field truncated".into()));
            }
            header.dts = Some(read_timestamp(&data[14..19]));
        }
    }

    if header.payload_offset > data.len() {
        return Err(TsCapError::Parser("PES header longer than packet".into()));
    }

    Ok(header)
}

/// Sub-stream id of a private-stream-1 PES: the first payload byte
/// identifies DVD subpictures, DVB subtitles, and friends.
pub fn private_substream_id(data: &[u8], header: &PesHeader) -> Option<u8> {
    if header.stream_id != super::types::STREAM_ID_PRIVATE_1 {
        return None;
    }
    data.get(header.payload_offset).copied()
}

/// Accumulates PES packets per PID and hands out complete ones.
///
/// A payload-unit-start packet whose payload opens with the `00 00 01`
/// prefix closes the PES accumulated so far and starts a new one. Bytes
/// are never discarded silently: parse failures warn and drop the current
/// PES, and the next unit start resets state.
#[derive(Debug, Default)]
pub struct PesReassembler {
    buffers: HashMap<u16, PesBuffer>,
}

#[derive(Debug, Default)]
struct PesBuffer {
    data: BytesMut,
    saw_start: bool,
}

impl PesReassembler {
    /// Creates an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one TS payload for a tracked PID. When a new PES starts and a
    /// previous one was being accumulated, the completed PES is returned.
    pub fn feed(&mut self, pid: u16, unit_start: bool, payload: &[u8]) -> Option<Bytes> {
        let buf = self.buffers.entry(pid).or_default();

        if unit_start && payload.len() >= 3 && payload[0] == 0x00 && payload[1] == 0x00 && payload[2] == 0x01
        {
            let finished = if buf.saw_start && !buf.data.is_empty() {
                Some(buf.data.split().freeze())
            } else {
                buf.data.clear();
                None
            };
            buf.saw_start = true;
            buf.data.extend_from_slice(payload);
            return finished;
        }

        if !buf.saw_start {
            // mid-PES bytes before any unit start are useless
            return None;
        }

        if buf.data.len() + payload.len() > MAX_PES_SIZE {
            warn!("PES on PID {} exceeded {} bytes, dropping", pid, MAX_PES_SIZE);
            buf.data.clear();
            buf.saw_start = false;
            return None;
        }

        buf.data.extend_from_slice(payload);
        None
    }

    /// Discards the PES being accumulated on a PID (continuity gap).
    pub fn reset_pid(&mut self, pid: u16) {
        if let Some(buf) = self.buffers.get_mut(&pid) {
            if !buf.data.is_empty() {
                warn!("dropping partial PES on PID {} after stream error", pid);
            }
            buf.data.clear();
            buf.saw_start = false;
        }
    }

    /// Hands out whatever is accumulated on a PID (EOF flush).
    pub fn flush_pid(&mut self, pid: u16) -> Option<Bytes> {
        let buf = self.buffers.get_mut(&pid)?;
        if buf.saw_start && !buf.data.is_empty() {
            buf.saw_start = false;
            Some(buf.data.split().freeze())
        } else {
            None
        }
    }

    /// Flushes every PID, in PID order.
    pub fn flush_all(&mut self) -> Vec<(u16, Bytes)> {
        let mut pids: Vec<u16> = self.buffers.keys().copied().collect();
        pids.sort_unstable();
        pids.into_iter()
            .filter_map(|pid| self.flush_pid(pid).map(|b| (pid, b)))
            .collect()
    }

    /// Drops all accumulation state.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
