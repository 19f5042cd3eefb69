use super::parser::TsPacketParser;
use super::pes::{parse_pes_header, PesReassembler};
use super::registry::StreamRegistry;
use super::section::{
    parse_eit, parse_pat, parse_pmt, EitEvent, PatCache, PmtCache, SectionAssembler,
};
use super::types::*;
use crate::config::{Options, TeletextMode};
use crate::error::{Result, TsCapError};
use crate::format::{CaptionKind, DemuxerData};
use crate::io::BufferedInput;
use crate::utils::Crc32Mpeg2;
use bytes::Bytes;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};

/// MPEG Transport Stream demuxer.
///
/// Pulls bytes from the buffered input, keeps packet framing, reassembles
/// PSI sections and PES packets, tracks programs and their caption
/// streams, and hands complete caption PES payloads to the pipeline one
/// at a time. Program and caption-PID selection policy lives here; the
/// decoders never see an unselected stream.
pub struct TsDemuxer {
    input: BufferedInput,
    parser: TsPacketParser,
    sections: SectionAssembler,
    crc: Crc32Mpeg2,
    pes: PesReassembler,
    pat_cache: PatCache,
    pmt_cache: PmtCache,
    registry: StreamRegistry,
    opts: Options,

    /// Unframed bytes between reads
    raw: Vec<u8>,
    sync_acquired: bool,

    /// Caption PID of the active program in single-program mode
    cappid: Option<u16>,
    cap_stream_type: Option<u8>,
    teletext_in_use: bool,
    programs_listed: bool,

    /// Latest PCR per program, 27 MHz
    last_pcr: HashMap<u16, u64>,
    /// PIDs whose adaptation field flagged random access since the last
    /// delivered payload
    rai_seen: HashMap<u16, bool>,
    events: Vec<EitEvent>,
    pending: VecDeque<DemuxerData>,
    scrambled_dropped: u64,
    /// Set when a PAT change invalidated downstream decoder state
    psi_reset: bool,
    /// Set when the input crossed a file boundary outside binary concat
    file_boundary: bool,
}

impl TsDemuxer {
    /// Creates a demuxer over an opened input.
    pub fn new(input: BufferedInput, opts: Options) -> Self {
        let parser = TsPacketParser::new().with_defective_packet_dumps(opts.dump_defective_packets);
        let mut demuxer = Self {
            input,
            parser,
            sections: SectionAssembler::new(),
            crc: Crc32Mpeg2::new(),
            pes: PesReassembler::new(),
            pat_cache: PatCache::default(),
            pmt_cache: PmtCache::default(),
            registry: StreamRegistry::new(),
            opts,
            raw: Vec::new(),
            sync_acquired: false,
            cappid: None,
            cap_stream_type: None,
            teletext_in_use: false,
            programs_listed: false,
            last_pcr: HashMap::new(),
            rai_seen: HashMap::new(),
            events: Vec::new(),
            pending: VecDeque::new(),
            scrambled_dropped: 0,
            psi_reset: false,
            file_boundary: false,
        };
        if let Some(pid) = demuxer.opts.forced_cappid {
            // the user knows best; classify once the PMT tells us the type
            demuxer.cappid = Some(pid);
            demuxer.cap_stream_type = demuxer.opts.forced_streamtype;
        }
        demuxer
    }

    /// Stream registry, for reporting and output naming.
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// EIT events collected so far.
    pub fn events(&self) -> &[EitEvent] {
        &self.events
    }

    /// Continuity-gap count, for the final report.
    pub fn cc_gap_count(&self) -> u64 {
        self.parser.cc_gap_count()
    }

    /// Latest PCR observed for a program, in 27 MHz units.
    pub fn last_pcr(&self, program: u16) -> Option<u64> {
        self.last_pcr.get(&program).copied()
    }

    /// Packets dropped because their payload was scrambled.
    pub fn scrambled_packet_count(&self) -> u64 {
        self.scrambled_dropped
    }

    /// True once per PAT change: downstream decoders must flush their
    /// pending subtitles and rebuild.
    pub fn take_psi_reset(&mut self) -> bool {
        std::mem::take(&mut self.psi_reset)
    }

    /// True once after the input advanced to the next file outside binary
    /// concat: the caller resets its clocks, output files stay open.
    pub fn take_file_boundary(&mut self) -> bool {
        std::mem::take(&mut self.file_boundary)
    }

    /// Pulls the next caption payload. None means the input is exhausted
    /// and every buffered PES has been flushed.
    pub async fn next_payload(&mut self) -> Result<Option<DemuxerData>> {
        loop {
            if let Some(data) = self.pending.pop_front() {
                return Ok(Some(data));
            }

            match self.next_packet().await? {
                Some(packet) => self.process_packet(&packet)?,
                None => {
                    // EOF: hand out whatever the reassembler still holds
                    for (pid, payload) in self.pes.flush_all() {
                        self.queue_payload(pid, payload);
                    }
                    return Ok(self.pending.pop_front());
                }
            }
        }
    }

    /// Reads one framed TS packet (188 bytes, m2ts prefix stripped) from
    /// the input, hunting for sync as needed.
    async fn next_packet(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if !self.sync_acquired {
                self.fill_raw(M2TS_PACKET_SIZE + M2TS_PACKET_SIZE + 8).await?;
                if self.raw.is_empty() {
                    return Ok(None);
                }
                match self.parser.detect_packet_size(&self.raw) {
                    Some(_) => self.sync_acquired = true,
                    None => match self.parser.resync(&self.raw) {
                        Some(offset) if offset > 0 => {
                            warn!("skipping {} bytes while hunting for sync", offset);
                            self.raw.drain(..offset);
                            continue;
                        }
                        Some(_) => self.sync_acquired = true,
                        None => {
                            if self.raw.len() < TS_PACKET_SIZE {
                                return Ok(None);
                            }
                            let keep_from = self.raw.len().saturating_sub(TS_PACKET_SIZE);
                            self.raw.drain(..keep_from.max(1));
                            continue;
                        }
                    },
                }
            }

            let stride = self.parser.packet_size();
            self.fill_raw(stride).await?;
            if self.raw.len() < stride {
                return Ok(None); // trailing partial packet
            }

            let sync_pos = stride - TS_PACKET_SIZE;
            if self.raw[sync_pos] != 0x47 {
                warn!("lost TS sync, rescanning");
                self.sync_acquired = false;
                self.raw.drain(..1);
                continue;
            }

            let packet: Vec<u8> = self.raw.drain(..stride).collect();
            return Ok(Some(packet[sync_pos..].to_vec()));
        }
    }

    async fn fill_raw(&mut self, min: usize) -> Result<()> {
        let mut chunk = [0u8; 4096];
        while self.raw.len() < min {
            let n = self.input.read(&mut chunk).await?;
            if self.input.take_file_boundary() {
                self.parser.reset_continuity();
                self.sections.reset();
                self.file_boundary = true;
            }
            if n == 0 {
                break;
            }
            self.raw.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    fn process_packet(&mut self, data: &[u8]) -> Result<()> {
        let packet = match self.parser.parse_packet(data) {
            Ok(p) => p,
            Err(e) => {
                debug!("dropping malformed packet: {}", e);
                return Ok(());
            }
        };

        if packet.header.transport_error {
            debug!("dropping packet with transport error on PID {}", packet.header.pid);
            return Ok(());
        }

        // PCR travels in the adaptation field of the program's PCR PID
        if let Some(af) = &packet.adaptation {
            if af.random_access {
                self.rai_seen.insert(packet.header.pid, true);
            }
            if let Some(pcr) = af.pcr {
                for program in self.registry.programs() {
                    if program.pcr_pid == Some(packet.header.pid) {
                        self.last_pcr.insert(program.program_number, pcr);
                    }
                }
            }
        }

        if !packet.header.has_payload {
            return Ok(());
        }
        if packet.header.scrambling_control != 0 {
            self.scrambled_dropped += 1;
            return Ok(());
        }

        let in_sequence = self.parser.check_continuity(&packet.header);
        if !in_sequence {
            self.pes.reset_pid(packet.header.pid);
        }

        let payload = &data[packet.payload_offset..];
        let pid = packet.header.pid;
        let unit_start = packet.header.payload_unit_start;

        match pid {
            PID_NULL => {}
            PID_CAT => {}
            PID_PAT => self.handle_psi_pid(pid, unit_start, payload)?,
            PID_EIT => self.handle_psi_pid(pid, unit_start, payload)?,
            _ if self.is_pmt_pid(pid) => self.handle_psi_pid(pid, unit_start, payload)?,
            _ => self.handle_stream_pid(pid, unit_start, payload),
        }

        Ok(())
    }

    fn is_pmt_pid(&self, pid: u16) -> bool {
        self.registry.programs().any(|p| p.pmt_pid == pid)
    }

    fn handle_psi_pid(&mut self, pid: u16, unit_start: bool, payload: &[u8]) -> Result<()> {
        let sections = self.sections.feed(&self.crc, pid, unit_start, payload);
        for section in sections {
            match section.first() {
                Some(&TABLE_ID_PAT) if pid == PID_PAT => self.handle_pat_section(&section)?,
                Some(&TABLE_ID_PMT) if pid != PID_PAT && pid != PID_EIT => {
                    self.handle_pmt_section(pid, &section)?
                }
                Some(&id) if (TABLE_ID_EIT_MIN..=TABLE_ID_EIT_MAX).contains(&id) && pid == PID_EIT => {
                    match parse_eit(&section) {
                        Ok(events) => self.events.extend(events),
                        Err(e) => debug!("EIT section skipped: {}", e),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_pat_section(&mut self, section: &[u8]) -> Result<()> {
        let had_pat = self.pat_cache.seen();
        if !self.pat_cache.update(section) {
            // byte-identical PAT: nothing observable happens
            return Ok(());
        }

        let pat = match parse_pat(section) {
            Ok(pat) => pat,
            Err(TsCapError::Unsupported(_)) => return Ok(()), // long PAT, warned
            Err(e) => {
                warn!("defective PAT skipped: {}", e);
                return Ok(());
            }
        };

        if had_pat {
            info!("PAT changed, resetting program state");
            self.pmt_cache.clear();
            self.registry.clear();
            self.pes.clear();
            self.psi_reset = true;
            if self.teletext_in_use && self.opts.teletext != TeletextMode::Forbidden {
                self.teletext_in_use = false;
            }
            if self.opts.forced_cappid.is_none() {
                self.cappid = None;
                self.cap_stream_type = None;
            }
        }
        self.registry.bump_generation();

        for entry in &pat.entries {
            self.registry.upsert_program(entry.program_number, entry.pmt_pid);
        }

        let is_multiprogram = pat.entries.len() > 1;

        if self.opts.multiprogram {
            self.registry.select_all_programs();
            return Ok(());
        }

        if let Some(forced) = self.opts.forced_program {
            if pat.entries.iter().any(|e| e.program_number == forced) {
                self.registry.select_program(forced);
            } else if !self.programs_listed {
                warn!(
                    "program {} not in this PAT; continuing in case it appears later",
                    forced
                );
                self.programs_listed = true;
            }
            return Ok(());
        }

        if !is_multiprogram {
            if let Some(entry) = pat.entries.first() {
                self.registry.select_program(entry.program_number);
            }
            return Ok(());
        }

        // several programs, none picked by the user
        if self.opts.autoprogram {
            if !self.programs_listed {
                info!("multiple programs; the first with a usable caption stream will be used");
                self.programs_listed = true;
            }
            return Ok(());
        }

        let numbers: Vec<String> = pat
            .entries
            .iter()
            .map(|e| e.program_number.to_string())
            .collect();
        Err(TsCapError::Unsupported(format!(
            "the stream has multiple programs ({}); re-run with --program-number or --autoprogram",
            numbers.join(", ")
        )))
    }

    fn handle_pmt_section(&mut self, pmt_pid: u16, section: &[u8]) -> Result<()> {
        let pmt = match parse_pmt(section) {
            Ok(pmt) => pmt,
            Err(TsCapError::Unsupported(_)) => return Ok(()),
            Err(e) => {
                warn!("defective PMT skipped: {}", e);
                return Ok(());
            }
        };

        if !self
            .pmt_cache
            .update(pmt.program_number, pmt_pid, section, pmt.version_number)
        {
            return Ok(());
        }
        self.registry.bump_generation();
        self.registry.set_pcr_pid(pmt.program_number, pmt.pcr_pid);

        debug!(
            "PMT for program {} (PID {}): {} streams",
            pmt.program_number,
            pmt_pid,
            pmt.streams.len()
        );

        // record every stream with its classification
        for es in &pmt.streams {
            let lang = es
                .descriptors
                .iter()
                .find_map(|d| d.iso639_language());
            let kind = classify_stream(es);
            self.registry
                .update(es.elementary_pid, es.stream_type, kind, pmt.program_number, lang);
        }

        let program_selected = self
            .registry
            .selected_program()
            .map_or(self.opts.multiprogram || self.opts.autoprogram, |p| {
                p.program_number == pmt.program_number
            });
        if !program_selected {
            debug!("ignoring PMT of unselected program {}", pmt.program_number);
            return Ok(());
        }

        if self.opts.multiprogram {
            // each program keeps its own best stream; nothing global
            if let Some(best) = self.registry.get_best(pmt.program_number) {
                let (pid, program) = (best.pid, best.program_number);
                self.registry.ignore_other_siblings(program, pid);
            }
            return Ok(());
        }

        self.select_caption_pid(&pmt)?;
        Ok(())
    }

    /// The caption-PID decision ladder for the active program, first match
    /// wins: forced PID, forced data stream type, Teletext descriptor,
    /// DVB subtitle descriptor, then ATSC video user data.
    fn select_caption_pid(&mut self, pmt: &super::types::Pmt) -> Result<()> {
        // 1. the user forced a PID: find its type, demand a hint for
        // private types
        if let Some(forced) = self.opts.forced_cappid {
            if let Some(es) = pmt.streams.iter().find(|es| es.elementary_pid == forced) {
                if self.cap_stream_type.is_none() {
                    if (0x80..=0xFF).contains(&es.stream_type) {
                        return Err(TsCapError::Unsupported(
                            "cannot tell the stream type of the forced PID; pass --streamtype".into(),
                        ));
                    }
                    self.cap_stream_type = Some(es.stream_type);
                }
                self.finish_selection(pmt.program_number, forced);
            }
            return Ok(());
        }

        // 2. the user forced a stream type
        if let (Some(wanted), None) = (self.opts.datastreamtype, self.cappid) {
            if let Some(es) = pmt.streams.iter().find(|es| es.stream_type == wanted) {
                info!(
                    "selecting PID {} with requested stream type 0x{:02x}",
                    es.elementary_pid, wanted
                );
                self.cap_stream_type = Some(es.stream_type);
                self.finish_selection(pmt.program_number, es.elementary_pid);
                return Ok(());
            }
        }

        let mut new_cappid: Option<u16> = None;

        // 3. Teletext descriptor
        if self.opts.teletext != TeletextMode::Forbidden && self.cappid.is_none() {
            if let Some(es) = pmt
                .streams
                .iter()
                .find(|es| es.stream_type == STREAM_TYPE_PRIVATE_PES && es.has_teletext_descriptor())
            {
                info!(
                    "teletext stream PID {} (0x{:x}) for program {}",
                    es.elementary_pid, es.elementary_pid, pmt.program_number
                );
                self.teletext_in_use = true;
                new_cappid = Some(es.elementary_pid);
            }
        }

        // teletext forbidden: a VBI stream is processed as closed captions
        if self.opts.teletext == TeletextMode::Forbidden && new_cappid.is_none() {
            if let Some(es) = pmt.streams.iter().find(|es| {
                es.stream_type == STREAM_TYPE_PRIVATE_PES
                    && es.descriptor(DESC_VBI_DATA).is_some()
            }) {
                info!(
                    "VBI stream PID {} used as closed captions (teletext disabled)",
                    es.elementary_pid
                );
                new_cappid = Some(es.elementary_pid);
            }
        }

        // 4. DVB subtitle descriptor
        if new_cappid.is_none() && self.cappid.is_none() {
            if let Some(es) = pmt
                .streams
                .iter()
                .find(|es| es.stream_type == STREAM_TYPE_PRIVATE_PES && es.has_dvb_subtitle_descriptor())
            {
                info!(
                    "DVB subtitle stream PID {} for program {}",
                    es.elementary_pid, pmt.program_number
                );
                new_cappid = Some(es.elementary_pid);
            }
        }

        // 5. video with expected ATSC user data
        if new_cappid.is_none() && self.cappid.is_none() && !self.teletext_in_use {
            if let Some(es) = pmt.streams.iter().find(|es| {
                es.stream_type == STREAM_TYPE_VIDEO_MPEG2 || es.stream_type == STREAM_TYPE_VIDEO_H264
            }) {
                new_cappid = Some(es.elementary_pid);
            }
        }

        match new_cappid {
            Some(pid) => {
                if self.opts.autoprogram && self.registry.selected_program().is_none() {
                    info!("auto-selecting program {}", pmt.program_number);
                    self.registry.select_program(pmt.program_number);
                }
                self.finish_selection(pmt.program_number, pid);
            }
            None if self.cappid.is_none() => {
                if self.opts.autoprogram {
                    info!("no caption stream in program {}", pmt.program_number);
                } else {
                    info!(
                        "no supported caption stream found; a PID can be forced with --datapid"
                    );
                }
            }
            None => {}
        }
        Ok(())
    }

    fn finish_selection(&mut self, program: u16, pid: u16) {
        if self.cappid == Some(pid) {
            return;
        }
        if let Some(old) = self.cappid {
            // buffered-but-undelivered caption data flushes before the switch
            if let Some(payload) = self.pes.flush_pid(old) {
                self.queue_payload(old, payload);
            }
        }
        info!("decoding captions from program {}, PID {}", program, pid);
        self.cappid = Some(pid);
        self.registry.ignore_other_siblings(program, pid);
    }

    fn handle_stream_pid(&mut self, pid: u16, unit_start: bool, payload: &[u8]) {
        let deliverable = if self.opts.multiprogram {
            self.registry.get(pid).map_or(false, |s| s.codec.is_caption())
        } else {
            self.cappid == Some(pid)
        };
        if !deliverable {
            return;
        }

        if let Some(done) = self.pes.feed(pid, unit_start, payload) {
            self.queue_payload(pid, done);
        }
    }

    fn queue_payload(&mut self, pid: u16, payload: Bytes) {
        let (program, codec, lang) = match self.registry.get_any(pid) {
            Some(info) => (info.program_number, info.codec, info.lang.clone()),
            None if self.cappid == Some(pid) => {
                // forced PID never described by a PMT: assume from hints
                (0, forced_kind(&self.opts), None)
            }
            None => return,
        };
        if !codec.is_caption() {
            return;
        }

        let mut data = DemuxerData::new(program, pid, codec, payload);
        if let Ok(header) = parse_pes_header(&data.payload) {
            data.pts = header.pts;
            data.dts = header.dts;
        }
        data.key_frame = self.rai_seen.remove(&pid).unwrap_or(false);
        if let Some(pcr) = self.last_pcr.get(&program) {
            data.pcr = Some(*pcr);
        }
        if let Some(lang) = lang {
            data = data.with_lang(lang);
        }
        self.pending.push_back(data);
    }
}

/// Classifies a PMT stream entry into a caption codec family.
fn classify_stream(es: &EsInfo) -> CaptionKind {
    match es.stream_type {
        STREAM_TYPE_PRIVATE_PES if es.has_teletext_descriptor() => CaptionKind::Teletext,
        STREAM_TYPE_PRIVATE_PES if es.has_dvb_subtitle_descriptor() => CaptionKind::DvbSubtitle,
        STREAM_TYPE_PRIVATE_PES => CaptionKind::None,
        STREAM_TYPE_VIDEO_MPEG2 | STREAM_TYPE_VIDEO_H264 => CaptionKind::AtscCc,
        STREAM_TYPE_VIDEO_MPEG1 | STREAM_TYPE_VIDEO_H265 => CaptionKind::None,
        STREAM_TYPE_AUDIO_MPEG1 | STREAM_TYPE_AUDIO_MPEG2 | STREAM_TYPE_AUDIO_AAC => CaptionKind::None,
        _ => CaptionKind::Unknown,
    }
}

fn forced_kind(opts: &Options) -> CaptionKind {
    if opts.teletext == TeletextMode::Forbidden {
        CaptionKind::AtscCc
    } else {
        CaptionKind::Teletext
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputSource;
    use std::io::Cursor;
    use tokio::runtime::Runtime;

    fn ts_packet(pid: u16, unit_start: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0u8; TS_PACKET_SIZE];
        p[0] = 0x47;
        p[1] = ((pid >> 8) as u8 & 0x1F) | if unit_start { 0x40 } else { 0x00 };
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10 | (cc & 0x0F);
        let n = payload.len().min(TS_PACKET_SIZE - 4);
        p[4..4 + n].copy_from_slice(&payload[..n]);
        for b in p[4 + n..].iter_mut() {
            *b = 0xFF;
        }
        p
    }

    fn section_payload(section: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8]; // pointer field
        payload.extend_from_slice(section);
        payload
    }

    fn finish_section(mut body: Vec<u8>) -> Vec<u8> {
        let crc = Crc32Mpeg2::new();
        let len = body.len() - 3 + 4;
        body[1] = 0xB0 | ((len >> 8) as u8 & 0x0F);
        body[2] = (len & 0xFF) as u8;
        let value = crc.calculate(&body);
        body.extend_from_slice(&value.to_be_bytes());
        body
    }

    fn pat_section(entries: &[(u16, u16)]) -> Vec<u8> {
        let mut body = vec![
            TABLE_ID_PAT,
            0x00,
            0x00,
            0x00,
            0x01, // transport stream id
            0xC1,
            0x00,
            0x00,
        ];
        for &(program, pid) in entries {
            body.extend_from_slice(&program.to_be_bytes());
            body.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            body.push((pid & 0xFF) as u8);
        }
        finish_section(body)
    }

    fn pmt_section_teletext(program: u16, teletext_pid: u16) -> Vec<u8> {
        let body = vec![
            TABLE_ID_PMT,
            0x00,
            0x00,
            (program >> 8) as u8,
            (program & 0xFF) as u8,
            0xC1,
            0x00,
            0x00,
            0xE0 | ((teletext_pid >> 8) as u8 & 0x1F),
            (teletext_pid & 0xFF) as u8, // PCR PID = same
            0xF0,
            0x00,
            STREAM_TYPE_PRIVATE_PES,
            0xE0 | ((teletext_pid >> 8) as u8 & 0x1F),
            (teletext_pid & 0xFF) as u8,
            0xF0,
            0x07,
            DESC_TELETEXT,
            0x05,
            b'e',
            b'n',
            b'g',
            0x10,
            0x88,
        ];
        finish_section(body)
    }

    fn demuxer_over(bytes: Vec<u8>, opts: Options) -> TsDemuxer {
        let input = BufferedInput::from_reader(Box::new(Cursor::new(bytes)));
        TsDemuxer::new(input, opts)
    }

    fn teletext_pes(pts: u64) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, 0xBD];
        let body_len = 3 + 5 + 1;
        pes.push((body_len >> 8) as u8);
        pes.push((body_len & 0xFF) as u8);
        pes.push(0x80);
        pes.push(0x80);
        pes.push(5);
        pes.push(0x21 | ((pts >> 29) & 0x0E) as u8);
        pes.push((pts >> 22) as u8);
        pes.push(0x01 | ((pts >> 14) & 0xFE) as u8);
        pes.push((pts >> 7) as u8);
        pes.push(0x01 | ((pts << 1) & 0xFE) as u8);
        pes.push(0x10); // data identifier
        pes
    }

    #[test]
    fn single_program_teletext_selection() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut stream = Vec::new();
            stream.extend(ts_packet(PID_PAT, true, 0, &section_payload(&pat_section(&[(1, 0x100)]))));
            stream.extend(ts_packet(0x100, true, 0, &section_payload(&pmt_section_teletext(1, 0x200))));
            stream.extend(ts_packet(0x200, true, 0, &teletext_pes(90_000)));
            // second PES start closes the first
            stream.extend(ts_packet(0x200, true, 1, &teletext_pes(180_000)));

            let mut demuxer = demuxer_over(stream, Options::default());
            let data = demuxer.next_payload().await.unwrap().unwrap();
            assert_eq!(data.pid, 0x200);
            assert_eq!(data.program_number, 1);
            assert_eq!(data.codec, CaptionKind::Teletext);
            assert_eq!(data.pts, Some(90_000));
            assert_eq!(data.lang.as_deref(), Some("eng"));

            // EOF flush delivers the second PES
            let data = demuxer.next_payload().await.unwrap().unwrap();
            assert_eq!(data.pts, Some(180_000));
            assert!(demuxer.next_payload().await.unwrap().is_none());
        });
    }

    #[test]
    fn repeated_pat_and_pmt_are_idempotent() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let pat = ts_packet(PID_PAT, true, 0, &section_payload(&pat_section(&[(1, 0x100)])));
            let pmt = ts_packet(0x100, true, 0, &section_payload(&pmt_section_teletext(1, 0x200)));

            let mut stream = Vec::new();
            stream.extend(&pat);
            stream.extend(&pmt);
            // identical tables again with advancing continuity
            let mut pat2 = pat.clone();
            pat2[3] = 0x11;
            let mut pmt2 = pmt.clone();
            pmt2[3] = 0x11;
            stream.extend(&pat2);
            stream.extend(&pmt2);

            let mut demuxer = demuxer_over(stream, Options::default());
            assert!(demuxer.next_payload().await.unwrap().is_none());
            assert_eq!(demuxer.registry().siblings(1).len(), 1);
            assert_eq!(demuxer.cc_gap_count(), 0);
        });
    }

    #[test]
    fn continuity_gap_drops_partial_pes() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut stream = Vec::new();
            stream.extend(ts_packet(PID_PAT, true, 0, &section_payload(&pat_section(&[(1, 0x100)]))));
            stream.extend(ts_packet(0x100, true, 0, &section_payload(&pmt_section_teletext(1, 0x200))));
            // PES start with cc 5
            stream.extend(ts_packet(0x200, true, 5, &teletext_pes(90_000)));
            // continuity jump 5 -> 8 resets the accumulation
            stream.extend(ts_packet(0x200, false, 8, &[0xAA; 32]));
            // a fresh PES resumes output
            stream.extend(ts_packet(0x200, true, 9, &teletext_pes(180_000)));

            let mut demuxer = demuxer_over(stream, Options::default());
            let data = demuxer.next_payload().await.unwrap().unwrap();
            // only the post-gap PES arrives; the broken one was dropped
            assert_eq!(data.pts, Some(180_000));
            assert!(demuxer.next_payload().await.unwrap().is_none());
            assert_eq!(demuxer.cc_gap_count(), 1);
        });
    }

    #[test]
    fn multiprogram_without_flags_is_an_error() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let stream = ts_packet(
                PID_PAT,
                true,
                0,
                &section_payload(&pat_section(&[(1, 0x100), (2, 0x110)])),
            );
            let mut demuxer = demuxer_over(stream, Options::default());
            let err = demuxer.next_payload().await.unwrap_err();
            assert!(matches!(err, TsCapError::Unsupported(_)));
        });
    }

    #[test]
    fn multiprogram_mode_delivers_all_programs() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut stream = Vec::new();
            stream.extend(ts_packet(
                PID_PAT,
                true,
                0,
                &section_payload(&pat_section(&[(1, 0x100), (2, 0x110)])),
            ));
            stream.extend(ts_packet(0x100, true, 0, &section_payload(&pmt_section_teletext(1, 0x200))));
            stream.extend(ts_packet(0x110, true, 0, &section_payload(&pmt_section_teletext(2, 0x210))));
            stream.extend(ts_packet(0x200, true, 0, &teletext_pes(90_000)));
            stream.extend(ts_packet(0x210, true, 0, &teletext_pes(90_000)));
            stream.extend(ts_packet(0x200, true, 1, &teletext_pes(180_000)));
            stream.extend(ts_packet(0x210, true, 1, &teletext_pes(180_000)));

            let opts = Options {
                multiprogram: true,
                ..Options::default()
            };
            let mut demuxer = demuxer_over(stream, opts);
            let mut programs_seen = std::collections::BTreeSet::new();
            while let Some(data) = demuxer.next_payload().await.unwrap() {
                programs_seen.insert(data.program_number);
            }
            assert_eq!(programs_seen.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        });
    }

    #[test]
    fn sync_hunt_skips_garbage() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut stream = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00];
            stream.extend(ts_packet(PID_PAT, true, 0, &section_payload(&pat_section(&[(1, 0x100)]))));
            stream.extend(ts_packet(0x100, true, 0, &section_payload(&pmt_section_teletext(1, 0x200))));

            let mut demuxer = demuxer_over(stream, Options::default());
            assert!(demuxer.next_payload().await.unwrap().is_none());
            // tables still landed despite the leading garbage
            assert_eq!(demuxer.registry().siblings(1).len(), 1);
        });
    }

    #[test]
    fn forced_pid_is_delivered_without_pmt() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut stream = Vec::new();
            stream.extend(ts_packet(0x300, true, 0, &teletext_pes(90_000)));
            stream.extend(ts_packet(0x300, true, 1, &teletext_pes(180_000)));

            let opts = Options {
                forced_cappid: Some(0x300),
                forced_streamtype: Some(STREAM_TYPE_PRIVATE_PES),
                input: InputSource::Stdin, // unused, reader injected
                ..Options::default()
            };
            let input = BufferedInput::from_reader(Box::new(Cursor::new(stream)));
            let mut demuxer = TsDemuxer::new(input, opts);

            let data = demuxer.next_payload().await.unwrap().unwrap();
            assert_eq!(data.pid, 0x300);
            assert_eq!(data.codec, CaptionKind::Teletext);
        });
    }
}
