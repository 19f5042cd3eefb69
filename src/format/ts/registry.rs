use crate::format::CaptionKind;
use log::warn;
use std::collections::BTreeMap;

/// Capability record for one observed PID.
///
/// At most one record exists per PID globally; records link to their
/// program through `program_number` rather than embedded list nodes, and
/// sibling traversal is a filtered walk over the ordered map.
#[derive(Debug, Clone)]
pub struct CapInfo {
    /// The PID this record describes
    pub pid: u16,
    /// Program the PID belongs to
    pub program_number: u16,
    /// Raw ISO 13818-1 stream type from the PMT
    pub stream_type: u8,
    /// Caption codec classification
    pub codec: CaptionKind,
    /// ISO-639 language advertised for the stream, if any
    pub lang: Option<String>,
    /// Marked after selection so the demuxer skips the stream's bytes
    pub ignore: bool,
    /// PSI generation that last touched this record; codec changes within
    /// one generation are anomalies
    generation: u64,
}

/// Program record assembled from PAT and PMT.
#[derive(Debug, Clone)]
pub struct ProgramInfo {
    /// Program number from the PAT
    pub program_number: u16,
    /// PID of the program's PMT
    pub pmt_pid: u16,
    /// PCR PID from the PMT, once parsed
    pub pcr_pid: Option<u16>,
    /// Whether this program is the active extraction target
    pub selected: bool,
}

/// Registry of caption-capable streams and their programs.
///
/// Replaces the original's triply-linked `cap_info` lists with two ordered
/// maps: streams keyed by PID, programs keyed by program number. Sibling
/// queries filter the stream map by program.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: BTreeMap<u16, CapInfo>,
    programs: BTreeMap<u16, ProgramInfo>,
    generation: u64,
}

impl StreamRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the PSI generation. Call on every accepted PAT/PMT change;
    /// codec transitions observed without a bump are logged as anomalies.
    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Registers or updates a program from the PAT.
    pub fn upsert_program(&mut self, program_number: u16, pmt_pid: u16) {
        self.programs
            .entry(program_number)
            .and_modify(|p| p.pmt_pid = pmt_pid)
            .or_insert(ProgramInfo {
                program_number,
                pmt_pid,
                pcr_pid: None,
                selected: false,
            });
    }

    /// Records the PCR PID once the program's PMT arrives.
    pub fn set_pcr_pid(&mut self, program_number: u16, pcr_pid: u16) {
        if let Some(p) = self.programs.get_mut(&program_number) {
            p.pcr_pid = Some(pcr_pid);
        }
    }

    /// Marks exactly one program as selected; all others are deselected.
    pub fn select_program(&mut self, program_number: u16) {
        for p in self.programs.values_mut() {
            p.selected = p.program_number == program_number;
        }
    }

    /// Marks every program as selected (multiprogram mode).
    pub fn select_all_programs(&mut self) {
        for p in self.programs.values_mut() {
            p.selected = true;
        }
    }

    /// The selected program, when exactly one is active.
    pub fn selected_program(&self) -> Option<&ProgramInfo> {
        let mut found = None;
        for p in self.programs.values().filter(|p| p.selected) {
            if found.is_some() {
                return None; // multiprogram: no single answer
            }
            found = Some(p);
        }
        found
    }

    /// All known programs, in program-number order.
    pub fn programs(&self) -> impl Iterator<Item = &ProgramInfo> {
        self.programs.values()
    }

    /// Upserts a stream record. Codec or stream-type transitions reset the
    /// ignore flag (the caller resets PES buffers); a codec change without
    /// an intervening PSI generation bump is logged as an anomaly.
    pub fn update(
        &mut self,
        pid: u16,
        stream_type: u8,
        codec: CaptionKind,
        program_number: u16,
        lang: Option<String>,
    ) {
        if let Some(existing) = self.streams.get_mut(&pid) {
            if existing.codec != codec && codec != CaptionKind::Unknown {
                if existing.generation == self.generation && existing.codec != CaptionKind::Unknown {
                    warn!(
                        "PID {} changed codec {:?} -> {:?} without a PSI change",
                        pid, existing.codec, codec
                    );
                }
                existing.codec = codec;
                existing.ignore = false;
            }
            if stream_type != 0 {
                existing.stream_type = stream_type;
            }
            if lang.is_some() {
                existing.lang = lang;
            }
            existing.program_number = program_number;
            existing.generation = self.generation;
            return;
        }
        self.streams.insert(
            pid,
            CapInfo {
                pid,
                program_number,
                stream_type,
                codec,
                lang,
                ignore: false,
                generation: self.generation,
            },
        );
    }

    /// Looks up a usable stream record: classified, not ignored.
    pub fn get(&self, pid: u16) -> Option<&CapInfo> {
        self.streams
            .get(&pid)
            .filter(|s| !s.ignore && s.codec != CaptionKind::None)
    }

    /// Looks up a record regardless of usability.
    pub fn get_any(&self, pid: u16) -> Option<&CapInfo> {
        self.streams.get(&pid)
    }

    /// Best caption stream of a program: Teletext > DVB subtitle > ATSC.
    pub fn get_best(&self, program_number: u16) -> Option<&CapInfo> {
        self.streams
            .values()
            .filter(|s| s.program_number == program_number && s.codec.is_caption() && !s.ignore)
            .min_by_key(|s| (s.codec.preference(), s.pid))
    }

    /// Best caption stream across every program.
    pub fn get_best_global(&self) -> Option<&CapInfo> {
        self.streams
            .values()
            .filter(|s| s.codec.is_caption() && !s.ignore)
            .min_by_key(|s| (s.codec.preference(), s.pid))
    }

    /// All caption streams of a program, preference order.
    pub fn siblings(&self, program_number: u16) -> Vec<&CapInfo> {
        let mut v: Vec<&CapInfo> = self
            .streams
            .values()
            .filter(|s| s.program_number == program_number)
            .collect();
        v.sort_by_key(|s| (s.codec.preference(), s.pid));
        v
    }

    /// After selection: mark every other stream of the program ignored so
    /// its bytes are no longer parsed.
    pub fn ignore_other_siblings(&mut self, program_number: u16, keep_pid: u16) {
        for s in self.streams.values_mut() {
            if s.program_number == program_number && s.pid != keep_pid {
                s.ignore = true;
            }
        }
    }

    /// Whether any stream still needs classification before selection can
    /// settle.
    pub fn needs_info(&self) -> bool {
        if self.streams.is_empty() {
            return true;
        }
        self.streams
            .values()
            .any(|s| s.codec == CaptionKind::Unknown)
    }

    /// Tears the registry down, dropping every record.
    pub fn clear(&mut self) {
        self.streams.clear();
        self.programs.clear();
    }

    /// Caption streams per codec kind for a program, used for split-DVB
    /// output and reporting.
    pub fn streams_of_kind(&self, program_number: u16, kind: CaptionKind) -> Vec<&CapInfo> {
        self.streams
            .values()
            .filter(|s| s.program_number == program_number && s.codec == kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_stream_prefers_teletext() {
        let mut reg = StreamRegistry::new();
        reg.upsert_program(1, 0x100);
        reg.update(0x201, 0x02, CaptionKind::AtscCc, 1, None);
        reg.update(0x202, 0x06, CaptionKind::DvbSubtitle, 1, Some("deu".into()));
        reg.update(0x203, 0x06, CaptionKind::Teletext, 1, Some("fin".into()));

        let best = reg.get_best(1).unwrap();
        assert_eq!(best.pid, 0x203);
        assert_eq!(best.codec, CaptionKind::Teletext);
    }

    #[test]
    fn one_record_per_pid() {
        let mut reg = StreamRegistry::new();
        reg.update(0x100, 0x06, CaptionKind::Unknown, 1, None);
        reg.bump_generation();
        reg.update(0x100, 0x06, CaptionKind::Teletext, 1, None);
        assert_eq!(reg.siblings(1).len(), 1);
        assert_eq!(reg.get(0x100).unwrap().codec, CaptionKind::Teletext);
    }

    #[test]
    fn ignore_other_siblings_hides_streams() {
        let mut reg = StreamRegistry::new();
        reg.update(0x201, 0x06, CaptionKind::Teletext, 1, None);
        reg.update(0x202, 0x06, CaptionKind::DvbSubtitle, 1, None);
        reg.ignore_other_siblings(1, 0x201);
        assert!(reg.get(0x202).is_none());
        assert!(reg.get(0x201).is_some());
        // get_best no longer sees the ignored sibling
        assert_eq!(reg.get_best(1).unwrap().pid, 0x201);
    }

    #[test]
    fn selected_program_is_unique() {
        let mut reg = StreamRegistry::new();
        reg.upsert_program(1, 0x100);
        reg.upsert_program(2, 0x200);
        reg.select_program(2);
        assert_eq!(reg.selected_program().unwrap().program_number, 2);
        reg.select_program(1);
        assert_eq!(reg.selected_program().unwrap().program_number, 1);
        reg.select_all_programs();
        assert!(reg.selected_program().is_none());
    }

    #[test]
    fn needs_info_until_classified() {
        let mut reg = StreamRegistry::new();
        assert!(reg.needs_info());
        reg.update(0x201, 0x06, CaptionKind::Unknown, 1, None);
        assert!(reg.needs_info());
        reg.update(0x201, 0x06, CaptionKind::Teletext, 1, None);
        assert!(!reg.needs_info());
    }
}
