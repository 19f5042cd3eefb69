// Stream IDs
/// PES stream id for private stream 1 (Teletext, DVB subtitles)
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;

// PIDs
/// PID for the Program Association Table (PAT)
pub const PID_PAT: u16 = 0x0000;
/// PID for the Conditional Access Table (ignored)
pub const PID_CAT: u16 = 0x0001;
/// PID carrying DVB Event Information Table sections
pub const PID_EIT: u16 = 0x0012;
/// Null packets, discarded without inspection
pub const PID_NULL: u16 = 0x1FFF;

// Table IDs
/// Table ID for the Program Association Table
pub const TABLE_ID_PAT: u8 = 0x00;
/// Table ID for the Program Map Table
pub const TABLE_ID_PMT: u8 = 0x02;
/// First table id of the EIT family (present/following, actual TS)
pub const TABLE_ID_EIT_MIN: u8 = 0x4E;
/// Last table id of the EIT family (schedule, other TS)
pub const TABLE_ID_EIT_MAX: u8 = 0x6F;

// Elementary stream types (ISO 13818-1 table 2-29)
/// MPEG-1 video
pub const STREAM_TYPE_VIDEO_MPEG1: u8 = 0x01;
/// MPEG-2 video, the classic carrier of CEA-608/708 user data
pub const STREAM_TYPE_VIDEO_MPEG2: u8 = 0x02;
/// MPEG-1 audio
pub const STREAM_TYPE_AUDIO_MPEG1: u8 = 0x03;
/// MPEG-2 audio
pub const STREAM_TYPE_AUDIO_MPEG2: u8 = 0x04;
/// Private PES data: DVB subtitles and Teletext live here
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
/// AAC audio
pub const STREAM_TYPE_AUDIO_AAC: u8 = 0x0f;
/// H.264 video, SEI user data may carry CEA-608/708
pub const STREAM_TYPE_VIDEO_H264: u8 = 0x1b;
/// H.265 video
pub const STREAM_TYPE_VIDEO_H265: u8 = 0x24;

// Descriptor tags the caption selector inspects
/// ISO-639 language descriptor
pub const DESC_ISO639_LANGUAGE: u8 = 0x0A;
/// VBI data descriptor (CEA-608 in analog VBI)
pub const DESC_VBI_DATA: u8 = 0x45;
/// VBI teletext descriptor
pub const DESC_VBI_TELETEXT: u8 = 0x46;
/// Teletext descriptor
pub const DESC_TELETEXT: u8 = 0x56;
/// DVB subtitle descriptor
pub const DESC_DVB_SUBTITLE: u8 = 0x59;

/// True for either descriptor tag that advertises Teletext carriage.
pub fn is_teletext_descriptor(tag: u8) -> bool {
    tag == DESC_VBI_TELETEXT || tag == DESC_TELETEXT
}

// Constants
/// Size of a Transport Stream packet in bytes
pub const TS_PACKET_SIZE: usize = 188;
/// Size of an m2ts packet: a 4-byte timestamp prefix plus a TS packet
pub const M2TS_PACKET_SIZE: usize = 192;
/// Size of a Transport Stream header in bytes
pub const TS_HEADER_SIZE: usize = 4;
/// Clock frequency for PTS/DTS values in Hz
pub const PTS_HZ: u64 = 90_000;
/// Clock frequency for the PCR extension in Hz
pub const PCR_HZ: u64 = 27_000_000;

/// Represents an entry in the Program Association Table (PAT)
///
/// Each entry maps a program number to the PID of that program's Program
/// Map Table. Program number 0 designates the network PID and is ignored
/// by the caption selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number (16-bit); 0 is reserved for the network PID
    pub program_number: u16,
    /// PID of the PMT for this program (13-bit)
    pub pmt_pid: u16,
}

/// Program Association Table contents after parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pat {
    /// Transport stream id from the section header
    pub transport_stream_id: u16,
    /// Version number of the section
    pub version_number: u8,
    /// Programs advertised, network entries excluded
    pub entries: Vec<PatEntry>,
}

/// A descriptor attached to a program or elementary stream in the PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Tag identifying the descriptor type
    pub tag: u8,
    /// Raw descriptor payload
    pub data: Vec<u8>,
}

impl Descriptor {
    /// ISO-639 language code carried by a language, teletext, or DVB
    /// subtitle descriptor, when present and printable.
    pub fn iso639_language(&self) -> Option<String> {
        match self.tag {
            DESC_ISO639_LANGUAGE | DESC_TELETEXT | DESC_DVB_SUBTITLE if self.data.len() >= 3 => {
                let lang: String = self.data[..3]
                    .iter()
                    .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { ' ' })
                    .collect();
                let trimmed = lang.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            _ => None,
        }
    }

    /// Composition and ancillary page ids from a DVB subtitle descriptor.
    pub fn dvb_subtitle_pages(&self) -> Option<(u16, u16)> {
        if self.tag != DESC_DVB_SUBTITLE || self.data.len() < 8 {
            return None;
        }
        let composition = u16::from_be_bytes([self.data[4], self.data[5]]);
        let ancillary = u16::from_be_bytes([self.data[6], self.data[7]]);
        Some((composition, ancillary))
    }

    /// Initial Teletext page advertised by a teletext descriptor, as the
    /// decoder's `(magazine << 8) | page` form.
    pub fn teletext_initial_page(&self) -> Option<u16> {
        if self.tag != DESC_TELETEXT || self.data.len() < 5 {
            return None;
        }
        let magazine = (self.data[3] & 0x07) as u16;
        let magazine = if magazine == 0 { 8 } else { magazine };
        Some((magazine << 8) | self.data[4] as u16)
    }
}

/// Elementary stream entry inside a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsInfo {
    /// Stream type byte (ISO 13818-1)
    pub stream_type: u8,
    /// PID carrying the elementary stream
    pub elementary_pid: u16,
    /// Descriptors scoped to this stream
    pub descriptors: Vec<Descriptor>,
}

impl EsInfo {
    /// First descriptor with the given tag, if any.
    pub fn descriptor(&self, tag: u8) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.tag == tag)
    }

    /// Whether any descriptor advertises Teletext carriage.
    pub fn has_teletext_descriptor(&self) -> bool {
        self.descriptors.iter().any(|d| is_teletext_descriptor(d.tag))
    }

    /// Whether any descriptor advertises DVB subtitles.
    pub fn has_dvb_subtitle_descriptor(&self) -> bool {
        self.descriptors.iter().any(|d| d.tag == DESC_DVB_SUBTITLE)
    }
}

/// Program Map Table contents after parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pmt {
    /// Program this table describes
    pub program_number: u16,
    /// Section version number, the change tie-breaker of last resort
    pub version_number: u8,
    /// PID carrying the program clock reference
    pub pcr_pid: u16,
    /// Descriptors that apply to the whole program
    pub program_descriptors: Vec<Descriptor>,
    /// Elementary streams of the program
    pub streams: Vec<EsInfo>,
}

/// Adaptation field of a TS packet, with the PCR when present.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    /// Number of bytes in the field after the length byte
    pub length: usize,
    /// Discontinuity indicator
    pub discontinuity: bool,
    /// Random access indicator (stream start / key frame)
    pub random_access: bool,
    /// PCR in 27 MHz units (`base * 300 + extension`), when signalled
    pub pcr: Option<u64>,
}

/// Fixed 4-byte header of a TS packet.
#[derive(Debug, Clone)]
pub struct TsHeader {
    /// Transport error indicator; set packets are dropped
    pub transport_error: bool,
    /// A PES packet or PSI section starts in this payload
    pub payload_unit_start: bool,
    /// Transport priority bit
    pub transport_priority: bool,
    /// Packet identifier (13-bit)
    pub pid: u16,
    /// Scrambling control (2-bit); non-zero payloads are unreadable
    pub scrambling_control: u8,
    /// Adaptation field present
    pub has_adaptation_field: bool,
    /// Payload present
    pub has_payload: bool,
    /// Continuity counter (4-bit), increments per PID
    pub continuity_counter: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_language_extraction() {
        let d = Descriptor {
            tag: DESC_ISO639_LANGUAGE,
            data: vec![b'f', b'i', b'n', 0x00],
        };
        assert_eq!(d.iso639_language().as_deref(), Some("fin"));

        let d = Descriptor {
            tag: DESC_DVB_SUBTITLE,
            data: vec![b'd', b'e', b'u', 0x10, 0x00, 0x02, 0x00, 0x03],
        };
        assert_eq!(d.iso639_language().as_deref(), Some("deu"));
        assert_eq!(d.dvb_subtitle_pages(), Some((2, 3)));
    }

    #[test]
    fn teletext_initial_page_uses_magazine_eight_for_zero() {
        let d = Descriptor {
            tag: DESC_TELETEXT,
            data: vec![b'c', b'z', b'e', 0x10, 0x88],
        };
        // magazine bits 0 mean magazine 8
        assert_eq!(d.teletext_initial_page(), Some((8 << 8) | 0x88));
    }

    #[test]
    fn teletext_descriptor_detection() {
        let es = EsInfo {
            stream_type: STREAM_TYPE_PRIVATE_PES,
            elementary_pid: 0x100,
            descriptors: vec![Descriptor {
                tag: DESC_VBI_TELETEXT,
                data: vec![],
            }],
        };
        assert!(es.has_teletext_descriptor());
        assert!(!es.has_dvb_subtitle_descriptor());
    }
}
