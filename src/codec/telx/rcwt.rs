//! RCWT ("raw caption with timing") round-trip for Teletext data units.
//!
//! The on-disk layout is an 11-byte file header followed by fixed-size
//! frames, one per Teletext data unit:
//!
//! ```text
//! header: CC CC ED | creator u16 | creator version u16 | format u16 | 00 00
//! frame:  data_unit_id u8 | timestamp_ms u64 LE | 44 payload bytes
//! ```
//!
//! Format 0x0002 is the Teletext framing. Files with a different format
//! value are rejected outright; guessing at unknown versions corrupts the
//! replay silently, so the reader never tries.

use super::{TelxDecoder, DATA_UNIT_PAYLOAD_LEN};
use crate::error::{Result, TsCapError};
use crate::sub::Subtitle;

/// RCWT file magic.
pub const RCWT_MAGIC: [u8; 3] = [0xCC, 0xCC, 0xED];
/// Format value for Teletext data-unit framing.
pub const RCWT_FORMAT_TELETEXT: u16 = 0x0002;
/// Size of the file header.
pub const RCWT_HEADER_LEN: usize = 11;
/// Size of one frame.
pub const RCWT_FRAME_LEN: usize = 1 + 8 + DATA_UNIT_PAYLOAD_LEN;

/// Writes the RCWT file header.
pub fn write_header(out: &mut Vec<u8>) {
    out.extend_from_slice(&RCWT_MAGIC);
    out.extend_from_slice(&[0x54, 0x53]); // creator
    out.extend_from_slice(&[0x00, 0x01]); // creator version
    out.extend_from_slice(&RCWT_FORMAT_TELETEXT.to_be_bytes());
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Validates the header and returns the offset of the first frame.
pub fn check_header(data: &[u8]) -> Result<usize> {
    if data.len() < RCWT_HEADER_LEN || data[..3] != RCWT_MAGIC {
        return Err(TsCapError::MissingRcwtHeader("magic bytes absent".into()));
    }
    let format = u16::from_be_bytes([data[7], data[8]]);
    if format != RCWT_FORMAT_TELETEXT {
        return Err(TsCapError::MissingRcwtHeader(format!(
            "unknown format 0x{:04x}",
            format
        )));
    }
    Ok(RCWT_HEADER_LEN)
}

/// Serializes one data unit as a frame.
pub fn write_frame(out: &mut Vec<u8>, data_unit_id: u8, timestamp_ms: i64, unit: &[u8; DATA_UNIT_PAYLOAD_LEN]) {
    out.push(data_unit_id);
    out.extend_from_slice(&(timestamp_ms as u64).to_le_bytes());
    out.extend_from_slice(unit);
}

/// Wraps one data unit as a raw subtitle for the RCWT output path. The
/// encoder writes the payload verbatim after the file header.
pub fn frame_subtitle(data_unit_id: u8, timestamp_ms: i64, unit: &[u8; DATA_UNIT_PAYLOAD_LEN]) -> Subtitle {
    let mut frame = Vec::with_capacity(RCWT_FRAME_LEN);
    write_frame(&mut frame, data_unit_id, timestamp_ms, unit);
    Subtitle::raw(frame, timestamp_ms, timestamp_ms)
}

/// Replays an RCWT file through a Teletext decoder, producing the same
/// subtitles the original stream would have.
pub fn replay(decoder: &mut TelxDecoder, data: &[u8]) -> Result<Vec<Subtitle>> {
    let mut pos = check_header(data)?;
    let mut subs = Vec::new();

    while pos + RCWT_FRAME_LEN <= data.len() {
        let data_unit_id = data[pos];
        let timestamp_ms = u64::from_le_bytes(data[pos + 1..pos + 9].try_into().expect("fixed slice")) as i64;
        let unit: [u8; DATA_UNIT_PAYLOAD_LEN] = data[pos + 9..pos + RCWT_FRAME_LEN]
            .try_into()
            .expect("fixed slice");
        subs.extend(decoder.process_data_unit(data_unit_id, &unit, timestamp_ms));
        pos += RCWT_FRAME_LEN;
    }

    if pos != data.len() {
        return Err(TsCapError::InvalidData("trailing partial RCWT frame".into()));
    }
    Ok(subs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::telx::DATA_UNIT_TELETEXT_SUBTITLE;

    #[test]
    fn header_round_trip() {
        let mut file = Vec::new();
        write_header(&mut file);
        assert_eq!(check_header(&file).unwrap(), RCWT_HEADER_LEN);
    }

    #[test]
    fn unknown_format_is_an_error() {
        let mut file = Vec::new();
        write_header(&mut file);
        file[7] = 0x00;
        file[8] = 0x09;
        match check_header(&file) {
            Err(TsCapError::MissingRcwtHeader(msg)) => assert!(msg.contains("0x0009")),
            other => panic!("expected MissingRcwtHeader, got {:?}", other.err()),
        }
    }

    #[test]
    fn missing_magic_is_an_error() {
        assert!(matches!(
            check_header(&[0u8; 16]),
            Err(TsCapError::MissingRcwtHeader(_))
        ));
    }

    #[test]
    fn frame_round_trip() {
        let unit = [0xAB; DATA_UNIT_PAYLOAD_LEN];
        let mut file = Vec::new();
        write_header(&mut file);
        write_frame(&mut file, DATA_UNIT_TELETEXT_SUBTITLE, 1234, &unit);

        let pos = check_header(&file).unwrap();
        assert_eq!(file.len() - pos, RCWT_FRAME_LEN);
        assert_eq!(file[pos], DATA_UNIT_TELETEXT_SUBTITLE);
        assert_eq!(
            u64::from_le_bytes(file[pos + 1..pos + 9].try_into().unwrap()),
            1234
        );
        assert_eq!(&file[pos + 9..], &unit[..]);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut opts = crate::config::Options::default();
        opts.teletext_page = 888;
        let mut decoder = TelxDecoder::new(&opts);

        let mut file = Vec::new();
        write_header(&mut file);
        file.extend_from_slice(&[0u8; 10]); // partial frame
        assert!(replay(&mut decoder, &file).is_err());
    }
}
