//! Intel HEX record parsing.
//!
//! Parses the record-based hex format into the flat buffer the flash session
//! needs. Only the record types CC2538 toolchains emit are honored; start
//! address records carry no flash payload and are skipped.
//!
//! ## Record Format
//!
//! ```text
//! :LLAAAATT<data...>CC
//!  |  |   |          |
//!  |  |   |          +-- checksum (two's complement of the byte sum)
//!  |  |   +------------- record type
//!  |  +----------------- 16-bit offset
//!  +-------------------- data byte count
//! ```

use crate::error::{Error, Result};

/// Shortest well-formed record: count, offset, type and checksum fields.
const MIN_RECORD_CHARS: usize = 10;

/// Intel HEX record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
}

impl RecordKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::EndOfFile),
            0x02 => Some(Self::ExtendedSegmentAddress),
            0x03 => Some(Self::StartSegmentAddress),
            0x04 => Some(Self::ExtendedLinearAddress),
            0x05 => Some(Self::StartLinearAddress),
            _ => None,
        }
    }
}

/// One parsed record.
#[derive(Debug)]
struct Record {
    offset: u16,
    kind: RecordKind,
    data: Vec<u8>,
}

fn hex_byte(chars: &str, pos: usize) -> Option<u8> {
    u8::from_str_radix(chars.get(pos..pos + 2)?, 16).ok()
}

/// Parse one record body (the line without its leading ':').
fn parse_record(body: &str) -> std::result::Result<Record, String> {
    if body.len() < MIN_RECORD_CHARS {
        return Err("record too short".to_string());
    }

    let byte_count =
        hex_byte(body, 0).ok_or_else(|| "malformed byte count field".to_string())?;
    if body.len() != MIN_RECORD_CHARS + usize::from(byte_count) * 2 {
        return Err(format!(
            "record length does not match byte count {byte_count}"
        ));
    }

    let offset_hi = hex_byte(body, 2).ok_or_else(|| "malformed offset field".to_string())?;
    let offset_lo = hex_byte(body, 4).ok_or_else(|| "malformed offset field".to_string())?;
    let offset = u16::from_be_bytes([offset_hi, offset_lo]);

    let kind_raw = hex_byte(body, 6).ok_or_else(|| "malformed record type field".to_string())?;
    let kind = RecordKind::from_byte(kind_raw)
        .ok_or_else(|| format!("unknown record type {kind_raw:#04x}"))?;

    let mut data = Vec::with_capacity(usize::from(byte_count));
    for i in 0..usize::from(byte_count) {
        data.push(hex_byte(body, 8 + i * 2).ok_or_else(|| "malformed data field".to_string())?);
    }

    let stated = hex_byte(body, 8 + usize::from(byte_count) * 2)
        .ok_or_else(|| "malformed checksum field".to_string())?;

    // The sum of every record byte, checksum included, is 0 modulo 256.
    let sum = data
        .iter()
        .fold(
            byte_count
                .wrapping_add(offset_hi)
                .wrapping_add(offset_lo)
                .wrapping_add(kind_raw),
            |acc, b| acc.wrapping_add(*b),
        )
        .wrapping_add(stated);
    if sum != 0 {
        return Err(format!("checksum mismatch (stated {stated:#04x})"));
    }

    Ok(Record { offset, kind, data })
}

/// Parse Intel HEX text into a flat, contiguous byte buffer.
///
/// Data records are placed relative to the lowest address seen; gaps are
/// filled with `0xFF`.
pub(crate) fn parse(text: &str) -> Result<Vec<u8>> {
    let mut spans: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut upper: u32 = 0;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(body) = line.strip_prefix(':') else {
            return Err(Error::InvalidImage(format!(
                "line {}: missing ':' record mark",
                line_no + 1
            )));
        };

        let record = parse_record(body)
            .map_err(|e| Error::InvalidImage(format!("line {}: {e}", line_no + 1)))?;

        match record.kind {
            RecordKind::Data => {
                spans.push((upper.wrapping_add(u32::from(record.offset)), record.data));
            },
            RecordKind::EndOfFile => break,
            RecordKind::ExtendedLinearAddress => {
                if record.data.len() != 2 {
                    return Err(Error::InvalidImage(format!(
                        "line {}: extended linear address record must carry 2 bytes",
                        line_no + 1
                    )));
                }
                upper = u32::from(record.data[0]) << 24 | u32::from(record.data[1]) << 16;
            },
            RecordKind::ExtendedSegmentAddress => {
                if record.data.len() != 2 {
                    return Err(Error::InvalidImage(format!(
                        "line {}: extended segment address record must carry 2 bytes",
                        line_no + 1
                    )));
                }
                upper = (u32::from(record.data[0]) << 8 | u32::from(record.data[1])) << 4;
            },
            // Start addresses describe execution entry, not flash content.
            RecordKind::StartSegmentAddress | RecordKind::StartLinearAddress => {},
        }
    }

    if spans.is_empty() {
        return Err(Error::InvalidImage("no data records found".to_string()));
    }

    let base = spans.iter().map(|(addr, _)| *addr).min().unwrap_or(0);
    let end = spans
        .iter()
        .map(|(addr, data)| addr + data.len() as u32)
        .max()
        .unwrap_or(base);

    let mut buffer = vec![0xFF; (end - base) as usize];
    for (addr, data) in spans {
        let start = (addr - base) as usize;
        buffer[start..start + data.len()].copy_from_slice(&data);
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = ":020000040020DA\n\
         :10000000DEADBEEF0102030405060708090A0B0C6A\n\
         :04001000CAFEBABEAC\n\
         :00000001FF\n";

    #[test]
    fn test_parse_flattens_records() {
        let data = parse(SAMPLE).unwrap();
        assert_eq!(data.len(), 20);
        assert_eq!(&data[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&data[16..20], &[0xCA, 0xFE, 0xBA, 0xBE]);
    }

    #[test]
    fn test_parse_fills_gaps_with_erased_flash() {
        let text = ":0100000011EE\n\
             :01000400EE0D\n\
             :00000001FF\n";
        let data = parse(text).unwrap();
        assert_eq!(data, vec![0x11, 0xFF, 0xFF, 0xFF, 0xEE]);
    }

    #[test]
    fn test_parse_stops_at_end_of_file_record() {
        let text = ":0100000011EE\n\
             :00000001FF\n\
             :01000000FF00\n";
        let data = parse(text).unwrap();
        assert_eq!(data, vec![0x11]);
    }

    #[test]
    fn test_parse_rejects_checksum_mismatch() {
        let text = ":0100000011EF\n:00000001FF\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_parse_rejects_missing_record_mark() {
        let err = parse("0100000011EE\n").unwrap_err();
        assert!(err.to_string().contains("record mark"));
    }

    #[test]
    fn test_parse_rejects_truncated_record() {
        let err = parse(":0200000011EE\n").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_record_type() {
        let err = parse(":0100000611E8\n").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        let err = parse("").unwrap_err();
        assert!(err.to_string().contains("no data records"));
    }

    #[test]
    fn test_parse_dos_line_endings() {
        let text = ":0100000011EE\r\n:00000001FF\r\n";
        assert_eq!(parse(text).unwrap(), vec![0x11]);
    }
}
