//! Intel-HEX record validation and conversion.
//!
//! A record travels as uppercase ASCII hex without the leading `:`:
//!
//! ```text
//! +------------+-----------+--------+----------------+----------+
//! | byte count |  address  |  type  |      data      | checksum |
//! +------------+-----------+--------+----------------+----------+
//! |  2 chars   |  4 chars  | 2 chars| count*2 chars  | 2 chars  |
//! +------------+-----------+--------+----------------+----------+
//! ```
//!
//! The checksum is the two's complement of the sum of every decoded byte
//! before it. Address continuity between records is deliberately not
//! checked; records are treated as an ordered byte stream.

use crate::error::{Error, Result};

/// Shortest possible record: zero data bytes, header and checksum only.
pub const MIN_RECORD_LEN: usize = 12;

/// Character offset of the data field (byte count + address + type).
pub const DATA_FIELD_OFFSET: usize = 8;

/// Decode a single uppercase hex digit.
fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Combine two validated hex digits into one byte.
///
/// Returns 0 for digits outside `[0-9A-F]`; callers validate first.
pub fn byte_from_hex(msb: u8, lsb: u8) -> u8 {
    hex_value(msb).unwrap_or(0) * 16 + hex_value(lsb).unwrap_or(0)
}

/// Validate one Intel-HEX record and return its declared data byte count.
///
/// Checks length, character set, checksum, and that the record length
/// agrees with the declared byte count.
pub fn validate(record: &[u8]) -> Result<u8> {
    if record.len() < MIN_RECORD_LEN || record.len() % 2 != 0 {
        return Err(Error::InvalidRecord(format!(
            "bad record length {}",
            record.len()
        )));
    }

    let mut bytes = Vec::with_capacity(record.len() / 2);
    for pair in record.chunks_exact(2) {
        let hi = hex_value(pair[0]);
        let lo = hex_value(pair[1]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => bytes.push(hi * 16 + lo),
            _ => {
                return Err(Error::InvalidRecord(
                    "non-hex character in record".into(),
                ));
            },
        }
    }

    // Two's complement over everything before the trailing checksum byte.
    let (payload, checksum) = bytes.split_at(bytes.len() - 1);
    let sum: u8 = payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum.wrapping_neg() != checksum[0] {
        return Err(Error::InvalidRecord(format!(
            "checksum mismatch: expected {:02X}, got {:02X}",
            sum.wrapping_neg(),
            checksum[0]
        )));
    }

    let declared = bytes[0];
    if record.len() != usize::from(declared) * 2 + 10 {
        return Err(Error::InvalidRecord(format!(
            "length {} disagrees with declared byte count {declared}",
            record.len()
        )));
    }

    Ok(declared)
}

/// Convert a record's data field from hex pairs to raw bytes.
///
/// Assumes the record was validated; `byte_count` is the value returned
/// by [`validate`].
pub fn decode(data_field: &[u8], byte_count: u8) -> Vec<u8> {
    data_field
        .chunks_exact(2)
        .take(usize::from(byte_count))
        .map(|pair| byte_from_hex(pair[0], pair[1]))
        .collect()
}

/// Validate a record and return its decoded data bytes.
pub fn decode_record(record: &[u8]) -> Result<Vec<u8>> {
    let byte_count = validate(record)?;
    Ok(decode(&record[DATA_FIELD_OFFSET..], byte_count))
}

/// Build a valid record from an address, record type, and data bytes.
///
/// `data` must hold at most 255 bytes (one record's worth).
#[allow(clippy::cast_possible_truncation)]
pub fn encode(address: u16, record_type: u8, data: &[u8]) -> String {
    let mut record = format!("{:02X}{address:04X}{record_type:02X}", data.len() as u8);
    let mut sum = (data.len() as u8)
        .wrapping_add((address >> 8) as u8)
        .wrapping_add(address as u8)
        .wrapping_add(record_type);
    for byte in data {
        record.push_str(&format!("{byte:02X}"));
        sum = sum.wrapping_add(*byte);
    }
    record.push_str(&format!("{:02X}", sum.wrapping_neg()));
    record
}

/// Format bytes as uppercase hex for trace output.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 16 data bytes at address 0x0100, record type 00.
    const RECORD: &[u8] = b"10010000214601360121470136007EFE09D2190140";

    #[test]
    fn test_validate_known_record() {
        assert_eq!(validate(RECORD).unwrap(), 0x10);
    }

    #[test]
    fn test_validate_minimum_record() {
        // One data byte is the shortest record this validator accepts;
        // zero-data records (like the EOF record) are callers' business.
        let record = encode(0x0000, 0x00, &[0xAB]);
        assert_eq!(record.len(), MIN_RECORD_LEN);
        assert_eq!(validate(record.as_bytes()).unwrap(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_data_record() {
        let record = encode(0x0000, 0x01, &[]);
        assert!(validate(record.as_bytes()).is_err());
    }

    #[test]
    fn test_validate_rejects_short_record() {
        assert!(validate(b"00000001FF").is_err());
    }

    #[test]
    fn test_validate_rejects_odd_length() {
        assert!(validate(b"10010000214601360121470136007EFE09D21901400").is_err());
    }

    #[test]
    fn test_validate_rejects_lowercase() {
        let lower: Vec<u8> = RECORD.to_ascii_lowercase();
        assert!(validate(&lower).is_err());
    }

    #[test]
    fn test_validate_rejects_length_mismatch() {
        // Declared count of 0x11 but only 16 data bytes present.
        let mut record = RECORD.to_vec();
        record[1] = b'1';
        assert!(validate(&record).is_err());
    }

    #[test]
    fn test_single_character_corruption_rejected() {
        // Flipping any one hex digit must fail validation, whether it lands
        // in the header, data, or checksum field.
        for pos in 0..RECORD.len() {
            let mut corrupted = RECORD.to_vec();
            corrupted[pos] = if corrupted[pos] == b'0' { b'1' } else { b'0' };
            assert!(
                validate(&corrupted).is_err(),
                "corruption at {pos} was accepted"
            );
        }
    }

    #[test]
    fn test_decode_record() {
        let bytes = decode_record(RECORD).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 0x21);
        assert_eq!(bytes[15], 0x01);
    }

    #[test]
    fn test_encode_validate_decode_round_trip() {
        let payloads: [&[u8]; 3] = [
            &[0x00],
            &[0xDE, 0xAD, 0xBE, 0xEF],
            &[0xFF; 16],
        ];
        for payload in payloads {
            let record = encode(0x0200, 0x00, payload);
            let byte_count = validate(record.as_bytes()).unwrap();
            assert_eq!(usize::from(byte_count), payload.len());
            assert_eq!(decode_record(record.as_bytes()).unwrap(), payload);
        }
    }

    #[test]
    fn test_byte_from_hex() {
        assert_eq!(byte_from_hex(b'0', b'0'), 0x00);
        assert_eq!(byte_from_hex(b'F', b'F'), 0xFF);
        assert_eq!(byte_from_hex(b'1', b'A'), 0x1A);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0xDE, 0xAD]), "DEAD");
        assert_eq!(to_hex(&[]), "");
    }
}
