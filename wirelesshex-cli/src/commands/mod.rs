//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod check;
pub(crate) mod ports;
pub(crate) mod upload;

use anyhow::{bail, Context, Result};
use std::path::Path;

use wirelesshex::hex;

/// Intel-HEX record types the uploader understands.
const RECORD_TYPE_DATA: u8 = 0x00;

/// The canonical end-of-file record, stripped of its `:` mark. It carries
/// no data, which puts it below the stream validator's minimum length, so
/// it is matched literally.
const EOF_RECORD: &[u8] = b"00000001FF";

/// An Intel-HEX image loaded from disk and validated line by line.
#[derive(Debug)]
pub(crate) struct HexImage {
    /// Data records, stripped of the leading `:`, in file order.
    pub records: Vec<Vec<u8>>,
    /// Total firmware bytes across all data records.
    pub data_bytes: u64,
}

/// Load and validate an Intel-HEX file.
///
/// Only data records are kept; the end-of-file record stops the scan and
/// anything after it is ignored. Other record types (extended addresses
/// for images past 64 KB) are rejected, since the receiver treats the
/// records as a flat byte stream.
pub(crate) fn load_image(path: &Path) -> Result<HexImage> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut image = HexImage {
        records: Vec::new(),
        data_bytes: 0,
    };

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = line
            .strip_prefix(':')
            .with_context(|| format!("line {line_no}: missing ':' record mark"))?
            .as_bytes();

        if record == EOF_RECORD {
            return Ok(image);
        }

        let byte_count = hex::validate(record)
            .with_context(|| format!("line {line_no}: invalid record"))?;

        let record_type = hex::byte_from_hex(record[6], record[7]);
        match record_type {
            RECORD_TYPE_DATA => {
                image.data_bytes += u64::from(byte_count);
                image.records.push(record.to_vec());
            },
            other => bail!(
                "line {line_no}: unsupported record type {other:02X}; \
                 only flat images up to 64 KB can be transferred"
            ),
        }
    }

    bail!("{}: no end-of-file record", path.display())
}
