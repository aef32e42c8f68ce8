//! Image storage layout and the sequential storage writer.
//!
//! The receiver owns one fixed 32 KB region of an external erasable memory
//! for the incoming image:
//!
//! ```text
//! offset 0..7    "FLXIMG:"  marker
//! offset 7..9    image byte count, big-endian u16 (written only at commit)
//! offset 9       ':' sentinel
//! offset 10..    raw firmware bytes
//! ```
//!
//! The length field is the commit marker: anyone reading the region before
//! a successful EOF sees a stale or erased count, never a complete image.

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::error::{Error, Result};

/// Size of the image region in bytes.
pub const REGION_SIZE: u32 = 32 * 1024;

/// Region id of the image region.
pub const IMAGE_REGION: u32 = 0;

/// Marker written at the start of the region.
pub const IMAGE_MARKER: &[u8] = b"FLXIMG:";

/// Offset of the big-endian image byte count.
pub const LENGTH_OFFSET: u32 = 7;

/// Offset of the `:` sentinel closing the header.
pub const SENTINEL_OFFSET: u32 = 9;

/// Sentinel byte closing the header.
pub const SENTINEL: u8 = b':';

/// Offset of the first image byte.
pub const DATA_OFFSET: u32 = 10;

/// Maximum image payload: region size minus 1 KB reserved for header/slack.
pub const MAX_IMAGE_BYTES: u32 = 31744;

/// Erasable storage device contract.
///
/// Writes may only target offsets erased (all-ones) since the last erase of
/// their region; every call blocks until the device reports ready.
pub trait FlashStorage {
    /// Erase one region back to all-ones.
    fn erase_region(&mut self, region: u32) -> Result<()>;

    /// Write a single byte.
    fn write_byte(&mut self, offset: u32, value: u8) -> Result<()>;

    /// Write a run of bytes starting at `offset`.
    fn write_bytes(&mut self, offset: u32, data: &[u8]) -> Result<()>;
}

/// Sequential writer appending image bytes into the region.
///
/// Created once per session: erases the region, lays down the header, then
/// appends chunk payloads in order. The length field is only written by
/// [`commit`](Self::commit).
pub struct ImageWriter<'a, S: FlashStorage> {
    storage: &'a mut S,
    offset: u32,
}

impl<'a, S: FlashStorage> ImageWriter<'a, S> {
    /// Erase the image region and write the header marker and sentinel.
    pub fn begin(storage: &'a mut S) -> Result<Self> {
        storage.erase_region(IMAGE_REGION)?;
        storage.write_bytes(0, IMAGE_MARKER)?;
        storage.write_byte(SENTINEL_OFFSET, SENTINEL)?;
        Ok(Self {
            storage,
            offset: DATA_OFFSET,
        })
    }

    /// Append chunk payload bytes at the running offset.
    ///
    /// Fails with [`Error::Overflow`] if the write would run past the end
    /// of the region.
    #[allow(clippy::cast_possible_truncation)] // payload lengths are far below u32::MAX
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let end = self.offset + data.len() as u32;
        if end > REGION_SIZE {
            return Err(Error::Overflow {
                written: end - DATA_OFFSET,
                limit: REGION_SIZE - DATA_OFFSET,
            });
        }
        self.storage.write_bytes(self.offset, data)?;
        self.offset = end;
        Ok(())
    }

    /// Image bytes appended so far.
    pub fn image_len(&self) -> u32 {
        self.offset - DATA_OFFSET
    }

    /// Write the final image byte count into the header, committing the
    /// image as complete. Returns the committed count.
    #[allow(clippy::cast_possible_truncation)] // image_len is bounded by REGION_SIZE
    pub fn commit(self) -> Result<u16> {
        let image_bytes = self.image_len() as u16;
        let mut count = [0u8; 2];
        BigEndian::write_u16(&mut count, image_bytes);
        self.storage.write_bytes(LENGTH_OFFSET, &count)?;
        self.storage.write_byte(SENTINEL_OFFSET, SENTINEL)?;
        debug!("committed image of {image_bytes} bytes");
        Ok(image_bytes)
    }
}
