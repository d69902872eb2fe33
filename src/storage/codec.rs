//! Fixed-size slot encoding of one media record.
//!
//! A slot is `SLOT_SIZE` bytes: the compact JSON text of the record, the
//! `END_MARKER`, zero padding, and a trailing newline in the last byte so
//! that an album file can still be inspected with line-based tools.

use crate::entities::Media;
use crate::error::{GalleryError, Result};

pub const SLOT_SIZE: usize = 2048;
pub const END_MARKER: &str = "<END>";
/// Largest record text + marker that fits in a slot.
pub const MAX_PAYLOAD: usize = SLOT_SIZE - 2;

pub type Slot = [u8; SLOT_SIZE];

pub fn encode(media: &Media) -> Result<Box<Slot>> {
    let mut payload = serde_json::to_vec(media)?;
    payload.extend_from_slice(END_MARKER.as_bytes());
    if payload.len() > MAX_PAYLOAD {
        return Err(GalleryError::RecordTooLarge { size: payload.len(), max: MAX_PAYLOAD });
    }
    let mut slot = Box::new([0u8; SLOT_SIZE]);
    slot[..payload.len()].copy_from_slice(&payload);
    slot[SLOT_SIZE - 1] = b'\n';
    Ok(slot)
}

/// Decodes the record stored in `block`; `slot` is only used for error reporting.
pub fn decode(block: &[u8], slot: u64) -> Result<Media> {
    let end = find_marker(block).ok_or_else(|| GalleryError::corrupt(slot, "end marker not found"))?;
    let text = std::str::from_utf8(&block[..end]).map_err(|e| GalleryError::corrupt(slot, e))?;
    serde_json::from_str(text).map_err(|e| GalleryError::corrupt(slot, e))
}

/// Last marker in the block; padding never contains one, while names and tags may.
fn find_marker(block: &[u8]) -> Option<usize> {
    let marker = END_MARKER.as_bytes();
    block.windows(marker.len()).rposition(|w| w == marker)
}
