use thiserror::Error;

pub type Result<T, E = GalleryError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Failed to read/write storage file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize/deserialize user document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Media record is {size} bytes, the maximum for one slot is {max}")]
    RecordTooLarge { size: usize, max: usize },
    #[error("Slot {slot} holds a corrupt record: {reason}")]
    CorruptRecord { slot: u64, reason: String },
    #[error("Slot {slot} is out of range, the album has {count} slots")]
    SlotOutOfRange { slot: u64, count: u64 },
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("{operation} on {user}/{album} left the album index and the user document out of sync: {source}")]
    Diverged {
        operation: &'static str,
        user: String,
        album: String,
        #[source]
        source: Box<GalleryError>,
    },
}

impl GalleryError {
    pub(crate) fn corrupt(slot: u64, reason: impl ToString) -> Self {
        GalleryError::CorruptRecord { slot, reason: reason.to_string() }
    }
}
