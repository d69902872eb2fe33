//! On-disk layout of a gallery.
//!
//! ```text
//! {root}/{username}/                      user directory, marks the user as existing
//! {root}/{username}/{username}_meta.dat   user document (JSON)
//! {root}/{username}/{album}.dat           album index (fixed-size slots)
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use crate::error::{GalleryError, Result};

pub mod album_index;
pub mod codec;
pub mod user_meta;

pub const FILE_EXT: &str = "dat";
const META_SUFFIX: &str = "_meta";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn user_dir(&self, username: &str) -> PathBuf {
        self.root.join(username)
    }

    pub fn user_meta_path(&self, username: &str) -> PathBuf {
        self.user_dir(username).join(format!("{username}{META_SUFFIX}.{FILE_EXT}"))
    }

    pub fn album_path(&self, username: &str, album_name: &str) -> PathBuf {
        self.user_dir(username).join(format!("{album_name}.{FILE_EXT}"))
    }
}

/// Rejects names that would escape the storage root or collide with the layout.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(GalleryError::InvalidName { name: name.to_string(), reason }),
        None => Ok(()),
    }
}

pub fn validate_album_name(username: &str, album_name: &str) -> Result<()> {
    validate_name(album_name)?;
    if album_name == format!("{username}{META_SUFFIX}") {
        return Err(GalleryError::InvalidName {
            name: album_name.to_string(),
            reason: "name is reserved for the user document",
        });
    }
    Ok(())
}

pub(crate) async fn dir_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn file_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let cfg = StorageConfig::new("/srv/gallery");
        assert_eq!(cfg.user_meta_path("alice"), PathBuf::from("/srv/gallery/alice/alice_meta.dat"));
        assert_eq!(cfg.album_path("alice", "trip"), PathBuf::from("/srv/gallery/alice/trip.dat"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("trip 2024").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_album_name("alice", "alice_meta").is_err());
        assert!(validate_album_name("alice", "bob_meta").is_ok());
    }
}
