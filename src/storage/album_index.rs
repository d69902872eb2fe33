use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, SeekFrom};
use crate::entities::{Entity, Media, Outcome};
use crate::error::{GalleryError, Result};
use crate::storage::codec::{self, SLOT_SIZE};
use crate::storage::{dir_exists, file_exists, StorageConfig};

const SLOT_BYTES: u64 = SLOT_SIZE as u64;

/// Array-of-slots file holding every media record of one album.
///
/// Every call opens the file, does its work and closes it again. Callers are
/// responsible for holding the album lock and for checking that the album
/// exists before calling anything other than `create_index`/`delete_index`.
#[derive(Debug, Clone)]
pub struct AlbumIndexStore {
    cfg: Arc<StorageConfig>,
}

impl AlbumIndexStore {
    pub fn new(cfg: Arc<StorageConfig>) -> Self {
        Self { cfg }
    }

    fn path(&self, username: &str, album_name: &str) -> PathBuf {
        self.cfg.album_path(username, album_name)
    }

    /// Creates an empty album file; `Done(false)` if it already existed.
    pub async fn create_index(&self, username: &str, album_name: &str) -> Result<Outcome<bool>> {
        if !dir_exists(&self.cfg.user_dir(username)).await? {
            return Ok(Outcome::NotFound(Entity::User));
        }
        let path = self.path(username, album_name);
        if file_exists(&path).await? {
            return Ok(Outcome::Done(false));
        }
        File::create(&path).await?;
        debug!("created album index {}", path.display());
        Ok(Outcome::Done(true))
    }

    pub async fn delete_index(&self, username: &str, album_name: &str) -> Result<bool> {
        let path = self.path(username, album_name);
        if !file_exists(&path).await? {
            return Ok(false);
        }
        tokio::fs::remove_file(&path).await?;
        debug!("deleted album index {}", path.display());
        Ok(true)
    }

    pub async fn exists(&self, username: &str, album_name: &str) -> Result<bool> {
        file_exists(&self.path(username, album_name)).await
    }

    /// Moves an album file to a new album name, replacing nothing.
    pub async fn rename_index(&self, username: &str, from: &str, to: &str) -> Result<()> {
        tokio::fs::rename(self.path(username, from), self.path(username, to)).await?;
        Ok(())
    }

    pub async fn slot_count(&self, username: &str, album_name: &str) -> Result<u64> {
        let metadata = tokio::fs::metadata(self.path(username, album_name)).await?;
        Ok(metadata.len() / SLOT_BYTES)
    }

    /// Appends one record and returns its slot index.
    pub async fn append(&self, username: &str, album_name: &str, media: &Media) -> Result<u64> {
        let slot = codec::encode(media)?;
        let path = self.path(username, album_name);
        let mut file = OpenOptions::new().write(true).open(&path).await?;
        let len = file.metadata().await?.len();
        let index = len / SLOT_BYTES;
        if len % SLOT_BYTES != 0 {
            warn!("album index {} has a partial trailing slot of {} bytes, overwriting it", path.display(), len % SLOT_BYTES);
        }
        file.seek(SeekFrom::Start(index * SLOT_BYTES)).await?;
        file.write_all(&slot[..]).await?;
        file.flush().await?;
        if len % SLOT_BYTES != 0 {
            file.set_len((index + 1) * SLOT_BYTES).await?;
        }
        debug!("appended media {} to {}/{} at slot {}", media.id, username, album_name, index);
        Ok(index)
    }

    /// First slot whose raw text contains `search_term`.
    pub async fn find_slot(&self, username: &str, album_name: &str, search_term: &str) -> Result<Option<(u64, Media)>> {
        let file = File::open(self.path(username, album_name)).await?;
        let count = file.metadata().await?.len() / SLOT_BYTES;
        let mut reader = BufReader::new(file);
        let mut buf = vec![0u8; SLOT_SIZE];
        for index in 0..count {
            reader.read_exact(&mut buf).await?;
            if String::from_utf8_lossy(&buf).contains(search_term) {
                let media = codec::decode(&buf, index)?;
                return Ok(Some((index, media)));
            }
        }
        Ok(None)
    }

    pub async fn read_slot(&self, username: &str, album_name: &str, index: u64) -> Result<Media> {
        let mut file = File::open(self.path(username, album_name)).await?;
        let count = file.metadata().await?.len() / SLOT_BYTES;
        if index >= count {
            return Err(GalleryError::SlotOutOfRange { slot: index, count });
        }
        let mut buf = vec![0u8; SLOT_SIZE];
        file.seek(SeekFrom::Start(index * SLOT_BYTES)).await?;
        file.read_exact(&mut buf).await?;
        codec::decode(&buf, index)
    }

    /// Overwrites an existing slot in place.
    pub async fn write_slot(&self, username: &str, album_name: &str, index: u64, media: &Media) -> Result<()> {
        let slot = codec::encode(media)?;
        let mut file = OpenOptions::new().write(true).open(self.path(username, album_name)).await?;
        let count = file.metadata().await?.len() / SLOT_BYTES;
        if index >= count {
            return Err(GalleryError::SlotOutOfRange { slot: index, count });
        }
        file.seek(SeekFrom::Start(index * SLOT_BYTES)).await?;
        file.write_all(&slot[..]).await?;
        file.flush().await?;
        debug!("rewrote slot {} of {}/{}", index, username, album_name);
        Ok(())
    }

    /// Removes a slot by shifting every later slot up by one, then truncating.
    ///
    /// The whole tail is held in memory, so the cost grows with the distance
    /// from `index` to the end of the album.
    pub async fn delete_slot(&self, username: &str, album_name: &str, index: u64) -> Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(self.path(username, album_name)).await?;
        let count = file.metadata().await?.len() / SLOT_BYTES;
        if index >= count {
            return Err(GalleryError::SlotOutOfRange { slot: index, count });
        }
        let tail_start = (index + 1) * SLOT_BYTES;
        let mut tail = vec![0u8; ((count - index - 1) * SLOT_BYTES) as usize];
        file.seek(SeekFrom::Start(tail_start)).await?;
        file.read_exact(&mut tail).await?;
        file.seek(SeekFrom::Start(index * SLOT_BYTES)).await?;
        file.write_all(&tail).await?;
        file.flush().await?;
        file.set_len((count - 1) * SLOT_BYTES).await?;
        debug!("deleted slot {} of {}/{}, {} slots shifted", index, username, album_name, count - index - 1);
        Ok(())
    }

    /// Records in slots `[from, from + count)`, clipped at the end of the album.
    pub async fn list_range(&self, username: &str, album_name: &str, from: u64, count: u64) -> Result<Vec<Media>> {
        let mut file = File::open(self.path(username, album_name)).await?;
        let total = file.metadata().await?.len() / SLOT_BYTES;
        let end = from.saturating_add(count).min(total);
        if from >= end {
            return Ok(vec![]);
        }
        let mut buf = vec![0u8; ((end - from) * SLOT_BYTES) as usize];
        file.seek(SeekFrom::Start(from * SLOT_BYTES)).await?;
        file.read_exact(&mut buf).await?;
        buf.chunks_exact(SLOT_SIZE)
            .zip(from..end)
            .map(|(block, index)| codec::decode(block, index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;
    use crate::entities::NewMedia;
    use super::*;

    async fn setup() -> (TempDir, AlbumIndexStore) {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir(dir.path().join("alice")).await.unwrap();
        let store = AlbumIndexStore::new(Arc::new(StorageConfig::new(dir.path())));
        assert_eq!(store.create_index("alice", "trip").await.unwrap(), Outcome::Done(true));
        (dir, store)
    }

    fn media(name: &str, minutes: i64) -> Media {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        Media::new(NewMedia { name: name.to_string(), size: Some(10), created: Some(created.fixed_offset()) })
    }

    async fn fill(store: &AlbumIndexStore, n: usize) -> Vec<Media> {
        let mut all = vec![];
        for i in 0..n {
            let m = media(&format!("img{i}.jpg"), i as i64);
            store.append("alice", "trip", &m).await.unwrap();
            all.push(m);
        }
        all
    }

    #[tokio::test]
    async fn test_create_index() {
        let (_dir, store) = setup().await;
        assert_eq!(store.create_index("alice", "trip").await.unwrap(), Outcome::Done(false));
        assert_eq!(store.create_index("bob", "trip").await.unwrap(), Outcome::NotFound(Entity::User));
        assert_eq!(store.slot_count("alice", "trip").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_index() {
        let (_dir, store) = setup().await;
        assert!(store.delete_index("alice", "trip").await.unwrap());
        assert!(!store.delete_index("alice", "trip").await.unwrap());
        assert!(!store.exists("alice", "trip").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let (_dir, store) = setup().await;
        let all = fill(&store, 3).await;
        let count = store.slot_count("alice", "trip").await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(store.read_slot("alice", "trip", count - 1).await.unwrap(), all[2]);
        assert!(matches!(
            store.read_slot("alice", "trip", 3).await,
            Err(GalleryError::SlotOutOfRange { slot: 3, count: 3 })
        ));
    }

    #[tokio::test]
    async fn test_find_slot() {
        let (_dir, store) = setup().await;
        let all = fill(&store, 4).await;
        let (index, found) = store.find_slot("alice", "trip", "img2.jpg").await.unwrap().unwrap();
        assert_eq!(index, 2);
        assert_eq!(found, all[2]);
        let (index, _) = store.find_slot("alice", "trip", &all[3].id).await.unwrap().unwrap();
        assert_eq!(index, 3);
        assert!(store.find_slot("alice", "trip", "missing.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_slot_keeps_count() {
        let (_dir, store) = setup().await;
        let all = fill(&store, 3).await;
        let mut updated = all[1].clone();
        updated.likes = 5;
        store.write_slot("alice", "trip", 1, &updated).await.unwrap();
        assert_eq!(store.slot_count("alice", "trip").await.unwrap(), 3);
        assert_eq!(store.read_slot("alice", "trip", 1).await.unwrap().likes, 5);
        assert!(store.write_slot("alice", "trip", 3, &updated).await.is_err());
        assert_eq!(store.slot_count("alice", "trip").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_too_large_is_not_written() {
        let (_dir, store) = setup().await;
        fill(&store, 1).await;
        let huge = media(&"x".repeat(SLOT_SIZE), 0);
        assert!(matches!(
            store.append("alice", "trip", &huge).await,
            Err(GalleryError::RecordTooLarge { .. })
        ));
        assert!(store.write_slot("alice", "trip", 0, &huge).await.is_err());
        assert_eq!(store.slot_count("alice", "trip").await.unwrap(), 1);
        assert_eq!(store.read_slot("alice", "trip", 0).await.unwrap().name, "img0.jpg");
    }

    #[tokio::test]
    async fn test_delete_slot_preserves_order() {
        for victim in [0usize, 2, 4] {
            let (_dir, store) = setup().await;
            let mut all = fill(&store, 5).await;
            store.delete_slot("alice", "trip", victim as u64).await.unwrap();
            all.remove(victim);
            assert_eq!(store.list_range("alice", "trip", 0, 4).await.unwrap(), all);
            assert_eq!(store.slot_count("alice", "trip").await.unwrap(), 4);
        }
    }

    #[tokio::test]
    async fn test_list_range_clips() {
        let (_dir, store) = setup().await;
        let all = fill(&store, 5).await;
        assert_eq!(store.list_range("alice", "trip", 3, 10).await.unwrap(), all[3..].to_vec());
        assert!(store.list_range("alice", "trip", 5, 10).await.unwrap().is_empty());
        assert!(store.list_range("alice", "trip", 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_range_surfaces_corruption() {
        let (dir, store) = setup().await;
        fill(&store, 2).await;
        let path = dir.path().join("alice").join("trip.dat");
        let mut bytes = tokio::fs::read(&path).await.unwrap();
        bytes[SLOT_SIZE..2 * SLOT_SIZE].fill(0);
        tokio::fs::write(&path, bytes).await.unwrap();
        assert!(matches!(
            store.list_range("alice", "trip", 0, 2).await,
            Err(GalleryError::CorruptRecord { slot: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_append_realigns_partial_tail() {
        let (dir, store) = setup().await;
        fill(&store, 1).await;
        let path = dir.path().join("alice").join("trip.dat");
        let mut bytes = tokio::fs::read(&path).await.unwrap();
        bytes.extend_from_slice(b"torn");
        tokio::fs::write(&path, bytes).await.unwrap();

        let m = media("late.jpg", 9);
        assert_eq!(store.append("alice", "trip", &m).await.unwrap(), 1);
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 2 * SLOT_BYTES);
        assert_eq!(store.read_slot("alice", "trip", 1).await.unwrap(), m);
    }
}
