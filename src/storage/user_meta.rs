use std::sync::Arc;
use chrono::Utc;
use log::{debug, info, warn};
use crate::entities::{Entity, Media, Outcome, SavedSearchMeta, SearchParams, UserAlbumMeta, UserAlbumTagMeta, UserMeta};
use crate::error::Result;
use crate::locks::LockRegistry;
use crate::storage::{dir_exists, file_exists, StorageConfig};

/// Whole-document JSON store for per-user profile, album aggregates and saved searches.
///
/// Every mutation re-reads and re-writes the full document under the user
/// document lock.
#[derive(Debug, Clone)]
pub struct UserMetaStore {
    cfg: Arc<StorageConfig>,
    locks: Arc<LockRegistry>,
}

impl UserMetaStore {
    pub fn new(cfg: Arc<StorageConfig>, locks: Arc<LockRegistry>) -> Self {
        Self { cfg, locks }
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<bool> {
        let _guard = self.locks.write_user(username).await;
        let user_dir = self.cfg.user_dir(username);
        if dir_exists(&user_dir).await? {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&user_dir).await?;
        let user = UserMeta {
            username: username.to_string(),
            password: password.to_string(),
            created: Utc::now(),
            album_meta: vec![],
            saved_searches: vec![],
        };
        self.write(&user).await?;
        info!("created user {}", username);
        Ok(true)
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<UserMeta>> {
        let _guard = self.locks.read_user(username).await;
        self.read(username).await
    }

    /// Removes the user directory with every album in it.
    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        let _guard = self.locks.write_user(username).await;
        let user_dir = self.cfg.user_dir(username);
        if !dir_exists(&user_dir).await? {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&user_dir).await?;
        info!("deleted user {}", username);
        Ok(true)
    }

    pub async fn init_album_meta(&self, username: &str, album_name: &str) -> Result<Outcome<()>> {
        self.update(username, |user| {
            if user.album(album_name).is_some() {
                return Outcome::Conflict(Entity::Album);
            }
            user.album_meta.push(UserAlbumMeta::new(album_name));
            Outcome::Done(())
        }).await
    }

    /// Drops the album entry together with whatever aggregates it held.
    pub async fn delete_album_meta(&self, username: &str, album_name: &str) -> Result<bool> {
        let outcome = self.update(username, |user| {
            match user.album_meta.iter().position(|x| x.album_name == album_name) {
                Some(pos) => Outcome::Done(user.album_meta.remove(pos)),
                None => Outcome::NotFound(Entity::Album),
            }
        }).await?;
        Ok(outcome.is_done())
    }

    /// Increments the tag counter of an album and returns the new count.
    pub async fn add_tag_meta(&self, username: &str, album_name: &str, tag_name: &str) -> Result<Outcome<u64>> {
        self.update_album(username, album_name, |album| {
            match album.tags.iter_mut().find(|x| x.tag_name == tag_name) {
                Some(tag_meta) => {
                    tag_meta.count += 1;
                    Outcome::Done(tag_meta.count)
                }
                None => {
                    album.tags.push(UserAlbumTagMeta { tag_name: tag_name.to_string(), count: 1 });
                    Outcome::Done(1)
                }
            }
        }).await
    }

    /// Decrements the tag counter of an album, dropping it at zero.
    pub async fn remove_tag_meta(&self, username: &str, album_name: &str, tag_name: &str) -> Result<Outcome<u64>> {
        self.update_album(username, album_name, |album| {
            match decrement_tag(album, tag_name) {
                Some(count) => Outcome::Done(count),
                None => Outcome::NotFound(Entity::Tag),
            }
        }).await
    }

    /// Takes a deleted record out of the album aggregates.
    pub async fn remove_media_meta(&self, username: &str, album_name: &str, media: &Media) -> Result<Outcome<()>> {
        self.update_album(username, album_name, |album| {
            for tag in &media.tags {
                if decrement_tag(album, &tag.name).is_none() {
                    warn!("tag counter '{}' missing in {}/{} while deleting media {}", tag.name, username, album_name, media.id);
                }
            }
            if media.likes > 0 {
                album.total_likes = album.total_likes.saturating_sub(media.likes);
                album.total_unique_likes = album.total_unique_likes.saturating_sub(1);
            }
            Outcome::Done(())
        }).await
    }

    pub async fn increase_like_count(&self, username: &str, album_name: &str, is_first_like: bool) -> Result<Outcome<()>> {
        self.update_album(username, album_name, |album| {
            album.total_likes += 1;
            if is_first_like {
                album.total_unique_likes += 1;
            }
            Outcome::Done(())
        }).await
    }

    /// Inserts or replaces the saved search with the same name.
    pub async fn add_saved_search(&self, username: &str, search_name: &str, parameters: SearchParams) -> Result<Outcome<SavedSearchMeta>> {
        self.update(username, |user| {
            user.saved_searches.retain(|x| x.search_name != search_name);
            let search = SavedSearchMeta {
                search_name: search_name.to_string(),
                parameters,
                last_updated: Utc::now(),
            };
            user.saved_searches.push(search.clone());
            Outcome::Done(search)
        }).await
    }

    pub async fn delete_saved_search(&self, username: &str, search_name: &str) -> Result<Outcome<()>> {
        self.update(username, |user| {
            let before = user.saved_searches.len();
            user.saved_searches.retain(|x| x.search_name != search_name);
            if user.saved_searches.len() == before {
                return Outcome::NotFound(Entity::SavedSearch);
            }
            Outcome::Done(())
        }).await
    }

    /// Replaces the entries of two albums with one entry for `target`.
    ///
    /// Tag counters are summed by name and like aggregates field by field.
    /// The merged entry takes the list position of `source1`.
    pub async fn merge_album_meta(&self, username: &str, source1: &str, source2: &str, target: &str) -> Result<Outcome<UserAlbumMeta>> {
        self.update(username, |user| {
            let (Some(first), Some(second)) = (user.album(source1), user.album(source2)) else {
                return Outcome::NotFound(Entity::Album);
            };
            let mut merged = UserAlbumMeta::new(target);
            merged.tags = first.tags.clone();
            for tag in &second.tags {
                match merged.tags.iter_mut().find(|x| x.tag_name == tag.tag_name) {
                    Some(existing) => existing.count += tag.count,
                    None => merged.tags.push(tag.clone()),
                }
            }
            merged.total_likes = first.total_likes + second.total_likes;
            merged.total_unique_likes = first.total_unique_likes + second.total_unique_likes;

            let pos = user.album_meta.iter().position(|x| x.album_name == source1).unwrap_or(0);
            user.album_meta.insert(pos, merged.clone());
            let mut kept_target = false;
            user.album_meta.retain(|x| {
                if x.album_name == target && !kept_target {
                    kept_target = true;
                    return true;
                }
                x.album_name != source1 && x.album_name != source2 && x.album_name != target
            });
            Outcome::Done(merged)
        }).await
    }

    async fn update<T>(&self, username: &str, f: impl FnOnce(&mut UserMeta) -> Outcome<T>) -> Result<Outcome<T>> {
        let _guard = self.locks.write_user(username).await;
        let Some(mut user) = self.read(username).await? else {
            return Ok(Outcome::NotFound(Entity::User));
        };
        let outcome = f(&mut user);
        if outcome.is_done() {
            self.write(&user).await?;
        }
        Ok(outcome)
    }

    async fn update_album<T>(&self, username: &str, album_name: &str, f: impl FnOnce(&mut UserAlbumMeta) -> Outcome<T>) -> Result<Outcome<T>> {
        self.update(username, |user| match user.album_mut(album_name) {
            Some(album) => f(album),
            None => Outcome::NotFound(Entity::Album),
        }).await
    }

    async fn read(&self, username: &str) -> Result<Option<UserMeta>> {
        let path = self.cfg.user_meta_path(username);
        if !file_exists(&path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let user = serde_json::from_str(&content)?;
        Ok(Some(user))
    }

    async fn write(&self, user: &UserMeta) -> Result<()> {
        let path = self.cfg.user_meta_path(&user.username);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string(user)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        debug!("wrote user document {}", path.display());
        Ok(())
    }
}

fn decrement_tag(album: &mut UserAlbumMeta, tag_name: &str) -> Option<u64> {
    let pos = album.tags.iter().position(|x| x.tag_name == tag_name)?;
    if album.tags[pos].count <= 1 {
        album.tags.remove(pos);
        return Some(0);
    }
    album.tags[pos].count -= 1;
    Some(album.tags[pos].count)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use crate::entities::{NewMedia, Tag};
    use super::*;

    async fn setup() -> (TempDir, UserMetaStore) {
        let dir = TempDir::new().unwrap();
        let store = UserMetaStore::new(Arc::new(StorageConfig::new(dir.path())), Arc::new(LockRegistry::new()));
        assert!(store.create_user("alice", "hunter2").await.unwrap());
        assert_eq!(store.init_album_meta("alice", "trip").await.unwrap(), Outcome::Done(()));
        (dir, store)
    }

    async fn album(store: &UserMetaStore, name: &str) -> UserAlbumMeta {
        store.get_user("alice").await.unwrap().unwrap().album(name).unwrap().clone()
    }

    #[tokio::test]
    async fn test_create_user() {
        let (dir, store) = setup().await;
        assert!(!store.create_user("alice", "other").await.unwrap());
        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.password, "hunter2");
        assert!(dir.path().join("alice").join("alice_meta.dat").is_file());
        assert!(store.get_user("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_field_names() {
        let (dir, _store) = setup().await;
        let json = std::fs::read_to_string(dir.path().join("alice").join("alice_meta.dat")).unwrap();
        assert!(json.contains(r#""Username":"alice""#));
        assert!(json.contains(r#""AlbumMeta":[{"AlbumName":"trip""#));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (dir, store) = setup().await;
        assert!(store.delete_user("alice").await.unwrap());
        assert!(!dir.path().join("alice").exists());
        assert!(!store.delete_user("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_album_meta() {
        let (_dir, store) = setup().await;
        assert_eq!(store.init_album_meta("alice", "trip").await.unwrap(), Outcome::Conflict(Entity::Album));
        assert_eq!(store.init_album_meta("bob", "trip").await.unwrap(), Outcome::NotFound(Entity::User));
        assert!(store.delete_album_meta("alice", "trip").await.unwrap());
        assert!(!store.delete_album_meta("alice", "trip").await.unwrap());
    }

    #[tokio::test]
    async fn test_tag_counters() {
        let (_dir, store) = setup().await;
        assert_eq!(store.add_tag_meta("alice", "trip", "sunset").await.unwrap(), Outcome::Done(1));
        assert_eq!(store.add_tag_meta("alice", "trip", "sunset").await.unwrap(), Outcome::Done(2));
        assert_eq!(store.add_tag_meta("alice", "trip", "beach").await.unwrap(), Outcome::Done(1));
        assert_eq!(store.remove_tag_meta("alice", "trip", "sunset").await.unwrap(), Outcome::Done(1));
        assert_eq!(store.remove_tag_meta("alice", "trip", "beach").await.unwrap(), Outcome::Done(0));
        assert_eq!(store.remove_tag_meta("alice", "trip", "beach").await.unwrap(), Outcome::NotFound(Entity::Tag));
        assert_eq!(store.add_tag_meta("alice", "nope", "x").await.unwrap(), Outcome::NotFound(Entity::Album));

        let trip = album(&store, "trip").await;
        assert_eq!(trip.tags, vec![UserAlbumTagMeta { tag_name: "sunset".to_string(), count: 1 }]);
    }

    #[tokio::test]
    async fn test_likes() {
        let (_dir, store) = setup().await;
        store.increase_like_count("alice", "trip", true).await.unwrap();
        store.increase_like_count("alice", "trip", false).await.unwrap();
        store.increase_like_count("alice", "trip", true).await.unwrap();
        let trip = album(&store, "trip").await;
        assert_eq!((trip.total_likes, trip.total_unique_likes), (3, 2));
    }

    #[tokio::test]
    async fn test_remove_media_meta() {
        let (_dir, store) = setup().await;
        store.add_tag_meta("alice", "trip", "sunset").await.unwrap();
        store.add_tag_meta("alice", "trip", "sunset").await.unwrap();
        store.add_tag_meta("alice", "trip", "beach").await.unwrap();
        store.increase_like_count("alice", "trip", true).await.unwrap();
        store.increase_like_count("alice", "trip", false).await.unwrap();

        let mut media = Media::new(NewMedia { name: "a.jpg".to_string(), ..Default::default() });
        media.tags = vec![Tag::new("sunset"), Tag::new("beach")];
        media.likes = 2;
        store.remove_media_meta("alice", "trip", &media).await.unwrap();

        let trip = album(&store, "trip").await;
        assert_eq!(trip.tag_count("sunset"), 1);
        assert_eq!(trip.tag_count("beach"), 0);
        assert!(trip.tags.iter().all(|x| x.tag_name != "beach"));
        assert_eq!((trip.total_likes, trip.total_unique_likes), (0, 0));
    }

    #[tokio::test]
    async fn test_saved_searches() {
        let (_dir, store) = setup().await;
        let params = SearchParams { tags: Some("sunset".to_string()), ..Default::default() };
        store.add_saved_search("alice", "sunsets", params.clone()).await.unwrap();
        let replaced = SearchParams { tags: Some("beach".to_string()), ..Default::default() };
        store.add_saved_search("alice", "sunsets", replaced.clone()).await.unwrap();
        store.add_saved_search("alice", "all", SearchParams::default()).await.unwrap();

        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.saved_searches.len(), 2);
        let sunsets = user.saved_searches.iter().find(|x| x.search_name == "sunsets").unwrap();
        assert_eq!(sunsets.parameters, replaced);

        assert_eq!(store.delete_saved_search("alice", "all").await.unwrap(), Outcome::Done(()));
        assert_eq!(store.delete_saved_search("alice", "all").await.unwrap(), Outcome::NotFound(Entity::SavedSearch));
    }

    #[tokio::test]
    async fn test_merge_album_meta() {
        let (_dir, store) = setup().await;
        store.init_album_meta("alice", "first").await.unwrap();
        store.init_album_meta("alice", "trip2").await.unwrap();
        store.add_tag_meta("alice", "trip", "sunset").await.unwrap();
        store.add_tag_meta("alice", "trip", "beach").await.unwrap();
        store.add_tag_meta("alice", "trip2", "sunset").await.unwrap();
        store.add_tag_meta("alice", "trip2", "city").await.unwrap();
        store.increase_like_count("alice", "trip", true).await.unwrap();
        store.increase_like_count("alice", "trip2", true).await.unwrap();
        store.increase_like_count("alice", "trip2", false).await.unwrap();

        let merged = store.merge_album_meta("alice", "trip", "trip2", "trips").await.unwrap().done().unwrap();
        assert_eq!(merged.tag_count("sunset"), 2);
        assert_eq!(merged.tag_count("beach"), 1);
        assert_eq!(merged.tag_count("city"), 1);
        assert_eq!((merged.total_likes, merged.total_unique_likes), (3, 2));

        let user = store.get_user("alice").await.unwrap().unwrap();
        let names: Vec<&str> = user.album_meta.iter().map(|x| x.album_name.as_str()).collect();
        assert_eq!(names, vec!["trips", "first"]);
    }

    #[tokio::test]
    async fn test_merge_into_first_source() {
        let (_dir, store) = setup().await;
        store.init_album_meta("alice", "trip2").await.unwrap();
        store.add_tag_meta("alice", "trip", "sunset").await.unwrap();
        store.add_tag_meta("alice", "trip2", "sunset").await.unwrap();
        store.merge_album_meta("alice", "trip", "trip2", "trip").await.unwrap();

        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.album_meta.len(), 1);
        assert_eq!(user.album_meta[0].tag_count("sunset"), 2);
    }
}
