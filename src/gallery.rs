use std::future::Future;
use std::sync::Arc;
use log::{error, info, warn};
use crate::collation::{NameCollator, NaturalCollator};
use crate::entities::*;
use crate::error::{GalleryError, Result};
use crate::locks::LockRegistry;
use crate::storage::album_index::AlbumIndexStore;
use crate::storage::user_meta::UserMetaStore;
use crate::storage::{validate_album_name, validate_name, StorageConfig};

/// Storage engine for every user's albums and aggregates under one root.
///
/// Operations that touch a record and an aggregate run as two sequential
/// steps against two files. There is no transaction: if the second step
/// fails the first one stays applied, the gap is logged and reported as
/// [`GalleryError::Diverged`].
pub struct Gallery {
    pub(crate) cfg: Arc<StorageConfig>,
    pub(crate) locks: Arc<LockRegistry>,
    pub(crate) index: AlbumIndexStore,
    pub(crate) meta: UserMetaStore,
    pub(crate) collator: Arc<dyn NameCollator>,
}

impl Gallery {
    pub fn new(cfg: StorageConfig) -> Self {
        Self::with_collator(cfg, Arc::new(NaturalCollator))
    }

    pub fn with_collator(cfg: StorageConfig, collator: Arc<dyn NameCollator>) -> Self {
        let cfg = Arc::new(cfg);
        let locks = Arc::new(LockRegistry::new());
        Self {
            index: AlbumIndexStore::new(cfg.clone()),
            meta: UserMetaStore::new(cfg.clone(), locks.clone()),
            cfg,
            locks,
            collator,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.cfg
    }

    // users

    pub async fn create_user(&self, username: &str, password: &str) -> Result<Outcome<()>> {
        validate_name(username)?;
        if !self.meta.create_user(username, password).await? {
            return Ok(Outcome::Conflict(Entity::User));
        }
        Ok(Outcome::Done(()))
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<UserMeta>> {
        validate_name(username)?;
        self.meta.get_user(username).await
    }

    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        validate_name(username)?;
        let album_names: Vec<String> = match self.meta.get_user(username).await? {
            Some(user) => user.album_meta.into_iter().map(|x| x.album_name).collect(),
            None => vec![],
        };
        let album_refs: Vec<&str> = album_names.iter().map(String::as_str).collect();
        let _guards = self.locks.write_albums(username, &album_refs).await;
        self.meta.delete_user(username).await
    }

    // albums

    pub async fn create_album(&self, username: &str, album_name: &str) -> Result<Outcome<()>> {
        validate_name(username)?;
        validate_album_name(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        let Some(user) = self.meta.get_user(username).await? else {
            return Ok(Outcome::NotFound(Entity::User));
        };
        if user.album(album_name).is_some() || self.index.exists(username, album_name).await? {
            return Ok(Outcome::Conflict(Entity::Album));
        }
        if let Outcome::NotFound(missing) = self.index.create_index(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        self.second_step("create album", username, album_name, self.meta.init_album_meta(username, album_name)).await?;
        info!("created album {}/{}", username, album_name);
        Ok(Outcome::Done(()))
    }

    /// Removes the album file and its metadata entry. The result only says
    /// whether the file existed; tag and like aggregates are dropped with the entry.
    pub async fn delete_album(&self, username: &str, album_name: &str) -> Result<bool> {
        validate_name(username)?;
        validate_album_name(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        let deleted = self.index.delete_index(username, album_name).await?;
        if let Err(e) = self.meta.delete_album_meta(username, album_name).await {
            if deleted {
                return Err(self.diverged("delete album", username, album_name, e));
            }
            return Err(e);
        }
        if deleted {
            info!("deleted album {}/{}", username, album_name);
        }
        Ok(deleted)
    }

    /// Albums of a user in metadata order with their live item counts.
    pub async fn list_albums(&self, username: &str) -> Result<Option<Vec<AlbumSummary>>> {
        validate_name(username)?;
        let Some(user) = self.meta.get_user(username).await? else {
            return Ok(None);
        };
        let mut summaries = Vec::with_capacity(user.album_meta.len());
        for album in user.album_meta {
            let _guard = self.locks.read_album(username, &album.album_name).await;
            let item_count = if self.index.exists(username, &album.album_name).await? {
                self.index.slot_count(username, &album.album_name).await?
            } else {
                warn!("album {}/{} has metadata but no index file", username, album.album_name);
                0
            };
            summaries.push(AlbumSummary {
                album_name: album.album_name,
                created: album.created,
                item_count,
                tags: album.tags,
                total_likes: album.total_likes,
                total_unique_likes: album.total_unique_likes,
            });
        }
        Ok(Some(summaries))
    }

    pub async fn list_album_items(&self, username: &str, album_name: &str, offset: u64, limit: u64) -> Result<Outcome<Vec<Media>>> {
        self.validate(username, album_name)?;
        let _guard = self.locks.read_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        let media_vec = self.index.list_range(username, album_name, offset, limit).await?;
        Ok(Outcome::Done(media_vec))
    }

    // media

    pub async fn add_media(&self, username: &str, album_name: &str, req: NewMedia) -> Result<Outcome<Media>> {
        self.validate(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        let media = Media::new(req);
        self.index.append(username, album_name, &media).await?;
        Ok(Outcome::Done(media))
    }

    /// First media whose stored record contains `locator` (typically its name or id).
    pub async fn get_media(&self, username: &str, album_name: &str, locator: &str) -> Result<Outcome<Media>> {
        self.validate(username, album_name)?;
        let _guard = self.locks.read_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        match self.index.find_slot(username, album_name, locator).await? {
            Some((_, media)) => Ok(Outcome::Done(media)),
            None => Ok(Outcome::NotFound(Entity::Media)),
        }
    }

    pub async fn delete_media(&self, username: &str, album_name: &str, locator: &str) -> Result<Outcome<Media>> {
        self.validate(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        let Some((slot, media)) = self.index.find_slot(username, album_name, locator).await? else {
            return Ok(Outcome::NotFound(Entity::Media));
        };
        self.index.delete_slot(username, album_name, slot).await?;
        self.second_step("delete media", username, album_name, self.meta.remove_media_meta(username, album_name, &media)).await?;
        Ok(Outcome::Done(media))
    }

    pub async fn add_tag(&self, username: &str, album_name: &str, locator: &str, tag_name: &str) -> Result<Outcome<Media>> {
        self.validate(username, album_name)?;
        validate_tag_name(tag_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        let Some((slot, mut media)) = self.index.find_slot(username, album_name, locator).await? else {
            return Ok(Outcome::NotFound(Entity::Media));
        };
        if media.has_tag(tag_name) {
            return Ok(Outcome::Conflict(Entity::Tag));
        }
        media.tags.push(Tag::new(tag_name));
        self.index.write_slot(username, album_name, slot, &media).await?;
        self.second_step("add tag", username, album_name, self.meta.add_tag_meta(username, album_name, tag_name)).await?;
        Ok(Outcome::Done(media))
    }

    pub async fn delete_tag(&self, username: &str, album_name: &str, locator: &str, tag_name: &str) -> Result<Outcome<Media>> {
        self.validate(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        let Some((slot, mut media)) = self.index.find_slot(username, album_name, locator).await? else {
            return Ok(Outcome::NotFound(Entity::Media));
        };
        let Some(pos) = media.tags.iter().position(|x| x.name == tag_name) else {
            return Ok(Outcome::NotFound(Entity::Tag));
        };
        media.tags.remove(pos);
        self.index.write_slot(username, album_name, slot, &media).await?;
        self.second_step("delete tag", username, album_name, self.meta.remove_tag_meta(username, album_name, tag_name)).await?;
        Ok(Outcome::Done(media))
    }

    pub async fn increase_like_count(&self, username: &str, album_name: &str, locator: &str) -> Result<Outcome<Media>> {
        self.validate(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }
        let Some((slot, mut media)) = self.index.find_slot(username, album_name, locator).await? else {
            return Ok(Outcome::NotFound(Entity::Media));
        };
        let is_first_like = media.likes == 0;
        media.likes += 1;
        self.index.write_slot(username, album_name, slot, &media).await?;
        self.second_step("like media", username, album_name, self.meta.increase_like_count(username, album_name, is_first_like)).await?;
        Ok(Outcome::Done(media))
    }

    // saved searches

    pub async fn add_saved_search(&self, username: &str, search_name: &str, params: SearchParams) -> Result<Outcome<SavedSearchMeta>> {
        validate_name(username)?;
        if search_name.trim().is_empty() {
            return Err(GalleryError::InvalidName { name: search_name.to_string(), reason: "name is empty" });
        }
        self.meta.add_saved_search(username, search_name, params).await
    }

    pub async fn list_saved_searches(&self, username: &str) -> Result<Option<Vec<SavedSearchMeta>>> {
        validate_name(username)?;
        Ok(self.meta.get_user(username).await?.map(|x| x.saved_searches))
    }

    pub async fn delete_saved_search(&self, username: &str, search_name: &str) -> Result<Outcome<()>> {
        validate_name(username)?;
        self.meta.delete_saved_search(username, search_name).await
    }

    // helpers

    fn validate(&self, username: &str, album_name: &str) -> Result<()> {
        validate_name(username)?;
        validate_album_name(username, album_name)
    }

    /// Which part of the (user, album) pair is missing, if any. Call with the album lock held.
    pub(crate) async fn check_album(&self, username: &str, album_name: &str) -> Result<Option<Entity>> {
        let Some(user) = self.meta.get_user(username).await? else {
            return Ok(Some(Entity::User));
        };
        if user.album(album_name).is_none() || !self.index.exists(username, album_name).await? {
            return Ok(Some(Entity::Album));
        }
        Ok(None)
    }

    /// Runs the user-document half of a paired operation whose album-index half already happened.
    pub(crate) async fn second_step<T>(
        &self,
        operation: &'static str,
        username: &str,
        album_name: &str,
        step: impl Future<Output = Result<Outcome<T>>>,
    ) -> Result<()> {
        match step.await {
            Ok(Outcome::Done(_)) => Ok(()),
            Ok(Outcome::NotFound(entity)) => {
                warn!("{} on {}/{}: aggregates not updated, {} missing from user document", operation, username, album_name, entity);
                Ok(())
            }
            Ok(Outcome::Conflict(entity)) => {
                warn!("{} on {}/{}: aggregates not updated, {} already in user document", operation, username, album_name, entity);
                Ok(())
            }
            Err(e) => Err(self.diverged(operation, username, album_name, e)),
        }
    }

    pub(crate) fn diverged(&self, operation: &'static str, username: &str, album_name: &str, source: GalleryError) -> GalleryError {
        error!("{} on {}/{} updated the album index but not the user document: {}", operation, username, album_name, source);
        GalleryError::Diverged {
            operation,
            user: username.to_string(),
            album: album_name.to_string(),
            source: Box::new(source),
        }
    }
}

fn validate_tag_name(tag_name: &str) -> Result<()> {
    if tag_name.trim().is_empty() {
        return Err(GalleryError::InvalidName { name: tag_name.to_string(), reason: "name is empty" });
    }
    Ok(())
}
