use std::cmp::Ordering;
use std::collections::HashSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::entities::{Entity, Media, Outcome, UserAlbumMeta};
use crate::error::Result;
use crate::gallery::Gallery;
use crate::search::PAGE_SIZE;
use crate::storage::codec;
use crate::storage::{validate_album_name, validate_name};
use crate::utils::str_utils::StringExtensions;

pub const COLLISION_SUFFIX: &str = "_1";

/// Sort key for [`Gallery::rebuild_album_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildOrder {
    Date,
    Name,
}

impl From<&str> for RebuildOrder {
    /// `"date"` sorts by creation time, anything else by name.
    fn from(value: &str) -> Self {
        match value {
            "date" => RebuildOrder::Date,
            _ => RebuildOrder::Name,
        }
    }
}

impl Gallery {
    /// Folds `source2` into `source1` and stores the result as `target`.
    ///
    /// `source1`'s file is renamed to `target`, then every record of
    /// `source2` is appended. A record whose name is already taken in the
    /// renamed file gets `_1` inserted before its extension. `target` may be
    /// `source1` but must otherwise not exist yet.
    pub async fn merge_albums(&self, username: &str, source1: &str, source2: &str, target: &str) -> Result<Outcome<UserAlbumMeta>> {
        validate_name(username)?;
        for album_name in [source1, source2, target] {
            validate_album_name(username, album_name)?;
        }
        if source1 == source2 || target == source2 {
            return Ok(Outcome::Conflict(Entity::Album));
        }

        let _guards = self.locks.write_albums(username, &[source1, source2, target]).await;
        let Some(user) = self.meta.get_user(username).await? else {
            return Ok(Outcome::NotFound(Entity::User));
        };
        for album_name in [source1, source2] {
            if user.album(album_name).is_none() || !self.index.exists(username, album_name).await? {
                return Ok(Outcome::NotFound(Entity::Album));
            }
        }
        if target != source1 && (user.album(target).is_some() || self.index.exists(username, target).await?) {
            return Ok(Outcome::Conflict(Entity::Album));
        }

        let existing_names = self.names_in(username, source1).await?;
        let incoming = self.check_incoming(username, source2, &existing_names).await?;

        if target != source1 {
            self.index.rename_index(username, source1, target).await?;
        }
        let renamed = match self.append_incoming(username, source2, target, &existing_names).await {
            Ok(renamed) => renamed,
            Err(e) => return Err(self.diverged("merge albums", username, target, e)),
        };

        let merged = match self.meta.merge_album_meta(username, source1, source2, target).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.diverged("merge albums", username, target, e)),
        };
        if let Outcome::NotFound(entity) = &merged {
            warn!("merge albums on {}/{}: aggregates not merged, {} missing from user document", username, target, entity);
        }
        info!("merged {}/{} and {}/{} into {} ({} records, {} renamed)", username, source1, username, source2, target, incoming, renamed);
        Ok(merged)
    }

    /// Reorders the records of an album in place with a selection sort.
    ///
    /// Tag and like aggregates are unaffected. Returns the number of swaps.
    pub async fn rebuild_album_index(&self, username: &str, album_name: &str, order: RebuildOrder) -> Result<Outcome<u64>> {
        validate_name(username)?;
        validate_album_name(username, album_name)?;
        let _guard = self.locks.write_album(username, album_name).await;
        if let Some(missing) = self.check_album(username, album_name).await? {
            return Ok(Outcome::NotFound(missing));
        }

        let compare = |a: &Media, b: &Media| match order {
            RebuildOrder::Date => a.created.cmp(&b.created),
            RebuildOrder::Name => self.collator.compare(&a.name, &b.name),
        };
        let count = self.index.slot_count(username, album_name).await?;
        let mut swaps = 0;
        for i in 0..count.saturating_sub(1) {
            let current = self.index.read_slot(username, album_name, i).await?;
            let mut min = Media { index: Some(i), ..current.clone() };
            for j in i + 1..count {
                let candidate = self.index.read_slot(username, album_name, j).await?;
                if compare(&candidate, &min) == Ordering::Less {
                    min = Media { index: Some(j), ..candidate };
                }
            }
            match min.index {
                Some(j) if j != i => {
                    self.index.write_slot(username, album_name, i, &min).await?;
                    self.index.write_slot(username, album_name, j, &current).await?;
                    swaps += 1;
                }
                _ => {}
            }
        }
        info!("rebuilt {}/{} by {:?}: {} slots, {} swaps", username, album_name, order, count, swaps);
        Ok(Outcome::Done(swaps))
    }

    /// Record of `source2` as it will be stored in the merged album.
    fn incoming_record(mut media: Media, existing_names: &HashSet<String>) -> (Media, bool) {
        let collides = existing_names.contains(&media.name);
        if collides {
            media.name = media.name.with_name_suffix(COLLISION_SUFFIX);
        }
        (media, collides)
    }

    /// Decodes and re-encodes every incoming record, failing before anything
    /// on disk changes. Returns the number of records.
    async fn check_incoming(&self, username: &str, source2: &str, existing_names: &HashSet<String>) -> Result<u64> {
        let mut from = 0;
        loop {
            let page = self.index.list_range(username, source2, from, PAGE_SIZE).await?;
            if page.is_empty() {
                return Ok(from);
            }
            from += page.len() as u64;
            for media in page {
                let (media, _) = Self::incoming_record(media, existing_names);
                codec::encode(&media)?;
            }
        }
    }

    /// Appends every record of `source2` to `target` and deletes `source2`.
    /// Returns how many records were renamed.
    async fn append_incoming(&self, username: &str, source2: &str, target: &str, existing_names: &HashSet<String>) -> Result<u64> {
        let mut from = 0;
        let mut renamed = 0;
        loop {
            let page = self.index.list_range(username, source2, from, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            from += page.len() as u64;
            for media in page {
                let (media, collides) = Self::incoming_record(media, existing_names);
                if collides {
                    renamed += 1;
                }
                self.index.append(username, target, &media).await?;
            }
        }
        self.index.delete_index(username, source2).await?;
        Ok(renamed)
    }

    async fn names_in(&self, username: &str, album_name: &str) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        let mut from = 0;
        loop {
            let page = self.index.list_range(username, album_name, from, PAGE_SIZE).await?;
            if page.is_empty() {
                return Ok(names);
            }
            from += page.len() as u64;
            names.extend(page.into_iter().map(|x| x.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use tempfile::TempDir;
    use crate::entities::NewMedia;
    use crate::error::GalleryError;
    use crate::storage::StorageConfig;
    use super::*;

    async fn setup(albums: &[(&str, &[&str])]) -> (TempDir, Gallery) {
        let dir = TempDir::new().unwrap();
        let gallery = Gallery::new(StorageConfig::new(dir.path()));
        gallery.create_user("alice", "pw").await.unwrap();
        for (album_name, names) in albums {
            gallery.create_album("alice", album_name).await.unwrap();
            for name in names.iter() {
                let req = NewMedia { name: name.to_string(), ..Default::default() };
                gallery.add_media("alice", album_name, req).await.unwrap();
            }
        }
        (dir, gallery)
    }

    async fn names(gallery: &Gallery, album_name: &str) -> Vec<String> {
        gallery.list_album_items("alice", album_name, 0, 1000).await.unwrap()
            .done()
            .unwrap()
            .into_iter()
            .map(|x| x.name)
            .collect()
    }

    #[tokio::test]
    async fn test_merge_into_new_album() {
        let (dir, gallery) = setup(&[("a", &["x.jpg", "y.jpg"]), ("b", &["x.jpg", "z.jpg"])]).await;
        gallery.add_tag("alice", "a", "y.jpg", "sea").await.unwrap();
        gallery.add_tag("alice", "b", "z.jpg", "sea").await.unwrap();
        gallery.increase_like_count("alice", "b", "z.jpg").await.unwrap();

        let merged = gallery.merge_albums("alice", "a", "b", "c").await.unwrap().done().unwrap();
        assert_eq!(merged.album_name, "c");
        assert_eq!(merged.tag_count("sea"), 2);
        assert_eq!((merged.total_likes, merged.total_unique_likes), (1, 1));
        assert_eq!(names(&gallery, "c").await, vec!["x.jpg", "y.jpg", "x_1.jpg", "z.jpg"]);

        let user_dir = dir.path().join("alice");
        assert!(!user_dir.join("a.dat").exists());
        assert!(!user_dir.join("b.dat").exists());
        let albums: Vec<String> = gallery.get_user("alice").await.unwrap().unwrap().album_meta.into_iter().map(|x| x.album_name).collect();
        assert_eq!(albums, vec!["c"]);
    }

    #[tokio::test]
    async fn test_merge_into_first_source() {
        let (_dir, gallery) = setup(&[("a", &["x.jpg"]), ("b", &["y.jpg"]), ("other", &[])]).await;
        assert!(gallery.merge_albums("alice", "a", "b", "a").await.unwrap().is_done());
        assert_eq!(names(&gallery, "a").await, vec!["x.jpg", "y.jpg"]);
        let albums: Vec<String> = gallery.get_user("alice").await.unwrap().unwrap().album_meta.into_iter().map(|x| x.album_name).collect();
        assert_eq!(albums, vec!["a", "other"]);
    }

    #[tokio::test]
    async fn test_merge_rejects() {
        let (_dir, gallery) = setup(&[("a", &["x.jpg"]), ("b", &["y.jpg"]), ("c", &[])]).await;
        assert_eq!(gallery.merge_albums("alice", "a", "a", "d").await.unwrap(), Outcome::Conflict(Entity::Album));
        assert_eq!(gallery.merge_albums("alice", "a", "b", "b").await.unwrap(), Outcome::Conflict(Entity::Album));
        assert_eq!(gallery.merge_albums("alice", "a", "b", "c").await.unwrap(), Outcome::Conflict(Entity::Album));
        assert_eq!(gallery.merge_albums("alice", "a", "nope", "d").await.unwrap(), Outcome::NotFound(Entity::Album));
        assert_eq!(gallery.merge_albums("bob", "a", "b", "d").await.unwrap(), Outcome::NotFound(Entity::User));
        assert_eq!(names(&gallery, "a").await, vec!["x.jpg"]);
        assert_eq!(names(&gallery, "b").await, vec!["y.jpg"]);
    }

    #[tokio::test]
    async fn test_merge_checks_renamed_records_before_touching_files() {
        let (dir, gallery) = setup(&[("a", &[]), ("b", &[])]).await;
        let created = Some(FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let base = Media::new(NewMedia { name: ".jpg".to_string(), size: None, created });
        let base_len = serde_json::to_vec(&base).unwrap().len() + codec::END_MARKER.len();
        let name = format!("{}.jpg", "x".repeat(codec::MAX_PAYLOAD - base_len));
        for album_name in ["a", "b"] {
            let req = NewMedia { name: name.clone(), size: None, created };
            assert!(gallery.add_media("alice", album_name, req).await.unwrap().is_done());
        }

        let err = gallery.merge_albums("alice", "a", "b", "c").await.unwrap_err();
        assert!(matches!(err, GalleryError::RecordTooLarge { max: codec::MAX_PAYLOAD, .. }));

        let user_dir = dir.path().join("alice");
        assert!(user_dir.join("a.dat").exists());
        assert!(user_dir.join("b.dat").exists());
        assert!(!user_dir.join("c.dat").exists());
        assert_eq!(names(&gallery, "a").await, vec![name.clone()]);
        assert_eq!(names(&gallery, "b").await, vec![name]);
        let albums: Vec<String> = gallery.get_user("alice").await.unwrap().unwrap().album_meta.into_iter().map(|x| x.album_name).collect();
        assert_eq!(albums, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rebuild_by_name() {
        let (_dir, gallery) = setup(&[("a", &["img10.jpg", "B.jpg", "img2.jpg", "a.jpg"])]).await;
        let swaps = gallery.rebuild_album_index("alice", "a", RebuildOrder::Name).await.unwrap().done().unwrap();
        assert!(swaps > 0);
        assert_eq!(names(&gallery, "a").await, vec!["a.jpg", "B.jpg", "img2.jpg", "img10.jpg"]);
        assert_eq!(gallery.rebuild_album_index("alice", "a", RebuildOrder::Name).await.unwrap(), Outcome::Done(0));
    }

    #[tokio::test]
    async fn test_rebuild_by_date() {
        let (_dir, gallery) = setup(&[("a", &[])]).await;
        let tz = FixedOffset::east_opt(3600).unwrap();
        for (name, hour) in [("late.jpg", 12), ("early.jpg", 8), ("noon.jpg", 11)] {
            let req = NewMedia {
                name: name.to_string(),
                created: Some(tz.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()),
                ..Default::default()
            };
            gallery.add_media("alice", "a", req).await.unwrap();
        }
        gallery.rebuild_album_index("alice", "a", RebuildOrder::Date).await.unwrap();
        assert_eq!(names(&gallery, "a").await, vec!["early.jpg", "noon.jpg", "late.jpg"]);
    }

    #[tokio::test]
    async fn test_rebuild_trivial_albums() {
        let (_dir, gallery) = setup(&[("empty", &[]), ("one", &["x.jpg"])]).await;
        assert_eq!(gallery.rebuild_album_index("alice", "empty", RebuildOrder::Date).await.unwrap(), Outcome::Done(0));
        assert_eq!(gallery.rebuild_album_index("alice", "one", RebuildOrder::Name).await.unwrap(), Outcome::Done(0));
        assert_eq!(gallery.rebuild_album_index("alice", "nope", RebuildOrder::Name).await.unwrap(), Outcome::NotFound(Entity::Album));
    }

    #[test]
    fn test_rebuild_order_from_str() {
        assert_eq!(RebuildOrder::from("date"), RebuildOrder::Date);
        assert_eq!(RebuildOrder::from("name"), RebuildOrder::Name);
        assert_eq!(RebuildOrder::from("Date"), RebuildOrder::Name);
    }
}
