use std::fmt::{Display, Formatter};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MediaId = String;

/// Kind of thing an [`Outcome`] refers to when it is not found or conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Entity {
    User,
    Album,
    Media,
    Tag,
    SavedSearch,
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Album => "album",
            Entity::Media => "media",
            Entity::Tag => "tag",
            Entity::SavedSearch => "saved search",
        };
        f.write_str(name)
    }
}

/// Result of a domain operation whose failure modes are expected.
///
/// Faults (I/O, corruption) travel through `GalleryError` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    NotFound(Entity),
    Conflict(Entity),
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(x) => Some(x),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(x) => Outcome::Done(f(x)),
            Outcome::NotFound(e) => Outcome::NotFound(e),
            Outcome::Conflict(e) => Outcome::Conflict(e),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    #[serde(rename = "TagName")]
    pub name: String,
    pub created: DateTime<Utc>,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), created: Utc::now() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Media {
    pub id: MediaId,
    pub name: String,
    pub created: DateTime<FixedOffset>,
    pub size: Option<i64>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub likes: u64,
    /// Slot bookkeeping for maintenance passes; never written to disk.
    #[serde(skip)]
    pub index: Option<u64>,
}

impl Media {
    pub fn new(req: NewMedia) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            created: req.created.unwrap_or_else(|| Local::now().fixed_offset()),
            size: req.size,
            tags: vec![],
            likes: 0,
            index: None,
        }
    }

    pub fn has_tag(&self, tag_name: &str) -> bool {
        self.tags.iter().any(|x| x.name == tag_name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NewMedia {
    pub name: String,
    pub size: Option<i64>,
    pub created: Option<DateTime<FixedOffset>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct UserMeta {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub album_meta: Vec<UserAlbumMeta>,
    #[serde(default)]
    pub saved_searches: Vec<SavedSearchMeta>,
}

impl UserMeta {
    pub fn album(&self, album_name: &str) -> Option<&UserAlbumMeta> {
        self.album_meta.iter().find(|x| x.album_name == album_name)
    }

    pub fn album_mut(&mut self, album_name: &str) -> Option<&mut UserAlbumMeta> {
        self.album_meta.iter_mut().find(|x| x.album_name == album_name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct UserAlbumMeta {
    pub album_name: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<UserAlbumTagMeta>,
    #[serde(default)]
    pub total_likes: u64,
    #[serde(default)]
    pub total_unique_likes: u64,
}

impl UserAlbumMeta {
    pub fn new(album_name: &str) -> Self {
        Self {
            album_name: album_name.to_string(),
            created: Utc::now(),
            tags: vec![],
            total_likes: 0,
            total_unique_likes: 0,
        }
    }

    pub fn tag_count(&self, tag_name: &str) -> u64 {
        self.tags.iter().find(|x| x.tag_name == tag_name).map(|x| x.count).unwrap_or(0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct UserAlbumTagMeta {
    pub tag_name: String,
    pub count: u64,
}

pub const DEFAULT_MAX_RESULTS: usize = 32;

/// Filters for a cross-album search. List-valued filters are comma separated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SearchParams {
    pub album_names: Option<String>,
    pub tags: Option<String>,
    pub match_all_tags: bool,
    pub extensions: Option<String>,
    pub contains: Option<String>,
    pub skip: usize,
    pub max_results: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            album_names: None,
            tags: None,
            match_all_tags: false,
            extensions: None,
            contains: None,
            skip: 0,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SavedSearchMeta {
    pub search_name: String,
    pub parameters: SearchParams,
    pub last_updated: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SearchHit {
    pub album_name: String,
    pub media_album_index: u64,
    pub media_item: Media,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumSummary {
    pub album_name: String,
    pub created: DateTime<Utc>,
    pub item_count: u64,
    pub tags: Vec<UserAlbumTagMeta>,
    pub total_likes: u64,
    pub total_unique_likes: u64,
}
