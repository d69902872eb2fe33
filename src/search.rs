use log::{debug, warn};
use crate::entities::{Media, SearchHit, SearchParams, UserAlbumMeta};
use crate::error::Result;
use crate::gallery::Gallery;
use crate::storage::validate_name;
use crate::utils::split_list;
use crate::utils::str_utils::StringExtensions;

pub(crate) const PAGE_SIZE: u64 = 200;

/// Parsed form of [`SearchParams`] with the comma lists split up.
#[derive(Debug, Clone, Default)]
struct SearchFilter {
    album_names: Vec<String>,
    tags: Vec<String>,
    match_all_tags: bool,
    extensions: Vec<String>,
    contains: Option<String>,
}

impl SearchFilter {
    fn new(params: &SearchParams) -> Self {
        let list = |x: &Option<String>| x.as_deref().map(split_list).unwrap_or_default();
        Self {
            album_names: list(&params.album_names),
            tags: list(&params.tags),
            match_all_tags: params.match_all_tags,
            extensions: list(&params.extensions),
            contains: params.contains.clone().filter(|x| !x.is_empty()),
        }
    }

    fn matches_album_name(&self, album_name: &str) -> bool {
        self.album_names.is_empty() || self.album_names.iter().any(|x| album_name.contains(x.as_str()))
    }

    fn matches_album_tags(&self, album: &UserAlbumMeta) -> bool {
        let has_tag = |tag: &String| album.tag_count(tag) > 0;
        match self.match_all_tags {
            true => self.tags.iter().all(has_tag),
            false => self.tags.iter().any(has_tag),
        }
    }

    fn matches(&self, album_name: &str, media: &Media) -> bool {
        if !self.matches_album_name(album_name) {
            return false;
        }
        if !self.tags.is_empty() {
            let tag_match = match self.match_all_tags {
                true => self.tags.iter().all(|x| media.has_tag(x)),
                false => self.tags.iter().any(|x| media.has_tag(x)),
            };
            if !tag_match {
                return false;
            }
        }
        if !self.extensions.is_empty() && !self.extensions.iter().any(|x| media.name.ends_with_ignore_case(x)) {
            return false;
        }
        match &self.contains {
            Some(text) => media.name.contains(text.as_str()) || media.id.contains(text.as_str()),
            None => true,
        }
    }

    /// Albums worth scanning, in metadata order.
    ///
    /// When the tag aggregates rule out every album that passed the name
    /// filter, the name-filtered set is scanned anyway.
    fn candidate_albums<'a>(&self, albums: &'a [UserAlbumMeta]) -> Vec<&'a UserAlbumMeta> {
        let by_name: Vec<&UserAlbumMeta> = albums.iter().filter(|x| self.matches_album_name(&x.album_name)).collect();
        if self.tags.is_empty() {
            return by_name;
        }
        let by_tag: Vec<&UserAlbumMeta> = by_name.iter().copied().filter(|x| self.matches_album_tags(x)).collect();
        if by_tag.is_empty() && !by_name.is_empty() {
            debug!("tag prefilter matched no album, scanning {} albums", by_name.len());
            return by_name;
        }
        by_tag
    }
}

impl Gallery {
    /// Filtered, paginated search over all albums of a user.
    ///
    /// Hits are numbered in album-list order, then slot order; the ones with
    /// ordinal in `[skip, skip + max_results)` are returned. `None` if the
    /// user does not exist.
    pub async fn search(&self, username: &str, params: &SearchParams) -> Result<Option<Vec<SearchHit>>> {
        validate_name(username)?;
        let Some(user) = self.meta.get_user(username).await? else {
            return Ok(None);
        };
        let filter = SearchFilter::new(params);
        let mut hits = vec![];
        if params.max_results == 0 {
            return Ok(Some(hits));
        }

        let mut seen = 0usize;
        'albums: for album in filter.candidate_albums(&user.album_meta) {
            let album_name = album.album_name.as_str();
            let _guard = self.locks.read_album(username, album_name).await;
            if !self.index.exists(username, album_name).await? {
                warn!("album {}/{} has metadata but no index file", username, album_name);
                continue;
            }
            let mut from = 0;
            loop {
                let page = self.index.list_range(username, album_name, from, PAGE_SIZE).await?;
                if page.is_empty() {
                    break;
                }
                let page_len = page.len() as u64;
                for (slot, media) in (from..).zip(page) {
                    if !filter.matches(album_name, &media) {
                        continue;
                    }
                    seen += 1;
                    if seen <= params.skip {
                        continue;
                    }
                    hits.push(SearchHit {
                        album_name: album_name.to_string(),
                        media_album_index: slot,
                        media_item: media,
                    });
                    if hits.len() >= params.max_results {
                        break 'albums;
                    }
                }
                from += page_len;
            }
        }
        debug!("search for {} matched {} records, returned {}", username, seen, hits.len());
        Ok(Some(hits))
    }
}
