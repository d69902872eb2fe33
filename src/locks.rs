use std::sync::Arc;
use dashmap::DashMap;
use itertools::Itertools;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum LockKey {
    Album { username: String, album_name: String },
    UserDocument { username: String },
}

impl LockKey {
    fn album(username: &str, album_name: &str) -> Self {
        LockKey::Album { username: username.to_string(), album_name: album_name.to_string() }
    }

    fn user(username: &str) -> Self {
        LockKey::UserDocument { username: username.to_string() }
    }
}

type LockMap = DashMap<LockKey, Arc<RwLock<()>>>;

/// Keyed reader/writer locks guarding album files and user documents.
///
/// Album locks are always taken before the user document lock, and several
/// album locks are taken in sorted order. The user document lock is never
/// held across an album index call.
///
/// Entries exist only while someone holds or waits on them: the last guard
/// to drop removes its key.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: LockMap,
}

/// Held lock; removes the registry entry on drop when nobody else uses it.
#[must_use]
pub struct LockGuard<'a, G> {
    guard: Option<G>,
    key: LockKey,
    locks: &'a LockMap,
}

pub type ReadGuard<'a> = LockGuard<'a, OwnedRwLockReadGuard<()>>;
pub type WriteGuard<'a> = LockGuard<'a, OwnedRwLockWriteGuard<()>>;

impl<G> Drop for LockGuard<'_, G> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &LockKey) -> Arc<RwLock<()>> {
        self.locks.entry(key.clone()).or_default().value().clone()
    }

    async fn read(&self, key: LockKey) -> ReadGuard<'_> {
        let guard = self.lock_for(&key).read_owned().await;
        LockGuard { guard: Some(guard), key, locks: &self.locks }
    }

    async fn write(&self, key: LockKey) -> WriteGuard<'_> {
        let guard = self.lock_for(&key).write_owned().await;
        LockGuard { guard: Some(guard), key, locks: &self.locks }
    }

    pub async fn read_album(&self, username: &str, album_name: &str) -> ReadGuard<'_> {
        self.read(LockKey::album(username, album_name)).await
    }

    pub async fn write_album(&self, username: &str, album_name: &str) -> WriteGuard<'_> {
        self.write(LockKey::album(username, album_name)).await
    }

    /// Write-locks several albums of one user, deduplicated, in sorted order.
    pub async fn write_albums(&self, username: &str, album_names: &[&str]) -> Vec<WriteGuard<'_>> {
        let mut guards = vec![];
        for album_name in album_names.iter().sorted().dedup() {
            guards.push(self.write_album(username, album_name).await);
        }
        guards
    }

    pub async fn read_user(&self, username: &str) -> ReadGuard<'_> {
        self.read(LockKey::user(username)).await
    }

    pub async fn write_user(&self, username: &str) -> WriteGuard<'_> {
        self.write(LockKey::user(username)).await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
