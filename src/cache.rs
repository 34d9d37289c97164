//! In-memory ephemeral state: login sessions, online status and
//! verification codes.
//!
//! Entries expire lazily on read; a periodic [`TtlCache::prune`] pass (run
//! by the user server) reclaims entries nobody reads again.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A string key/value cache with optional per-entry TTL.
#[derive(Default)]
pub struct TtlCache {
    map: DashMap<String, Entry>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry that never expires.
    pub fn insert(&self, key: &str, value: &str) {
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    /// Insert an entry that expires after `ttl`.
    pub fn insert_ttl(&self, key: &str, value: &str, ttl: Duration) {
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Fetch a live entry, dropping it if its TTL has lapsed.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.map.get(key) {
            if !entry.expired(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        // Expired: take the write path to evict.
        self.map.remove_if(key, |_, e| e.expired(now));
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove an entry; true when one was present and live.
    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.map.remove(key) {
            Some((_, entry)) => !entry.expired(now),
            None => false,
        }
    }

    /// Sweep out every expired entry, returning how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, e| !e.expired(now));
        before - self.map.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Login sessions: `session_id -> user_id`.
#[derive(Default)]
pub struct SessionStore {
    cache: TtlCache,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, session_id: &str, user_id: &str) {
        self.cache.insert(session_id, user_id);
    }

    pub fn user_id(&self, session_id: &str) -> Option<String> {
        self.cache.get(session_id)
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.cache.remove(session_id)
    }
}

/// Online status: `user_id -> "1"`. The login paths check [`Self::exists`]
/// before appending, which keeps a user to one concurrent status entry.
#[derive(Default)]
pub struct StatusStore {
    cache: TtlCache,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, user_id: &str) {
        self.cache.insert(user_id, "1");
    }

    pub fn exists(&self, user_id: &str) -> bool {
        self.cache.get(user_id).as_deref() == Some("1")
    }

    pub fn remove(&self, user_id: &str) -> bool {
        self.cache.remove(user_id)
    }
}

/// Email verification codes: `code_id -> code`, valid for ten minutes.
pub struct VerifyCodeStore {
    cache: TtlCache,
    ttl: Duration,
}

impl VerifyCodeStore {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(),
            ttl,
        }
    }

    pub fn append(&self, code_id: &str, code: &str) {
        self.cache.insert_ttl(code_id, code, self.ttl);
    }

    pub fn code(&self, code_id: &str) -> Option<String> {
        self.cache.get(code_id)
    }

    pub fn remove(&self, code_id: &str) -> bool {
        self.cache.remove(code_id)
    }

    pub fn prune(&self) -> usize {
        self.cache.prune()
    }
}

impl Default for VerifyCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let cache = TtlCache::new();
        cache.insert("k", "v");
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.remove("k"));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.remove("k"));
    }

    #[test]
    fn ttl_entries_expire() {
        let cache = TtlCache::new();
        cache.insert_ttl("k", "v", Duration::from_millis(10));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn prune_sweeps_expired() {
        let cache = TtlCache::new();
        cache.insert("live", "v");
        cache.insert_ttl("dead1", "v", Duration::from_millis(1));
        cache.insert_ttl("dead2", "v", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.prune(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn status_store_roundtrip() {
        let status = StatusStore::new();
        assert!(!status.exists("u1"));
        status.append("u1");
        assert!(status.exists("u1"));
        status.remove("u1");
        assert!(!status.exists("u1"));
    }

    #[test]
    fn verify_code_expires() {
        let codes = VerifyCodeStore::with_ttl(Duration::from_millis(10));
        codes.append("c1", "042931");
        assert_eq!(codes.code("c1").as_deref(), Some("042931"));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(codes.code("c1"), None);
    }

    #[test]
    fn session_store_maps_to_user() {
        let sessions = SessionStore::new();
        sessions.append("s1", "u1");
        assert_eq!(sessions.user_id("s1").as_deref(), Some("u1"));
        assert_eq!(sessions.user_id("s2"), None);
    }
}
