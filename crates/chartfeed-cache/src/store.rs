//! Key/value store abstraction and the in-memory backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::CacheError;

/// A string key/value store with per-key expiry.
///
/// Every write is an independent last-writer-wins set-with-expiry; callers
/// never rely on read-modify-write.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Reads many keys in one round trip. The result is aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Writes many entries in one round trip, each expiring after `ttl`.
    async fn set_many(&self, entries: &[(String, String)], ttl: Duration)
    -> Result<(), CacheError>;

    /// Returns every live key matching a glob `pattern` (`*` wildcards only).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Deletes keys, returning how many existed. Missing keys are not an error.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Reads a single key.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut values = self.get_many(&[key.to_string()]).await?;
        Ok(values.pop().flatten())
    }

    /// Writes a single key.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.set_many(&[(key.to_string(), value)], ttl).await
    }
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`CacheStore`] with lazy expiry.
///
/// Expiry is measured on the tokio clock, so tests can advance time with a
/// paused runtime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.expires_at > now).count()
    }

    /// Returns true if no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the remaining time to live of a key.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, e| e.expires_at > now);
        Ok(keys
            .iter()
            .map(|k| entries.get(k).map(|e| e.value.clone()))
            .collect())
    }

    async fn set_many(
        &self,
        items: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.lock();
        for (key, value) in items {
            entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(k, e)| e.expires_at > now && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| e.expires_at > now)
            .count();
        Ok(removed as u64)
    }
}

/// Matches `text` against a glob where `*` matches any run of characters.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let middle: Vec<&str> = parts.collect();
    let Some((last, inner)) = middle.split_last() else {
        // No wildcard at all
        return rest.is_empty();
    };

    for part in inner {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("session:*", "session:abc"));
        assert!(!glob_match("session:*", "sessions"));
        assert!(glob_match("ohlc:*:tok", "ohlc:NYSE:IBM:1s:2024-01-02:tok"));
        assert!(!glob_match("ohlc:*:tok", "ohlc:NYSE:IBM:1s:2024-01-02:other"));
        assert!(glob_match("chart_data:tok:*", "chart_data:tok:u1:5m"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("a*b*c", "a-x-b-y-c"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store
            .set("k", "v".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_batch_ops_align_and_delete_is_idempotent() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store
            .set_many(
                &[("a".to_string(), "1".to_string()), ("c".to_string(), "3".to_string())],
                ttl,
            )
            .await
            .unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = store.get_many(&keys).await.unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None, Some("3".to_string())]);

        assert_eq!(store.delete_many(&keys).await.unwrap(), 2);
        assert_eq!(store.delete_many(&keys).await.unwrap(), 0);
    }
}
