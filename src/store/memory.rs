//! In-process store with a virtual clock.
//!
//! Backs deterministic tests for window expiry, TTL policy, and the
//! fallback scan without a running Redis. Time only moves when `advance`
//! is called, so window-boundary behavior is exact rather than sleep-based.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::Store;
use crate::error::WardenResult;

enum Value {
    Str(String),
    Set(HashSet<String>),
}

struct Entry {
    value: Value,
    expires_at_ms: Option<u64>,
}

#[derive(Default)]
struct Inner {
    now_ms: u64,
    entries: BTreeMap<String, Entry>,
    writes: u64,
    inspected: u64,
    // Scan positions handed out as cursors; cursor N resumes after the
    // key stored at N-1, so deletions between pages cannot skip keys.
    scan_positions: Vec<String>,
}

impl Inner {
    fn is_live(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) => entry.expires_at_ms.map_or(true, |at| at > self.now_ms),
            None => false,
        }
    }

    fn live(&self, key: &str) -> Option<&Entry> {
        if self.is_live(key) {
            self.entries.get(key)
        } else {
            None
        }
    }

    fn purge(&mut self, key: &str) {
        if !self.is_live(key) {
            self.entries.remove(key);
        }
    }

    fn set_str(&mut self, key: &str, value: &str, ttl_secs: u64) {
        self.writes += 1;
        let expires_at_ms = Some(self.now_ms + ttl_secs * 1000);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at_ms,
            },
        );
    }

    fn remove(&mut self, key: &str) -> bool {
        self.writes += 1;
        let existed = self.is_live(key);
        self.entries.remove(key);
        existed
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the virtual clock forward, expiring entries along the way.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.now_ms += by.as_millis() as u64;
    }

    /// Number of mutating store operations observed (test instrumentation).
    pub fn writes(&self) -> u64 {
        self.inner.lock().unwrap().writes
    }

    /// Number of keys whose payload was read via `mget` (test
    /// instrumentation for scan-budget assertions).
    pub fn inspected(&self) -> u64 {
        self.inner.lock().unwrap().inspected
    }
}

// Glob match supporting `*` wildcards, enough for key patterns like "sess:*".
fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }
    let mut rest = match key.strip_prefix(segments[0]) {
        Some(r) => r,
        None => return false,
    };
    let last = segments[segments.len() - 1];
    for segment in &segments[1..segments.len() - 1] {
        match rest.find(segment) {
            Some(pos) => rest = &rest[pos + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.live(key).and_then(|entry| match &entry.value {
            Value::Str(s) => Some(s.clone()),
            Value::Set(_) => None,
        }))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> WardenResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.set_str(key, value, ttl_secs);
        Ok(())
    }

    async fn del(&self, key: &str) -> WardenResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.remove(key))
    }

    async fn del_batch(&self, keys: &[String]) -> WardenResult<Vec<bool>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(keys.iter().map(|key| inner.remove(key)).collect())
    }

    async fn incr(&self, key: &str) -> WardenResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.purge(key);
        inner.writes += 1;
        let count = match inner.entries.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => s.parse::<i64>().unwrap_or(0) + 1,
            _ => 1,
        };
        let expires_at_ms = inner.entries.get(key).and_then(|e| e.expires_at_ms);
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(count.to_string()),
                expires_at_ms,
            },
        );
        Ok(count)
    }

    async fn pttl(&self, key: &str) -> WardenResult<i64> {
        let inner = self.inner.lock().unwrap();
        match inner.live(key) {
            None => Ok(-2),
            Some(entry) => match entry.expires_at_ms {
                None => Ok(-1),
                Some(at) => Ok((at - inner.now_ms) as i64),
            },
        }
    }

    async fn pexpire(&self, key: &str, ttl_ms: i64) -> WardenResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.writes += 1;
        if !inner.is_live(key) {
            return Ok(false);
        }
        let at = inner.now_ms + ttl_ms as u64;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.expires_at_ms = Some(at);
        }
        Ok(true)
    }

    async fn get_i64(&self, key: &str) -> WardenResult<Option<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.live(key).and_then(|entry| match &entry.value {
            Value::Str(s) => s.parse().ok(),
            Value::Set(_) => None,
        }))
    }

    async fn sadd(&self, key: &str, member: &str) -> WardenResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.purge(key);
        inner.writes += 1;
        match inner.entries.get_mut(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.insert(member.to_string());
            }
            _ => {
                let mut members = HashSet::new();
                members.insert(member.to_string());
                inner.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(members),
                        expires_at_ms: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> WardenResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(match inner.live(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                let mut out: Vec<String> = members.iter().cloned().collect();
                out.sort();
                out
            }
            _ => Vec::new(),
        })
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> WardenResult<bool> {
        self.pexpire(key, ttl_secs * 1000).await
    }

    async fn mget(&self, keys: &[String]) -> WardenResult<Vec<Option<String>>> {
        let mut inner = self.inner.lock().unwrap();
        inner.inspected += keys.len() as u64;
        let inner = &*inner;
        Ok(keys
            .iter()
            .map(|key| {
                inner.live(key).and_then(|entry| match &entry.value {
                    Value::Str(s) => Some(s.clone()),
                    Value::Set(_) => None,
                })
            })
            .collect())
    }

    async fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> WardenResult<(u64, Vec<String>)> {
        let mut inner = self.inner.lock().unwrap();
        let resume_after = match cursor {
            0 => None,
            n => inner.scan_positions.get((n - 1) as usize).cloned(),
        };
        let mut remaining: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| {
                resume_after.as_ref().map_or(true, |after| *key > after)
                    && inner.is_live(key)
                    && glob_match(pattern, key)
            })
            .cloned()
            .collect();
        let has_more = remaining.len() > count;
        remaining.truncate(count);
        let next = if has_more {
            inner
                .scan_positions
                .push(remaining.last().cloned().unwrap_or_default());
            inner.scan_positions.len() as u64
        } else {
            0
        };
        Ok((next, remaining))
    }

    async fn sadd_and_set(
        &self,
        set_key: &str,
        member: &str,
        kv_key: &str,
        kv_value: &str,
        ttl_secs: u64,
    ) -> WardenResult<()> {
        self.sadd(set_key, member).await?;
        self.expire(set_key, ttl_secs as i64).await?;
        self.set_ex(kv_key, kv_value, ttl_secs).await?;
        Ok(())
    }

    async fn ping(&self) -> WardenResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("sess:*", "sess:abc"));
        assert!(glob_match("sess:*", "sess:"));
        assert!(!glob_match("sess:*", "session_user:abc"));
        assert!(glob_match("ratelimit:login:*", "ratelimit:login:a@b.c"));
        assert!(glob_match("sess:abc", "sess:abc"));
        assert!(!glob_match("sess:abc", "sess:abcd"));
    }

    #[tokio::test]
    async fn test_expiry_with_virtual_clock() {
        let store = MemoryStore::new();

        store.set_ex("k", "v", 10).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        store.advance(Duration::from_secs(11));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.pttl("k").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_incr_has_no_expiry_until_armed() {
        let store = MemoryStore::new();

        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.pttl("c").await.unwrap(), -1);

        assert!(store.pexpire("c", 5000).await.unwrap());
        assert_eq!(store.incr("c").await.unwrap(), 2);
        // Increments never re-arm an already-armed window
        assert!(store.pttl("c").await.unwrap() <= 5000);

        store.advance(Duration::from_millis(5001));
        assert_eq!(store.incr("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_pages_cover_matching_keys() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .set_ex(&format!("sess:{}", i), "x", 100)
                .await
                .unwrap();
        }
        store.set_ex("other:1", "x", 100).await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, keys) = store.scan_page(cursor, "sess:*", 2).await.unwrap();
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 5);
    }
}
