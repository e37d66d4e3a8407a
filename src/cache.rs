use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;

/// Key-value capability with per-entry TTL. The host can hand in a real
/// backend; the in-process default below is enough for the demo binary and
/// tests.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &str) -> Option<String>;
  async fn set(&self, key: &str, value: String, ttl: Duration);
}

fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

/// Concurrent in-memory store. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCache {
  entries: DashMap<String, CachedEntry>,
}

struct CachedEntry {
  value: String,
  expire_timestamp_ms: u64,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CacheStore for MemoryCache {
  async fn get(&self, key: &str) -> Option<String> {
    let expired = match self.entries.get(key) {
      Some(entry) => {
        if now_ms() < entry.expire_timestamp_ms {
          return Some(entry.value.clone());
        }
        true
      }
      None => false,
    };
    if expired {
      self.entries.remove(key);
    }
    None
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) {
    self.entries.insert(
      key.to_string(),
      CachedEntry {
        value,
        expire_timestamp_ms: now_ms() + ttl.as_millis() as u64,
      },
    );
  }
}
