//! In-memory key/value store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::kv::KvStore;

/// Reference key/value backend over a sorted map.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(key) {
            return Ok(false);
        }
        inner.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.inner.write().await.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|key, _| !key.starts_with(prefix));
        Ok(before - inner.len())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_set_if_absent_never_overwrites() {
        let store = MemoryKvStore::new();

        assert!(store.set_if_absent("k", "first").await.unwrap());
        assert!(!store.set_if_absent("k", "second").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_prefix_operations() {
        let store = MemoryKvStore::new();
        store.set("segment_vote_d1_s1", "0").await.unwrap();
        store.set("segment_vote_d1_s2", "1").await.unwrap();
        store.set("segment_vote_d2_s1", "2").await.unwrap();

        let keys = store.keys("segment_vote_d1_").await.unwrap();
        assert_eq!(keys.len(), 2);

        let removed = store.delete_prefix("segment_vote_d1_").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.keys("segment_vote_").await.unwrap().len(), 1);
    }
}
