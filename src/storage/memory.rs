use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{KeyValueStore, StorageError, StorageResult};

/// In-process store. `with_value_quota` mimics the per-key size limit
/// browsers enforce on local storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    value_quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_quota(limit: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            value_quota: Some(limit),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(limit) = self.value_quota {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size: value.len(),
                });
            }
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_rejects_large_values() {
        let store = MemoryStore::with_value_quota(4);
        assert!(store.set("k", "1234").await.is_ok());
        match store.set("k", "12345").await {
            Err(StorageError::QuotaExceeded { key, size }) => {
                assert_eq!(key, "k");
                assert_eq!(size, 5);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn keys_with_prefix_filters() {
        let store = MemoryStore::new();
        store.set("witbot_a", "1").await.unwrap();
        store.set("witbot_b", "2").await.unwrap();
        store.set("other", "3").await.unwrap();
        let keys = store.keys_with_prefix("witbot_").await.unwrap();
        assert_eq!(keys, vec!["witbot_a".to_string(), "witbot_b".to_string()]);
    }
}
