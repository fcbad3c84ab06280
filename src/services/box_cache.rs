use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    constants::{BOX_CACHE_KEY, BOX_CACHE_METADATA_KEY, BOX_CACHE_VERSION},
    models::CachedBox,
    storage::{KeyValueStore, StorageError, StorageResult},
    utils::now_millis,
};

pub type BoxMap = BTreeMap<String, CachedBox>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub chunks: usize,
    pub last_updated: i64,
    pub version: String,
}

fn chunk_key(index: usize) -> String {
    format!("{}_{}", BOX_CACHE_KEY, index)
}

/// Splits `data` into pieces of at most `chunk_size` bytes without cutting
/// through a UTF-8 sequence. A single character wider than `chunk_size`
/// still gets its own chunk.
pub fn split_into_chunks(data: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(data.len() / chunk_size + 1);
    let mut rest = data;
    while !rest.is_empty() {
        let mut end = chunk_size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}

/// Keeps the `max_items` most recently updated entries.
pub fn prune_boxes(boxes: &mut BoxMap, max_items: usize) {
    if boxes.len() <= max_items {
        return;
    }
    let mut ranked: Vec<(i64, String)> = boxes
        .iter()
        .map(|(address, snapshot)| (snapshot.last_updated, address.clone()))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    for (_, address) in ranked.into_iter().skip(max_items) {
        boxes.remove(&address);
    }
}

/// Box snapshots persisted across restarts, chunked when they outgrow a
/// single storage value.
///
/// Storage failures are never surfaced: the cache wipes its keys and starts
/// over from an empty mapping. Readers share `lock`; saves, clears and
/// corruption resets hold it exclusively.
pub struct BoxCache {
    store: Arc<dyn KeyValueStore>,
    max_items: usize,
    chunk_size: usize,
    lock: RwLock<()>,
}

impl BoxCache {
    pub fn new(store: Arc<dyn KeyValueStore>, max_items: usize, chunk_size: usize) -> Self {
        Self {
            store,
            max_items: max_items.max(1),
            chunk_size: chunk_size.max(1),
            lock: RwLock::new(()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn load(&self) -> BoxMap {
        {
            let _read = self.lock.read().await;
            match self.try_load().await {
                Ok(boxes) => return boxes,
                Err(e) => tracing::debug!("Box cache read failed, rechecking exclusively: {}", e),
            }
        }

        // A writer may have finished between the two guards.
        let _guard = self.lock.write().await;
        self.load_locked().await
    }

    /// Persists `boxes` and returns what was actually kept.
    pub async fn save(&self, boxes: &BoxMap) -> BoxMap {
        let _guard = self.lock.write().await;
        self.save_locked(boxes).await
    }

    /// Stores one snapshot. `None` when it did not survive the save, either
    /// pruned as older than every kept box or lost to a storage reset.
    pub async fn upsert(&self, mut snapshot: CachedBox) -> Option<CachedBox> {
        if snapshot.last_updated <= 0 {
            snapshot.last_updated = now_millis();
        }
        snapshot.address = snapshot.address.to_ascii_lowercase();

        let _guard = self.lock.write().await;
        let mut boxes = self.load_locked().await;
        let address = snapshot.address.clone();
        boxes.insert(address.clone(), snapshot);
        self.save_locked(&boxes).await.remove(&address)
    }

    pub async fn get(&self, address: &str) -> Option<CachedBox> {
        self.load().await.remove(&address.to_ascii_lowercase())
    }

    /// Cached boxes, most recently updated first.
    pub async fn list(&self) -> Vec<CachedBox> {
        let mut boxes: Vec<CachedBox> = self.load().await.into_values().collect();
        boxes.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.address.cmp(&b.address))
        });
        boxes
    }

    pub async fn clear(&self) {
        let _guard = self.lock.write().await;
        self.reset().await;
    }

    async fn load_locked(&self) -> BoxMap {
        match self.try_load().await {
            Ok(boxes) => boxes,
            Err(e) => {
                tracing::warn!("Box cache unreadable, resetting: {}", e);
                self.reset().await;
                BoxMap::new()
            }
        }
    }

    async fn save_locked(&self, boxes: &BoxMap) -> BoxMap {
        let mut persisted: BoxMap = boxes
            .iter()
            .map(|(address, snapshot)| (address.clone(), snapshot.stripped()))
            .collect();
        prune_boxes(&mut persisted, self.max_items);

        match self.try_save(&persisted).await {
            Ok(()) => persisted,
            Err(e) => {
                tracing::warn!("Box cache write failed, resetting: {}", e);
                self.reset().await;
                BoxMap::new()
            }
        }
    }

    async fn try_load(&self) -> StorageResult<BoxMap> {
        let raw = match self.store.get(BOX_CACHE_METADATA_KEY).await? {
            Some(meta_raw) => {
                let meta: CacheMetadata = serde_json::from_str(&meta_raw)
                    .map_err(|_| StorageError::Corrupted(BOX_CACHE_METADATA_KEY.to_string()))?;
                let mut joined = String::new();
                for index in 0..meta.chunks {
                    let key = chunk_key(index);
                    let chunk = self
                        .store
                        .get(&key)
                        .await?
                        .ok_or_else(|| StorageError::Corrupted(key.clone()))?;
                    joined.push_str(&chunk);
                }
                joined
            }
            None => match self.store.get(BOX_CACHE_KEY).await? {
                Some(raw) => raw,
                None => return Ok(BoxMap::new()),
            },
        };

        serde_json::from_str(&raw).map_err(|_| StorageError::Corrupted(BOX_CACHE_KEY.to_string()))
    }

    async fn try_save(&self, boxes: &BoxMap) -> StorageResult<()> {
        let json = serde_json::to_string(boxes)
            .map_err(|e| StorageError::Backend(format!("serialize: {}", e)))?;

        if json.len() <= self.chunk_size {
            self.store.set(BOX_CACHE_KEY, &json).await?;
            self.store.remove(BOX_CACHE_METADATA_KEY).await?;
            self.remove_chunks_from(0).await?;
            return Ok(());
        }

        let chunks = split_into_chunks(&json, self.chunk_size);
        for (index, chunk) in chunks.iter().enumerate() {
            self.store.set(&chunk_key(index), chunk).await?;
        }
        let meta = CacheMetadata {
            chunks: chunks.len(),
            last_updated: now_millis(),
            version: BOX_CACHE_VERSION.to_string(),
        };
        let meta_raw = serde_json::to_string(&meta)
            .map_err(|e| StorageError::Backend(format!("serialize: {}", e)))?;
        self.store.set(BOX_CACHE_METADATA_KEY, &meta_raw).await?;
        self.store.remove(BOX_CACHE_KEY).await?;
        self.remove_chunks_from(chunks.len()).await?;

        tracing::debug!(
            "Box cache saved in {} chunks ({} bytes, {} boxes)",
            chunks.len(),
            json.len(),
            boxes.len()
        );
        Ok(())
    }

    async fn remove_chunks_from(&self, first_stale: usize) -> StorageResult<()> {
        let prefix = format!("{}_", BOX_CACHE_KEY);
        for key in self.store.keys_with_prefix(&prefix).await? {
            let stale = key
                .strip_prefix(&prefix)
                .and_then(|suffix| suffix.parse::<usize>().ok())
                .map(|index| index >= first_stale)
                .unwrap_or(false);
            if stale {
                self.store.remove(&key).await?;
            }
        }
        Ok(())
    }

    async fn reset(&self) {
        match self.store.keys_with_prefix(BOX_CACHE_KEY).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.store.remove(&key).await {
                        tracing::error!("Failed to remove cache key {}: {}", key, e);
                    }
                }
            }
            Err(e) => tracing::error!("Failed to list cache keys during reset: {}", e),
        }
    }
}
