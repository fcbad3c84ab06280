// Key-value storage abstraction used by the box cache.
// Memory for tests and single-node setups, Redis when REDIS_URL is set.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("quota exceeded writing {key} ({size} bytes)")]
    QuotaExceeded { key: String, size: usize },

    #[error("corrupted entry {0}")]
    Corrupted(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// String-valued storage in the shape of browser local storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    fn backend_name(&self) -> &'static str;
}
