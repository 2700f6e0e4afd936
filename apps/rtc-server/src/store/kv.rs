use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("key-value store error: {0}")]
pub struct KvError(pub String);

/// Abstraction over a key-value store used for connection tickets.
///
/// Backed by an in-memory map in-process; a shared store can be plugged in
/// when several dispatcher processes serve the same clients.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError>;
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn del(&self, key: &str) -> Result<(), KvError>;

    /// Fetch and delete in one step. Stores with an atomic primitive should
    /// override this.
    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.del(key).await?;
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct StoredValue {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let mut data = self.data.lock();
        data.retain(|_, stored| stored.expires_at > Instant::now());
        data.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let data = self.data.lock();
        Ok(data
            .get(key)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| stored.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let stored = self.data.lock().remove(key);
        Ok(stored
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| stored.value))
    }
}
