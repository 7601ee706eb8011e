use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::models::{CacheEntry, CachedResponse};

mod disk;

pub use disk::DiskCacheStore;


/// Named cache generations holding response entries keyed by locator.
///
/// Writes replace whole entries; concurrent writes to the same key are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Creates the named generation if absent.
    async fn open(&self, name: &str) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Returns whether a generation was removed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    async fn get(&self, name: &str, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    async fn put(&self, name: &str, key: &str, response: CachedResponse) -> Result<(), StoreError>;

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<CacheEntry>,
    ) -> Result<(), StoreError> {
        for entry in entries {
            self.put(name, &entry.key, entry.response).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    generations: RwLock<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        let mut generations = self.generations.write().await;
        generations.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let generations = self.generations.read().await;
        let mut names: Vec<String> = generations.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.generations.write().await.remove(name).is_some())
    }

    async fn get(&self, name: &str, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let generations = self.generations.read().await;
        Ok(generations
            .get(name)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: &str, response: CachedResponse) -> Result<(), StoreError> {
        let mut generations = self.generations.write().await;
        generations
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<CacheEntry>,
    ) -> Result<(), StoreError> {
        let mut generations = self.generations.write().await;
        let generation = generations.entry(name.to_string()).or_default();
        generation.extend(entries.into_iter().map(|e| (e.key, e.response)));
        Ok(())
    }
}
