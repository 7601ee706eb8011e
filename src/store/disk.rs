use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

use super::CacheStore;
use crate::errors::StoreError;
use crate::models::{CacheEntry, CachedResponse};

/// Persists generations under `root`, one directory per generation.
///
/// Each entry is a single `<sha256(key)>.entry` file: one line of JSON metadata
/// followed by the raw body. Entries are written to a uniquely named temp file
/// and renamed into place, so a reader sees either the old entry or the new one.
pub struct DiskCacheStore {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
}

impl DiskCacheStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    fn entry_file(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.entry", hex::encode(Sha256::digest(key.as_bytes()))))
    }

    fn encode(key: &str, response: &CachedResponse) -> Result<Vec<u8>, StoreError> {
        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .map(|(n, v)| (n.as_str().to_string(), v.as_bytes().to_vec()))
                .collect(),
        };
        // serde_json never emits a raw newline, so the first one ends the metadata
        let mut raw = serde_json::to_vec(&meta).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        raw.push(b'\n');
        raw.extend_from_slice(&response.body);
        Ok(raw)
    }

    fn decode(key: &str, raw: Vec<u8>) -> Result<CachedResponse, StoreError> {
        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| StoreError::Corrupt(format!("truncated entry for {}", key)))?;
        let meta: EntryMeta = serde_json::from_slice(&raw[..split])
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if meta.key != key {
            return Err(StoreError::Corrupt(format!("key mismatch for {}", key)));
        }

        let status = StatusCode::from_u16(meta.status)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in meta.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let value =
                HeaderValue::from_bytes(&value).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            headers.append(name, value);
        }

        let body = raw[split + 1..].to_vec();
        Ok(CachedResponse::new(status, headers, body))
    }

    /// Writes every file to its own temp file, then renames them all into place.
    ///
    /// A write failure drops the temp files written so far, leaving the
    /// generation untouched.
    async fn write_entries(dir: PathBuf, files: Vec<(PathBuf, Vec<u8>)>) -> Result<(), StoreError> {
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut staged = Vec::with_capacity(files.len());
            for (path, contents) in files {
                let mut tmp = NamedTempFile::new_in(&dir)?;
                tmp.write_all(&contents)?;
                tmp.as_file().sync_data()?;
                staged.push((tmp, path));
            }
            for (tmp, path) in staged {
                tmp.persist(&path)?;
            }
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.generation_dir(name)).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let decoded = file_name
                .to_str()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(name) => names.push(name),
                None => tracing::warn!(dir = ?file_name, "ignoring foreign directory in cache root"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        match fs::remove_dir_all(self.generation_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, name: &str, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let path = Self::entry_file(&self.generation_dir(name), key);
        match fs::read(&path).await {
            Ok(raw) => Self::decode(key, raw).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, key: &str, response: CachedResponse) -> Result<(), StoreError> {
        let dir = self.generation_dir(name);
        let file = (Self::entry_file(&dir, key), Self::encode(key, &response)?);
        Self::write_entries(dir, vec![file]).await
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> Result<(), StoreError> {
        let dir = self.generation_dir(name);
        let files = entries
            .iter()
            .map(|entry| {
                Ok((
                    Self::entry_file(&dir, &entry.key),
                    Self::encode(&entry.key, &entry.response)?,
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Self::write_entries(dir, files).await
    }
}
