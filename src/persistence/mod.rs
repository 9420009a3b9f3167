//! Opaque key-value persistence
//!
//! This crate never interprets storage: ghosts, leaderboards, settings and
//! crash statistics are framed by their own modules and handed over as bytes.
//! - `MemoryStore`: in-process map (native builds, tests)
//! - `LocalStorageStore`: browser LocalStorage (wasm32 only)

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded writing {0}")]
    QuotaExceeded(String),

    #[error("Storage backend unavailable")]
    Unavailable,

    #[error("Value for {0} is not valid UTF-8")]
    Encoding(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Byte-blob store supplied by the host
pub trait KeyValueStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).cloned()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// Browser LocalStorage; values must be UTF-8 (all our blobs are JSON)
#[cfg(target_arch = "wasm32")]
pub struct LocalStorageStore {
    storage: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    /// Open the window's LocalStorage, if the browser allows it
    pub fn open() -> Result<Self, StorageError> {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten()
            .ok_or(StorageError::Unavailable)?;
        Ok(Self { storage })
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorageStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let value =
            std::str::from_utf8(bytes).map_err(|_| StorageError::Encoding(key.to_string()))?;
        // LocalStorage only fails on quota (or disabled storage)
        self.storage
            .set_item(key, value)
            .map_err(|_| StorageError::QuotaExceeded(key.to_string()))
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.storage
            .get_item(key)
            .ok()
            .flatten()
            .map(String::into_bytes)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.storage
            .remove_item(key)
            .map_err(|e| StorageError::Backend(format!("{:?}", e)))
    }
}
