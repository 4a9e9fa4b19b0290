//! Byte sources for asset URLs.

use std::io;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::core::AssetUrl;
use crate::error::{AssetError, Result};

/// Fetches the raw bytes behind an asset URL.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn fetch(&self, url: &AssetUrl) -> Result<Vec<u8>>;
}

/// Reads `file://` URLs from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

#[async_trait]
impl Loader for FsLoader {
    async fn fetch(&self, url: &AssetUrl) -> Result<Vec<u8>> {
        let path = url.to_file_path().ok_or_else(|| {
            AssetError::resolution(url, url.as_str(), "only file:// URLs can be loaded")
        })?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| AssetError::Io(path.display().to_string(), err))
    }
}

/// Serves a fixed set of URLs from memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    files: FxHashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &AssetUrl, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: &AssetUrl, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.as_str().to_string(), bytes.into());
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn fetch(&self, url: &AssetUrl) -> Result<Vec<u8>> {
        self.files.get(url.as_str()).cloned().ok_or_else(|| {
            AssetError::Io(
                url.to_string(),
                io::Error::new(io::ErrorKind::NotFound, "not in memory loader"),
            )
        })
    }
}
