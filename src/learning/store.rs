//! Durable key-value stores for usage statistics.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Minimal durable store: whole values in, whole values out.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Process-local store; state is lost on restart. Default for tests and for
/// deployments that do not need learning to persist.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .map(|v| v.contains_key(key))
            .unwrap_or(false)
    }
}

fn poisoned(source: &str) -> Error {
    Error::storage_with_context("store lock poisoned", ErrorContext::new().with_source(source))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let values = self.values.read().map_err(|_| poisoned(self.name()))?;
        Ok(values.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut values = self.values.write().map_err(|_| poisoned(self.name()))?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory_store"
    }
}

/// One file per key under a directory. Writes go to a temp file first and are
/// renamed into place, so a crash never leaves a half-written value.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_source(self.name())
                    .with_field_path(key),
            )),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file_store"
    }
}
