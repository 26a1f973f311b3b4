//! Shared (remote) cache tier backends.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// The slower, shared layer behind [`TieredCache`](super::TieredCache).
///
/// Entirely optional: every failure is absorbed by the tiered cache, which
/// keeps serving from its local tier.
#[async_trait]
pub trait SharedTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;
    async fn ping(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
struct StoredValue {
    data: Bytes,
    expires_at: Instant,
}

/// In-process stand-in for a shared cache server. Useful for tests and for
/// single-node deployments; can be switched "offline" to exercise degradation.
pub struct MemorySharedTier {
    entries: RwLock<HashMap<String, StoredValue>>,
    max_entries: usize,
    online: AtomicBool,
}

impl MemorySharedTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::storage_with_context(
                "shared tier unreachable",
                ErrorContext::new().with_source(self.name()),
            ))
        }
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, StoredValue>) {
        let now = Instant::now();
        entries.retain(|_, v| v.expires_at > now);
        while entries.len() >= self.max_entries {
            let soonest = entries
                .iter()
                .min_by_key(|(_, v)| v.expires_at)
                .map(|(k, _)| k.clone());
            match soonest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

impl Default for MemorySharedTier {
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn poisoned() -> Error {
    Error::storage_with_context(
        "shared tier lock poisoned",
        ErrorContext::new().with_source("memory_shared_tier"),
    )
}

#[async_trait]
impl SharedTier for MemorySharedTier {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_online()?;
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(key)
            .filter(|v| v.expires_at > Instant::now())
            .map(|v| v.data.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.check_online()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        self.evict_if_needed(&mut entries);
        entries.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_online()
    }

    fn name(&self) -> &'static str {
        "memory_shared_tier"
    }
}
