// # Memory Config Store
//
// In-memory implementation of ConfigStore.
//
// ## Purpose
//
// Lets the engine run without touching the filesystem: embedding fwsync in
// another program, or driving the engine from tests. Clones share the same
// record, so a test can keep a handle and inspect what the engine saved.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::config::FirewallConfig;
use crate::traits::ConfigStore;

/// In-memory config store
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<Option<FirewallConfig>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryConfigStore {
    /// Create an empty store (loading fails with `ConfigNotFound`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `config`
    pub fn with_config(config: FirewallConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(config))),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current record, if any
    pub async fn snapshot(&self) -> Option<FirewallConfig> {
        self.inner.read().await.clone()
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<FirewallConfig, Error> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::ConfigNotFound(PathBuf::from(self.location())))
    }

    async fn save(&self, config: &FirewallConfig) -> Result<(), Error> {
        *self.inner.write().await = Some(config.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
