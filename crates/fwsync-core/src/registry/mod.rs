//! Plugin-based provider registry
//!
//! The registry maps provider tags (`"google"`, `"linode"`, ...) to adapter
//! factories, so the engine can resolve the backend named in the config
//! record without a hard-coded switch.
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function that the binary calls once at
//! startup:
//!
//! ```rust,ignore
//! # use fwsync_core::registry::ProviderRegistry;
//! // In fwsync-provider-linode
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("linode", Box::new(LinodeFactory));
//! }
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{FirewallProvider, FirewallProviderFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Provider registry for plugin-based adapter creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered firewall provider factories
    providers: RwLock<HashMap<String, Box<dyn FirewallProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a firewall provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider tag as written in the config record (e.g., "google")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(
        &self,
        name: impl Into<String>,
        factory: Box<dyn FirewallProviderFactory>,
    ) {
        let name = name.into();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name, factory);
    }

    /// Create an authenticated provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn FirewallProvider>)`: Created provider instance
    /// - `Err(Error::InvalidProvider)`: The tag is not registered
    /// - `Err(Error)`: The factory failed (e.g. missing credentials)
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn FirewallProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers.get(&config.name).ok_or_else(|| {
            let mut known: Vec<&str> = providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            Error::invalid_provider(format!(
                "{} (supported: {})",
                config.name,
                known.join(", ")
            ))
        })?;

        tracing::debug!("Creating {} provider", config.name);
        factory.create(config)
    }

    /// List all registered provider tags, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider tag is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }
}
