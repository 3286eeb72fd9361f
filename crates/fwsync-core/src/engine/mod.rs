//! Core reconciliation engine
//!
//! The FirewallSyncEngine is responsible for:
//! - Loading the local config record
//! - Discovering the current public IP
//! - Maintaining the bounded IP history
//! - Persisting the record after every mutation
//! - Pushing the history to the remote firewall as one full replace
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐        ┌────────────────────┐        ┌──────────────────┐
//! │  IpSource   │──ip──▶ │ FirewallSyncEngine │──────▶ │ FirewallProvider │──▶ cloud API
//! └─────────────┘        └────────────────────┘        └──────────────────┘
//!                                 │    ▲
//!                            save │    │ load
//!                                 ▼    │
//!                            ┌──────────────┐
//!                            │ ConfigStore  │
//!                            └──────────────┘
//! ```
//!
//! ## Update cycle
//!
//! 1. Load the record (fatal if missing or malformed)
//! 2. Resolve the provider named in the record
//! 3. Discover the public IP (fatal on failure, nothing mutated)
//! 4. If the IP is already in the history, stop: up to date, no API call
//! 5. Otherwise add it (evicting the oldest entry when full) and save
//! 6. Push every entry as a single-host range in one `update` call
//!
//! The engine never reads remote state to decide what to write. Remote state
//! is only fetched for [`FirewallSyncEngine::list`], which is informational.
//! Every external call runs under the configured per-call timeout and nothing
//! is retried.

use crate::config::{EngineConfig, FirewallConfig};
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;
use crate::traits::{ConfigStore, Firewall, FirewallProvider, IpSource};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prefix length appended to bare addresses before they are pushed
pub const SINGLE_HOST_SUFFIX: &str = "/32";

/// Terminal state of an update cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The discovered IP was already in the history; nothing was written
    Unchanged {
        /// Discovered public IP
        ip: String,
    },

    /// The IP was added, the record saved and the firewall replaced
    Synced {
        /// Discovered public IP
        ip: String,
        /// Address list sent to the provider
        addresses: Vec<String>,
    },
}

/// Local and remote views of the allow-list, side by side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallListing {
    /// Where the local record lives
    pub location: String,
    /// Firewall resource name
    pub name: String,
    /// Local history, oldest first
    pub local: Vec<String>,
    /// Addresses currently active on the remote firewall
    pub remote: Vec<String>,
}

/// Result of a completed initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    /// The record as saved
    pub config: FirewallConfig,
    /// Discovered public IP the record was seeded with
    pub ip: String,
    /// Address list sent to the provider
    pub addresses: Vec<String>,
}

/// Chooses which remote firewall a new record should drive
///
/// Implemented by the CLI's interactive prompt; tests script it.
pub trait FirewallSelector {
    /// Return the index of the chosen firewall in `firewalls`
    fn select(&mut self, firewalls: &[Firewall]) -> Result<usize>;

    /// Called when the chosen firewall vanished before it could be used
    fn not_found(&mut self, _name: &str) {}
}

/// Reconciliation engine
///
/// One engine serves one invocation. The provider is resolved from the
/// registry once per operation, after the record has been loaded.
pub struct FirewallSyncEngine {
    /// Local record storage
    store: Box<dyn ConfigStore>,

    /// Public IP discovery
    ip_source: Box<dyn IpSource>,

    /// Adapter factories keyed by provider tag
    registry: ProviderRegistry,

    /// Deadline for every external call
    call_timeout: Duration,
}

impl FirewallSyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `store`: Config store holding (or about to hold) the record
    /// - `ip_source`: Public IP discovery implementation
    /// - `registry`: Registry with every available adapter registered
    /// - `config`: Engine settings
    pub fn new(
        store: Box<dyn ConfigStore>,
        ip_source: Box<dyn IpSource>,
        registry: ProviderRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ip_source,
            registry,
            call_timeout: config.call_timeout(),
        }
    }

    /// Run one update cycle
    ///
    /// # Returns
    ///
    /// - `Ok(UpdateOutcome::Unchanged)`: IP already allowed, sync skipped
    /// - `Ok(UpdateOutcome::Synced)`: History updated, saved and pushed
    /// - `Err(Error::Sync)`: The record was saved but the push failed
    /// - `Err(Error)`: Any failure before the record was mutated
    pub async fn update(&self) -> Result<UpdateOutcome> {
        let mut config = self.store.load().await?;
        debug!("update cycle: loaded record for firewall {}", config.name);

        let provider = self.registry.create_provider(&config.provider_config())?;

        let ip = self.discover().await?;
        debug!("update cycle: discovered {}", ip);

        if let Some(idx) = config.has_ip(&ip) {
            debug!("update cycle: {} already allowed at position {}, skipping sync", ip, idx);
            return Ok(UpdateOutcome::Unchanged { ip });
        }

        config.add(ip.clone());
        debug!(
            "update cycle: history now {:?} (limit {})",
            config.source_ips, config.ip_limit
        );

        self.store.save(&config).await?;
        debug!("update cycle: record persisted to {}", self.store.location());

        let addresses = self
            .push(provider.as_ref(), &config)
            .await
            .map_err(Error::sync)?;

        Ok(UpdateOutcome::Synced { ip, addresses })
    }

    /// Push the local history to the firewall without discovering an IP
    ///
    /// Always performs the remote call, which makes it the recovery path
    /// after a failed push or out-of-band edits to the firewall.
    pub async fn sync(&self) -> Result<Vec<String>> {
        let config = self.store.load().await?;
        let provider = self.registry.create_provider(&config.provider_config())?;
        self.push(provider.as_ref(), &config).await
    }

    /// Fetch local and remote allow-lists for display
    ///
    /// Read-only: nothing is reconciled or written.
    pub async fn list(&self) -> Result<FirewallListing> {
        let config = self.store.load().await?;
        let provider = self.registry.create_provider(&config.provider_config())?;

        let remote = self
            .bounded("firewall get", provider.get(&config.name))
            .await?;

        Ok(FirewallListing {
            location: self.store.location(),
            name: config.name,
            local: config.source_ips,
            remote: remote.allowed_addresses,
        })
    }

    /// Discover the current public IP without touching any state
    pub async fn current_ip(&self) -> Result<String> {
        self.discover().await
    }

    /// Create a record for a freshly chosen firewall and sync it
    ///
    /// `seed` carries the provider, scope and IP limit; its name and history
    /// are replaced by the selected firewall and the discovered IP. Any
    /// addresses already on the remote firewall are overwritten by the push.
    pub async fn initialize(
        &self,
        seed: FirewallConfig,
        selector: &mut dyn FirewallSelector,
    ) -> Result<InitOutcome> {
        let provider = self.registry.create_provider(&seed.provider_config())?;

        let firewall = loop {
            let firewalls = self.bounded("firewall list", provider.list()).await?;
            if firewalls.is_empty() {
                return Err(Error::not_found(format!(
                    "no firewalls visible to the {} provider",
                    provider.provider_name()
                )));
            }

            let idx = selector.select(&firewalls)?;
            let candidate = firewalls.get(idx).ok_or_else(|| {
                Error::invalid_input(format!(
                    "selection {} is out of range 0-{}",
                    idx,
                    firewalls.len() - 1
                ))
            })?;

            match self
                .bounded("firewall get", provider.get(&candidate.name))
                .await
            {
                Ok(firewall) => break firewall,
                Err(e) if e.is_not_found() => {
                    warn!("Selected firewall {} no longer exists: {}", candidate.name, e);
                    selector.not_found(&candidate.name);
                }
                Err(e) => return Err(e),
            }
        };

        let ip = self.discover().await?;

        let mut config = seed;
        config.name = firewall.name;
        config.source_ips.clear();
        config.add(ip.clone());

        self.store.save(&config).await?;
        info!(
            "Initialized record for firewall {} at {}",
            config.name,
            self.store.location()
        );

        let addresses = self
            .push(provider.as_ref(), &config)
            .await
            .map_err(Error::sync)?;

        Ok(InitOutcome {
            config,
            ip,
            addresses,
        })
    }

    /// Replace the remote allow-list with the record's history
    async fn push(
        &self,
        provider: &dyn FirewallProvider,
        config: &FirewallConfig,
    ) -> Result<Vec<String>> {
        let addresses = source_ranges(&config.source_ips);

        info!(
            "Syncing {} address(es) to {} firewall {}",
            addresses.len(),
            provider.provider_name(),
            config.name
        );
        self.bounded("firewall update", provider.update(&config.name, &addresses))
            .await?;

        Ok(addresses)
    }

    /// Discover the public IP under the call deadline
    async fn discover(&self) -> Result<String> {
        let ip = match tokio::time::timeout(self.call_timeout, self.ip_source.current()).await {
            Ok(Ok(ip)) => ip,
            Ok(Err(Error::Discovery(message))) => return Err(Error::Discovery(message)),
            Ok(Err(e)) => return Err(Error::discovery(e.to_string())),
            Err(_) => {
                return Err(Error::discovery(format!(
                    "timed out after {:?}",
                    self.call_timeout
                )));
            }
        };

        if !ip.is_ipv4() {
            return Err(Error::discovery(format!(
                "discovered {} but only IPv4 addresses are supported",
                ip
            )));
        }

        Ok(ip.to_string())
    }

    /// Run a provider call under the call deadline
    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, self.call_timeout)),
        }
    }
}

/// Convert history entries to the range list pushed to providers
///
/// Bare addresses get [`SINGLE_HOST_SUFFIX`]; entries that already carry a
/// prefix length pass through unchanged.
pub fn source_ranges(ips: &[String]) -> Vec<String> {
    ips.iter()
        .map(|ip| {
            if ip.contains('/') {
                ip.clone()
            } else {
                format!("{}{}", ip, SINGLE_HOST_SUFFIX)
            }
        })
        .collect()
}
