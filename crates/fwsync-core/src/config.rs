//! Configuration types for fwsync
//!
//! [`FirewallConfig`] is the persisted record: which provider and firewall to
//! drive, and the bounded, oldest-first history of source IPs that should be
//! allowed through it. [`EngineConfig`] holds runtime knobs for the engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of source IPs retained when the record does not say otherwise
pub const DEFAULT_IP_LIMIT: usize = 5;

/// Provider assumed for records written before the `provider` key existed
pub const LEGACY_PROVIDER: &str = "google";

/// The persisted fwsync record
///
/// ```json
/// {
///   "provider": "linode",
///   "ip_limit": 5,
///   "name": "alice-rule",
///   "ips": ["9.9.9.9", "8.8.8.8"]
/// }
/// ```
///
/// `source_ips` is ordered oldest first. After any mutation through
/// [`FirewallConfig::add`] its length does not exceed the effective limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Adapter tag (e.g. "google", "linode")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Backend scope such as a GCP project id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Maximum number of retained source IPs (0 means unset)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ip_limit: usize,

    /// Name of the remote firewall resource
    pub name: String,

    /// Source IP history, oldest first
    #[serde(rename = "ips", default)]
    pub source_ips: Vec<String>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl FirewallConfig {
    /// Create an empty record with the default IP limit
    pub fn new() -> Self {
        Self {
            provider: None,
            project: None,
            ip_limit: DEFAULT_IP_LIMIT,
            name: String::new(),
            source_ips: Vec::new(),
        }
    }

    /// Set the provider tag
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the backend scope; an empty string clears it
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        let project = project.into();
        self.project = (!project.is_empty()).then_some(project);
        self
    }

    /// Set the firewall resource name
    pub fn with_firewall(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the IP limit; zero keeps the current value
    pub fn with_ip_limit(mut self, limit: usize) -> Self {
        if limit > 0 {
            self.ip_limit = limit;
        }
        self
    }

    /// Seed the source IPs
    ///
    /// Entries beyond the effective limit are dropped from the end without
    /// notice.
    pub fn with_source_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let limit = self.effective_ip_limit();
        self.source_ips = ips.into_iter().take(limit).map(Into::into).collect();
        self
    }

    /// The IP limit with an unset (zero) value replaced by the default
    pub fn effective_ip_limit(&self) -> usize {
        if self.ip_limit == 0 {
            DEFAULT_IP_LIMIT
        } else {
            self.ip_limit
        }
    }

    /// Provider settings used to resolve an adapter from the registry
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            name: self
                .provider
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| LEGACY_PROVIDER.to_string()),
            project: self.project.clone(),
        }
    }

    /// Position of the first occurrence of `ip` in the history
    pub fn has_ip(&self, ip: &str) -> Option<usize> {
        self.source_ips.iter().position(|sip| sip == ip)
    }

    /// Append `ip` to the history, evicting the oldest entry when full
    ///
    /// An empty `ip` is ignored. At most one entry is evicted per call; a
    /// history already longer than a shrunk limit is never bulk-truncated
    /// here. An unset limit is repaired to [`DEFAULT_IP_LIMIT`] first.
    pub fn add(&mut self, ip: impl Into<String>) {
        let ip = ip.into();
        if ip.is_empty() {
            return;
        }
        if self.ip_limit == 0 {
            self.ip_limit = DEFAULT_IP_LIMIT;
        }
        if self.source_ips.len() >= self.ip_limit {
            self.source_ips.remove(0);
        }
        self.source_ips.push(ip);
    }

    /// Remove the first occurrence of `ip`, keeping the order of the rest
    pub fn remove(&mut self, ip: &str) {
        if ip.is_empty() {
            return;
        }
        if let Some(idx) = self.has_ip(ip) {
            self.source_ips.remove(idx);
        }
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings an adapter factory needs to build a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Registry tag of the adapter
    pub name: String,
    /// Optional backend scope (project, account, ...)
    pub project: Option<String>,
}

impl ProviderConfig {
    /// Create provider settings
    pub fn new(name: impl Into<String>, project: Option<String>) -> Self {
        Self {
            name: name.into(),
            project: project.filter(|p| !p.is_empty()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline applied to every external call (discovery and provider)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl EngineConfig {
    /// Per-call timeout as a duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    5
}
