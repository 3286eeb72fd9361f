// # Config Store Trait
//
// Defines the interface for loading and saving the local config record.
//
// ## Purpose
//
// The record is the desired state: the firewall to drive and the bounded
// history of source IPs. It is read at the start of every invocation and
// rewritten after every mutation.
//
// ## Implementations
//
// - File-based: `FileConfigStore` (one read/write handle per invocation)
// - In-memory: `MemoryConfigStore` (embedding and tests)

use async_trait::async_trait;

use crate::config::FirewallConfig;

/// Trait for config store implementations
///
/// Stores perform no validation beyond what the encoding itself guarantees.
/// A zero `ip_limit` is loaded as-is and repaired lazily by
/// [`FirewallConfig::add`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the record
    ///
    /// # Returns
    ///
    /// - `Ok(FirewallConfig)`: The decoded record
    /// - `Err(Error::ConfigNotFound)`: Nothing has been saved yet
    /// - `Err(Error::ConfigMalformed)`: The stored bytes do not decode
    async fn load(&self) -> Result<FirewallConfig, crate::Error>;

    /// Replace the stored record with `config`
    async fn save(&self, config: &FirewallConfig) -> Result<(), crate::Error>;

    /// Human-readable location of the record (for display)
    fn location(&self) -> String;
}
