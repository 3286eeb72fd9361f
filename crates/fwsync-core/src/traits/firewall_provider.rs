// # Firewall Provider Trait
//
// Defines the capability set every cloud backend must expose to be driven by
// the engine: List, Get and Update on a single named allow-list resource.
//
// ## Implementations
//
// - Google Cloud: `fwsync-provider-gcp` crate
// - Linode: `fwsync-provider-linode` crate
// - Future: AWS, Azure, DigitalOcean
//
// ## Usage
//
// ```rust,ignore
// use fwsync_core::FirewallProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* FirewallProvider implementation */;
//
//     let firewall = provider.get("alice-rule").await?;
//     println!("{:?}", firewall.allowed_addresses);
//
//     provider
//         .update("alice-rule", &["9.9.9.9/32".to_string()])
//         .await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Provider-neutral view of a remote firewall
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Firewall {
    /// Resource name as known to the provider
    pub name: String,
    /// Address specifiers currently allowed (CIDR or bare IP, provider convention)
    pub allowed_addresses: Vec<String>,
    /// Opaque provider-specific identifiers (e.g. a numeric resource id)
    ///
    /// Written and read only by the adapter that produced the value. The
    /// engine never interprets it.
    pub provider_metadata: HashMap<String, Value>,
}

impl Firewall {
    /// Create a firewall value without metadata
    pub fn new(name: impl Into<String>, allowed_addresses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            allowed_addresses,
            provider_metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provider_metadata.insert(key.into(), value.into());
        self
    }
}

/// Trait for firewall provider adapters
///
/// # Contract
///
/// - Adapters are stateless: nothing is cached between calls, so a name is
///   resolved to a backend id on every `get`/`update` that needs one.
/// - Adapters store exactly the addresses they are given. CIDR suffixes are
///   added by the engine before `update`.
/// - Adapters never retry and never swallow backend errors.
/// - Deadlines are owned by the caller. Dropping the returned future cancels
///   the in-flight request.
///
/// # Failure kinds
///
/// - [`crate::Error::NotFound`] when no resource matches `name`
/// - [`crate::Error::Ambiguous`] when more than one resource matches `name`
/// - [`crate::Error::Authentication`] for rejected credentials
#[async_trait]
pub trait FirewallProvider: Send + Sync {
    /// Enumerate every firewall visible in the configured scope
    async fn list(&self) -> Result<Vec<Firewall>, crate::Error>;

    /// Fetch the current state of one named firewall
    async fn get(&self, name: &str) -> Result<Firewall, crate::Error>;

    /// Replace the firewall's allowed addresses with exactly `source_addresses`
    ///
    /// # Idempotency
    ///
    /// This is a full replace, never an append. Calling it twice with the
    /// same input leaves the remote resource in the same state as calling it
    /// once.
    async fn update(&self, name: &str, source_addresses: &[String]) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing providers from configuration
pub trait FirewallProviderFactory: Send + Sync {
    /// Create an authenticated provider
    ///
    /// Credential problems surface here as [`crate::Error::Authentication`].
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn FirewallProvider>, crate::Error>;
}
