// # IP Source Trait
//
// Defines the interface for discovering the operator's current public IP.
//
// ## Implementations
//
// - HTTP echo service: `fwsync-ip-http` crate

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for public IP discovery
///
/// A single lookup per call; the engine applies its own deadline and maps any
/// failure to [`crate::Error::Discovery`].
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current public IP address
    async fn current(&self) -> Result<IpAddr, crate::Error>;
}
