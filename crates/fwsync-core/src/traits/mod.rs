//! Core traits for fwsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`FirewallProvider`]: Read and replace a cloud firewall's allow-list
//! - [`IpSource`]: Discover the operator's current public IP
//! - [`ConfigStore`]: Load and save the local config record

pub mod firewall_provider;
pub mod ip_source;
pub mod config_store;

pub use firewall_provider::{Firewall, FirewallProvider, FirewallProviderFactory};
pub use ip_source::IpSource;
pub use config_store::ConfigStore;
