// # fwsync-core
//
// Core library for keeping a cloud firewall allow-list synchronized with the
// operator's current public IP address.
//
// ## Architecture Overview
//
// - **FirewallProvider**: Trait every cloud backend adapter implements (List, Get, Update)
// - **IpSource**: Trait for discovering the current public IP
// - **ConfigStore**: Trait for loading and saving the local config record
// - **FirewallConfig**: The persisted record and its bounded IP history
// - **FirewallSyncEngine**: Orchestrates load → discover → mutate → persist → sync
// - **ProviderRegistry**: Maps provider tags to adapter factories
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The engine never speaks a backend's native API
// 2. **One-directional push**: Local history is desired state, remote is observed state
// 3. **Plugin-Based**: Adapters register themselves, no hard-coded provider switch
// 4. **Library-First**: The CLI is a thin wrapper over this crate
// 5. **Idempotency**: Every `Update` is a full replace of the allow-list

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{ConfigStore, FirewallProvider, IpSource};
pub use traits::{Firewall, FirewallProviderFactory};
pub use engine::{FirewallListing, FirewallSelector, FirewallSyncEngine, InitOutcome, UpdateOutcome};
pub use registry::ProviderRegistry;
pub use config::{DEFAULT_IP_LIMIT, EngineConfig, FirewallConfig, ProviderConfig};
pub use error::{Error, Result};
pub use state::{FileConfigStore, MemoryConfigStore};
