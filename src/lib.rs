//! consul-herald - Consul backend for herald service discovery
//!
//! Advertises running service instances in Consul, keeps them alive with
//! TTL check renewals, and stores service definitions in the Consul KV
//! store.
//!
//! ## Components
//!
//! - **Registrar**: registers an instance and owns its heartbeat
//! - **Heartbeat**: per-instance loop passing the TTL check every `TTL - 1`s
//! - **Declarer**: publishes/fetches definitions at `{base}/{domain}/{title}/{version}/definition`
//! - **Keys**: pure name, ID and key derivations shared by the above
//! - **Herald**: the `Pool` and `Declare` capabilities exposed to the framework
//!
//! ```rust,no_run
//! use consul_herald::{ConsulConfig, ConsulHerald, Herald, HeraldConfig, Pool, ServiceDescriptor};
//!
//! # async fn example() -> consul_herald::Result<()> {
//! let herald = ConsulHerald::new(HeraldConfig::default(), ConsulConfig::default());
//! herald.init().await?;
//!
//! let service = ServiceDescriptor::new("example.com", "users", "1.2.0")
//!     .with_instance("10.0.0.4", "8080");
//! herald.start(&service).await?;
//! // ... serve traffic ...
//! herald.stop(&service).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod declarer;
pub mod error;
pub mod heartbeat;
pub mod herald;
pub mod keys;
pub mod logging;
pub mod registrar;
pub mod service;

pub use config::{Args, ConsulConfig, HeraldConfig};
pub use declarer::Declarer;
pub use error::{BackendError, HeraldError, Result};
pub use heartbeat::{HeartbeatHandle, HeartbeatState};
pub use herald::{ConsulHerald, Declare, Herald, Pool};
pub use registrar::Registrar;
pub use service::ServiceDescriptor;
