//! Registry backends
//!
//! The registrar and declarer only see [`RegistryBackend`]. Production
//! code talks to a Consul agent through [`ConsulBackend`]; development runs
//! and tests use the in-process [`MemoryBackend`].

pub mod consul;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use consul::ConsulBackend;
pub use memory::{BackendCall, MemoryBackend, Operation};

/// Health check attached to a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckSpec {
    /// Window after which the registry marks the instance critical, e.g. `"15s"`
    #[serde(rename = "TTL")]
    pub ttl: String,
}

/// Instance registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub port: u16,
    pub check: CheckSpec,
}

/// Operations the herald needs from a service registry.
///
/// Implementations must be safe for concurrent use: one client is shared
/// by every heartbeat task.
#[async_trait]
pub trait RegistryBackend: Send + Sync + 'static {
    /// Register (or re-register) an instance with its TTL check
    async fn register_instance(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<(), BackendError>;

    /// Remove an instance
    async fn deregister_instance(&self, instance_id: &str) -> Result<(), BackendError>;

    /// Mark a TTL check as passing. Idempotent.
    async fn pass_check(&self, check_id: &str, note: &str) -> Result<(), BackendError>;

    /// Store `value` at `key`, overwriting any existing value
    async fn kv_put(&self, key: &str, value: &[u8]) -> Result<(), BackendError>;

    /// Read `key`; `None` when the key does not exist
    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
}
