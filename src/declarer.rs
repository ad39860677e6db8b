//! Service definition storage in the registry KV store

use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::RegistryBackend;
use crate::config::HeraldConfig;
use crate::error::{HeraldError, Result};
use crate::keys;
use crate::service::ServiceDescriptor;

/// Publishes and fetches service definitions.
///
/// One record per service (domain, title, version), shared by all of its
/// instances. Writes overwrite; the last writer wins.
pub struct Declarer {
    backend: Arc<dyn RegistryBackend>,
    kv_base_path: String,
}

impl Declarer {
    pub fn new(backend: Arc<dyn RegistryBackend>, config: &HeraldConfig) -> Self {
        Self {
            backend,
            kv_base_path: config.kv_base_path.clone(),
        }
    }

    pub fn key(&self, service: &ServiceDescriptor) -> String {
        keys::declaration_key(&self.kv_base_path, service)
    }

    /// Store the JSON-encoded descriptor under its declaration key
    pub async fn declare(&self, service: &ServiceDescriptor) -> Result<()> {
        let payload =
            serde_json::to_vec(service).map_err(|e| HeraldError::Encoding(e.to_string()))?;
        let key = self.key(service);

        self.backend.kv_put(&key, &payload).await?;

        info!(key = %key, "Service definition declared");
        Ok(())
    }

    /// Replace `service` with the stored definition.
    ///
    /// Only domain, title and version need to be set beforehand. On any
    /// error the descriptor is left untouched.
    pub async fn fetch(&self, service: &mut ServiceDescriptor) -> Result<()> {
        let key = self.key(service);

        let payload = self
            .backend
            .kv_get(&key)
            .await?
            .ok_or_else(|| HeraldError::NotFound(key.clone()))?;

        let decoded: ServiceDescriptor =
            serde_json::from_slice(&payload).map_err(|e| HeraldError::Decoding {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        debug!(key = %key, "Service definition fetched");
        *service = decoded;
        Ok(())
    }
}
