//! Consul agent HTTP backend
//!
//! Talks to the local Consul agent's v1 API: service registration, TTL
//! check updates and the KV store. Retries and backoff are left to the
//! caller; each request is bounded only by the configured timeout.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{RegistryBackend, ServiceRegistration};
use crate::config::ConsulConfig;
use crate::error::{BackendError, HeraldError, Result};

/// One entry of a `GET /v1/kv/{key}` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KvEntry {
    /// Base64 payload; absent or null for an empty value
    #[serde(default)]
    value: Option<String>,
}

/// HTTP client for a Consul agent
pub struct ConsulBackend {
    config: ConsulConfig,
    base_url: String,
    client: Client,
}

impl ConsulBackend {
    /// Build a client from connection settings. No request is made until
    /// the first operation.
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = config.token {
            let value = header::HeaderValue::from_str(token).map_err(|e| {
                HeraldError::Configuration(format!("Invalid Consul token: {}", e))
            })?;
            headers.insert("X-Consul-Token", value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                HeraldError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        let base_url = config.base_url();
        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    fn agent_url(&self, path: &str) -> String {
        format!("{}/v1/agent{}", self.base_url, path)
    }

    fn kv_url(&self, key: &str) -> String {
        let mut url = format!("{}/v1/kv/{}", self.base_url, encode_key(key));
        if let Some(ref dc) = self.config.datacenter {
            url.push_str("?dc=");
            url.push_str(&urlencoding::encode(dc));
        }
        url
    }

    async fn expect_success(response: reqwest::Response) -> std::result::Result<(), BackendError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status,
                message: body,
            });
        }
        Ok(())
    }
}

/// Percent-encode each path segment of a KV key, keeping the separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extract the value of the first entry of a KV read response
fn decode_kv_body(body: &[u8]) -> std::result::Result<Vec<u8>, BackendError> {
    let entries: Vec<KvEntry> = serde_json::from_slice(body)
        .map_err(|e| BackendError::InvalidResponse(format!("KV response: {}", e)))?;

    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::InvalidResponse("KV response has no entries".to_string()))?;

    match entry.value {
        Some(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| BackendError::InvalidResponse(format!("KV value: {}", e))),
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl RegistryBackend for ConsulBackend {
    async fn register_instance(
        &self,
        registration: &ServiceRegistration,
    ) -> std::result::Result<(), BackendError> {
        debug!(instance_id = %registration.id, "Registering service with Consul agent");

        let response = self
            .client
            .put(self.agent_url("/service/register"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(registration)
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn deregister_instance(&self, instance_id: &str) -> std::result::Result<(), BackendError> {
        debug!(instance_id = %instance_id, "Deregistering service from Consul agent");

        let url = self.agent_url(&format!(
            "/service/deregister/{}",
            urlencoding::encode(instance_id)
        ));
        let response = self.client.put(url).send().await?;

        Self::expect_success(response).await
    }

    async fn pass_check(&self, check_id: &str, note: &str) -> std::result::Result<(), BackendError> {
        let url = self.agent_url(&format!(
            "/check/pass/{}?note={}",
            urlencoding::encode(check_id),
            urlencoding::encode(note)
        ));
        let response = self.client.put(url).send().await?;

        Self::expect_success(response).await
    }

    async fn kv_put(&self, key: &str, value: &[u8]) -> std::result::Result<(), BackendError> {
        debug!(key = %key, bytes = value.len(), "Writing KV entry");

        let response = self
            .client
            .put(self.kv_url(key))
            .body(value.to_vec())
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn kv_get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, BackendError> {
        let response = self.client.get(self.kv_url(key)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status,
                message: body,
            });
        }

        let body = response.bytes().await?;
        decode_kv_body(&body).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> ConsulConfig {
        ConsulConfig {
            address: "127.0.0.1:8500".to_string(),
            scheme: "http".to_string(),
            token: Some("secret".to_string()),
            datacenter: Some("dc1".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_urls() {
        let backend = ConsulBackend::new(config()).unwrap();
        assert_eq!(
            backend.agent_url("/service/register"),
            "http://127.0.0.1:8500/v1/agent/service/register"
        );
        assert_eq!(
            backend.kv_url("services/svc/api/1.2.0/definition"),
            "http://127.0.0.1:8500/v1/kv/services/svc/api/1.2.0/definition?dc=dc1"
        );
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("services/my svc/api"), "services/my%20svc/api");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let mut bad = config();
        bad.token = Some("line\nbreak".to_string());
        assert!(matches!(
            ConsulBackend::new(bad),
            Err(HeraldError::Configuration(_))
        ));
    }

    #[test]
    fn test_decode_kv_body() {
        let body = br#"[{"LockIndex":0,"Key":"services/svc/api/1/definition","Flags":0,"Value":"eyJEb21haW4iOiJzdmMifQ==","CreateIndex":10,"ModifyIndex":12}]"#;
        let value = decode_kv_body(body).unwrap();
        assert_eq!(value, br#"{"Domain":"svc"}"#.to_vec());
    }

    #[test]
    fn test_decode_kv_body_null_value() {
        let body = br#"[{"Key":"k","Value":null}]"#;
        assert!(decode_kv_body(body).unwrap().is_empty());
    }

    #[test]
    fn test_decode_kv_body_invalid() {
        assert!(matches!(
            decode_kv_body(b"[]"),
            Err(BackendError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_kv_body(br#"[{"Key":"k","Value":"%%%"}]"#),
            Err(BackendError::InvalidResponse(_))
        ));
    }
}
