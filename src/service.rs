//! Service descriptor shared by the pool and declaration capabilities

use serde::{Deserialize, Serialize};

/// Identifies a service and one running instance of it.
///
/// `(domain, title, version)` names the service; `host` and `port` narrow
/// it to a single process. Field names serialize in PascalCase so records
/// written by other herald backends decode unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDescriptor {
    pub domain: String,
    pub title: String,
    pub version: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
}

impl ServiceDescriptor {
    pub fn new(
        domain: impl Into<String>,
        title: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            title: title.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set the instance address
    pub fn with_instance(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.host = host.into();
        self.port = port.into();
        self
    }
}
