//! Configuration for the Consul herald
//!
//! CLI arguments and environment variable handling using clap. Library
//! callers can skip clap and build [`HeraldConfig`] / [`ConsulConfig`]
//! directly.

use clap::Parser;
use std::time::Duration;

use crate::error::{HeraldError, Result};
use crate::service::ServiceDescriptor;

/// Default TTL for service heartbeats (seconds)
pub const DEFAULT_TTL_SECS: u64 = 15;

/// Default KV prefix for service definitions
pub const DEFAULT_KV_PATH: &str = "services";

/// Settings shared by the registrar and the declarer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeraldConfig {
    /// TTL check window in seconds
    pub ttl_secs: u64,
    /// KV prefix under which service definitions are stored
    pub kv_base_path: String,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            kv_base_path: DEFAULT_KV_PATH.to_string(),
        }
    }
}

impl HeraldConfig {
    /// Renewal cadence: one second under the TTL window
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.saturating_sub(1))
    }

    /// TTL as Consul expects it, e.g. `"15s"`
    pub fn check_ttl(&self) -> String {
        format!("{}s", self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs < 2 {
            return Err(HeraldError::Configuration(format!(
                "TTL must be at least 2 seconds, got {}",
                self.ttl_secs
            )));
        }
        if self.kv_base_path.is_empty() {
            return Err(HeraldError::Configuration(
                "KV base path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consul agent connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulConfig {
    /// Agent address, `host:port`
    pub address: String,
    /// `http` or `https`
    pub scheme: String,
    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,
    /// Datacenter appended as `?dc=`
    pub datacenter: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ConsulConfig {
    /// Mirrors the Consul client defaults, honouring the standard
    /// `CONSUL_HTTP_*` environment variables.
    fn default() -> Self {
        let address =
            std::env::var("CONSUL_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8500".to_string());

        let ssl = std::env::var("CONSUL_HTTP_SSL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            address,
            scheme: if ssl { "https" } else { "http" }.to_string(),
            token: std::env::var("CONSUL_HTTP_TOKEN").ok().filter(|t| !t.is_empty()),
            datacenter: std::env::var("CONSUL_DATACENTER").ok().filter(|d| !d.is_empty()),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConsulConfig {
    /// Base URL of the agent API. An address that already carries a
    /// scheme is used as is.
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("{}://{}", self.scheme, address)
        }
    }
}

/// consul-herald - advertise a service in Consul and keep it alive
#[derive(Parser, Debug, Clone)]
#[command(name = "consul-herald")]
#[command(about = "Register a service with Consul and heartbeat its TTL check")]
pub struct Args {
    /// TTL for consul microservice heartbeats
    #[arg(long, env = "CONSUL_TTL", default_value_t = DEFAULT_TTL_SECS)]
    pub consul_ttl: u64,

    /// KV prefix for service definitions
    #[arg(long, env = "CONSUL_KV_PATH", default_value = DEFAULT_KV_PATH)]
    pub kv_path: String,

    /// Consul agent connection
    #[command(flatten)]
    pub consul: ConsulArgs,

    /// Service being advertised
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Also publish the service definition to the KV store
    #[arg(long, env = "HERALD_DECLARE", default_value = "false")]
    pub declare: bool,

    /// Use an in-process registry instead of Consul (no network)
    #[arg(long, env = "HERALD_DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Consul connection overrides; unset values keep the client defaults
#[derive(Parser, Debug, Clone)]
pub struct ConsulArgs {
    /// Consul agent address (host:port)
    #[arg(long, env = "CONSUL_HTTP_ADDR")]
    pub consul_addr: Option<String>,

    /// URL scheme (http or https)
    #[arg(long, env = "CONSUL_SCHEME")]
    pub consul_scheme: Option<String>,

    /// ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN")]
    pub consul_token: Option<String>,

    /// Datacenter
    #[arg(long, env = "CONSUL_DATACENTER")]
    pub consul_datacenter: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, env = "CONSUL_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,
}

/// Descriptor fields for the advertised service
#[derive(Parser, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long, env = "SERVICE_DOMAIN")]
    pub domain: String,

    #[arg(long, env = "SERVICE_TITLE")]
    pub title: String,

    #[arg(long, env = "SERVICE_VERSION")]
    pub version: String,

    #[arg(long, env = "SERVICE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "SERVICE_PORT")]
    pub port: String,
}

impl Args {
    pub fn herald_config(&self) -> HeraldConfig {
        HeraldConfig {
            ttl_secs: self.consul_ttl,
            kv_base_path: self.kv_path.clone(),
        }
    }

    /// Consul defaults with any CLI overrides applied
    pub fn consul_config(&self) -> ConsulConfig {
        let mut config = ConsulConfig::default();
        if let Some(ref addr) = self.consul.consul_addr {
            config.address = addr.clone();
        }
        if let Some(ref scheme) = self.consul.consul_scheme {
            config.scheme = scheme.clone();
        }
        if self.consul.consul_token.is_some() {
            config.token = self.consul.consul_token.clone();
        }
        if self.consul.consul_datacenter.is_some() {
            config.datacenter = self.consul.consul_datacenter.clone();
        }
        config.timeout = Duration::from_millis(self.consul.request_timeout_ms);
        config
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor::new(
            self.service.domain.clone(),
            self.service.title.clone(),
            self.service.version.clone(),
        )
        .with_instance(self.service.host.clone(), self.service.port.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.herald_config().validate()?;
        if let Some(ref scheme) = self.consul.consul_scheme {
            if scheme != "http" && scheme != "https" {
                return Err(HeraldError::Configuration(format!(
                    "Unsupported scheme {:?}",
                    scheme
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "consul-herald",
            "--domain",
            "svc",
            "--title",
            "api",
            "--version",
            "1.2.0",
            "--port",
            "8080",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_herald_config_defaults() {
        let config = HeraldConfig::default();
        assert_eq!(config.ttl_secs, 15);
        assert_eq!(config.kv_base_path, "services");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(14));
        assert_eq!(config.check_ttl(), "15s");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_too_small_rejected() {
        let config = HeraldConfig {
            ttl_secs: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HeraldError::Configuration(_))
        ));
    }

    #[test]
    fn test_base_url() {
        let mut config = ConsulConfig {
            address: "consul.local:8500".to_string(),
            scheme: "https".to_string(),
            token: None,
            datacenter: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(config.base_url(), "https://consul.local:8500");

        config.address = "http://10.0.0.5:8500/".to_string();
        assert_eq!(config.base_url(), "http://10.0.0.5:8500");
    }

    #[test]
    fn test_args_overrides() {
        let args = parse(&[
            "--consul-ttl",
            "30",
            "--kv-path",
            "registry",
            "--consul-addr",
            "consul:8500",
            "--consul-datacenter",
            "dc2",
        ]);
        assert!(args.validate().is_ok());

        let herald = args.herald_config();
        assert_eq!(herald.ttl_secs, 30);
        assert_eq!(herald.kv_base_path, "registry");

        let consul = args.consul_config();
        assert_eq!(consul.address, "consul:8500");
        assert_eq!(consul.datacenter.as_deref(), Some("dc2"));

        let d = args.descriptor();
        assert_eq!(d.version, "1.2.0");
        assert_eq!(d.port, "8080");
        assert_eq!(d.host, "127.0.0.1");
    }

    #[test]
    fn test_args_bad_scheme() {
        let args = parse(&["--consul-scheme", "ftp"]);
        assert!(args.validate().is_err());
    }
}
