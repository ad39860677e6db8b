//! Herald capabilities backed by Consul
//!
//! A herald backend offers two capabilities to the discovery framework:
//! a [`Pool`] that starts and stops an instance's presence, and a
//! [`Declare`] store for service definitions. [`ConsulHerald`] provides
//! both on top of one lazily built registry client.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::backend::{ConsulBackend, RegistryBackend};
use crate::config::{ConsulConfig, HeraldConfig};
use crate::declarer::Declarer;
use crate::error::{HeraldError, Result};
use crate::registrar::Registrar;
use crate::service::ServiceDescriptor;

/// Common surface of every herald backend
#[async_trait]
pub trait Herald: Send + Sync {
    /// Name the backend is registered under
    fn title(&self) -> &'static str;

    /// Build the registry client. Idempotent.
    async fn init(&self) -> Result<()>;
}

/// Presence of running instances
#[async_trait]
pub trait Pool: Herald {
    async fn start(&self, service: &ServiceDescriptor) -> Result<()>;
    async fn stop(&self, service: &ServiceDescriptor) -> Result<()>;
}

/// Service definition storage
#[async_trait]
pub trait Declare: Herald {
    async fn declare(&self, service: &ServiceDescriptor) -> Result<()>;
    async fn fetch(&self, service: &mut ServiceDescriptor) -> Result<()>;
}

struct Components {
    registrar: Registrar,
    declarer: Declarer,
}

/// Consul pool and declaration backend
pub struct ConsulHerald {
    config: HeraldConfig,
    consul: ConsulConfig,
    backend: Option<Arc<dyn RegistryBackend>>,
    components: OnceCell<Components>,
}

impl ConsulHerald {
    /// Title used when registering with the framework
    pub const TITLE: &'static str = "consul";

    /// Herald talking to the Consul agent described by `consul`
    pub fn new(config: HeraldConfig, consul: ConsulConfig) -> Self {
        Self {
            config,
            consul,
            backend: None,
            components: OnceCell::new(),
        }
    }

    /// Herald over an already constructed backend
    pub fn with_backend(config: HeraldConfig, backend: Arc<dyn RegistryBackend>) -> Self {
        Self {
            config,
            consul: ConsulConfig::default(),
            backend: Some(backend),
            components: OnceCell::new(),
        }
    }

    /// Connection settings; changes only take effect before `init()`
    pub fn consul_config_mut(&mut self) -> &mut ConsulConfig {
        &mut self.consul
    }

    pub fn is_initialized(&self) -> bool {
        self.components.initialized()
    }

    /// Stop every instance this herald started
    pub async fn shutdown(&self) -> Result<()> {
        match self.components.get() {
            Some(components) => components.registrar.stop_all().await,
            None => Ok(()),
        }
    }

    fn components(&self) -> Result<&Components> {
        self.components.get().ok_or(HeraldError::NotInitialized)
    }

    fn build(&self) -> Result<Components> {
        let backend: Arc<dyn RegistryBackend> = match self.backend {
            Some(ref backend) => Arc::clone(backend),
            None => {
                info!(address = %self.consul.base_url(), "Creating Consul client");
                Arc::new(ConsulBackend::new(self.consul.clone())?)
            }
        };

        Ok(Components {
            registrar: Registrar::new(Arc::clone(&backend), self.config.clone())?,
            declarer: Declarer::new(backend, &self.config),
        })
    }
}

#[async_trait]
impl Herald for ConsulHerald {
    fn title(&self) -> &'static str {
        Self::TITLE
    }

    async fn init(&self) -> Result<()> {
        self.components
            .get_or_try_init(|| async { self.build() })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Pool for ConsulHerald {
    async fn start(&self, service: &ServiceDescriptor) -> Result<()> {
        self.components()?.registrar.start(service).await
    }

    async fn stop(&self, service: &ServiceDescriptor) -> Result<()> {
        self.components()?.registrar.stop(service).await
    }
}

#[async_trait]
impl Declare for ConsulHerald {
    async fn declare(&self, service: &ServiceDescriptor) -> Result<()> {
        self.components()?.declarer.declare(service).await
    }

    async fn fetch(&self, service: &mut ServiceDescriptor) -> Result<()> {
        self.components()?.declarer.fetch(service).await
    }
}
