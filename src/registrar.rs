//! Instance registration lifecycle
//!
//! `start` registers an instance with a TTL check, passes the check once
//! and spawns a [`HeartbeatHandle`] for it; `stop` cancels the heartbeat
//! and deregisters. Handles are kept per instance ID, each behind its own
//! async mutex, so start/stop for one instance are serialized while
//! different instances never wait on each other.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::{CheckSpec, RegistryBackend, ServiceRegistration};
use crate::config::HeraldConfig;
use crate::error::{HeraldError, Result};
use crate::heartbeat::HeartbeatHandle;
use crate::keys::{self, HEARTBEAT_NOTE};
use crate::service::ServiceDescriptor;

/// Registration of one instance. After a failed deregistration the
/// handle stays in its slot with the heartbeat cancelled, so `stop` can be
/// retried.
struct RegistrationHandle {
    instance_id: String,
    heartbeat: HeartbeatHandle,
}

type Slot = Arc<Mutex<Option<RegistrationHandle>>>;

/// Registers instances and keeps them alive
pub struct Registrar {
    backend: Arc<dyn RegistryBackend>,
    config: HeraldConfig,
    instances: DashMap<String, Slot>,
}

impl Registrar {
    pub fn new(backend: Arc<dyn RegistryBackend>, config: HeraldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            instances: DashMap::new(),
        })
    }

    /// Register an instance and start its heartbeat.
    ///
    /// Fails without contacting the registry when the port is not an
    /// integer or the instance is already registered through this
    /// registrar. Registry failures are returned as is, no retry. An
    /// instance whose deregistration failed can be started again.
    pub async fn start(&self, service: &ServiceDescriptor) -> Result<()> {
        let port = parse_port(&service.port)?;
        let instance_id = keys::instance_id(service);

        let registration = ServiceRegistration {
            id: instance_id.clone(),
            name: keys::service_name(service),
            address: (!service.host.is_empty()).then(|| service.host.clone()),
            port,
            check: CheckSpec {
                ttl: self.config.check_ttl(),
            },
        };

        let slot = self.slot(&instance_id);
        let mut guard = slot.lock().await;
        if guard
            .as_ref()
            .is_some_and(|handle| !handle.heartbeat.is_cancel_requested())
        {
            return Err(HeraldError::AlreadyRegistered(instance_id));
        }

        if let Err(e) = self.backend.register_instance(&registration).await {
            drop(guard);
            drop(slot);
            self.prune(&instance_id);
            return Err(e.into());
        }

        // Pass once now so the instance is not critical until the first tick
        let check_id = keys::check_id(service);
        if let Err(e) = self.backend.pass_check(&check_id, HEARTBEAT_NOTE).await {
            warn!(
                instance_id = %instance_id,
                error = %e,
                "Initial TTL pass failed, heartbeat will retry"
            );
        }

        let heartbeat = HeartbeatHandle::spawn(
            Arc::clone(&self.backend),
            check_id,
            self.config.heartbeat_interval(),
        );
        *guard = Some(RegistrationHandle {
            instance_id: instance_id.clone(),
            heartbeat,
        });

        info!(
            instance_id = %instance_id,
            ttl = %registration.check.ttl,
            "Service registered"
        );
        Ok(())
    }

    /// Cancel an instance's heartbeat and deregister it.
    ///
    /// The heartbeat is signalled, not awaited: one renewal may still
    /// reach the registry around the deregistration.
    pub async fn stop(&self, service: &ServiceDescriptor) -> Result<()> {
        self.stop_instance(&keys::instance_id(service)).await
    }

    /// Stop every instance started through this registrar. All instances
    /// are attempted; the first error is returned.
    pub async fn stop_all(&self) -> Result<()> {
        let mut first_error = None;
        for instance_id in self.active_instances().await {
            if let Err(e) = self.stop_instance(&instance_id).await {
                warn!(instance_id = %instance_id, error = %e, "Failed to stop instance");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn is_active(&self, service: &ServiceDescriptor) -> bool {
        let slot = match self.instances.get(&keys::instance_id(service)) {
            Some(slot) => Arc::clone(slot.value()),
            None => return false,
        };
        let active = slot.lock().await.is_some();
        drop(slot);
        if !active {
            self.prune(&keys::instance_id(service));
        }
        active
    }

    /// IDs of instances with a live registration
    pub async fn active_instances(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .instances
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut active = Vec::new();
        let mut empty = Vec::new();
        for (instance_id, slot) in slots {
            if slot.lock().await.is_some() {
                active.push(instance_id);
            } else {
                empty.push(instance_id);
            }
        }
        for instance_id in empty {
            self.prune(&instance_id);
        }
        active.sort();
        active
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        let slot = match self.instances.get(instance_id) {
            Some(slot) => Arc::clone(slot.value()),
            None => return Err(HeraldError::UnknownInstance(instance_id.to_string())),
        };

        let mut guard = slot.lock().await;
        let result = match guard.take() {
            Some(mut handle) => {
                handle.heartbeat.cancel();
                let result = self
                    .backend
                    .deregister_instance(&handle.instance_id)
                    .await
                    .map_err(HeraldError::from);
                if result.is_err() {
                    // Still in the registry; keep it so stop can be retried
                    *guard = Some(handle);
                }
                result
            }
            None => Err(HeraldError::UnknownInstance(instance_id.to_string())),
        };
        drop(guard);
        drop(slot);
        self.prune(instance_id);

        result?;
        info!(instance_id = %instance_id, "Service deregistered");
        Ok(())
    }

    fn slot(&self, instance_id: &str) -> Slot {
        Arc::clone(
            self.instances
                .entry(instance_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Drop an empty slot nobody else is waiting on
    fn prune(&self, instance_id: &str) {
        self.instances.remove_if(instance_id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|guard| guard.is_none()).unwrap_or(false)
        });
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>().map_err(|e| HeraldError::InvalidPort {
        port: port.to_string(),
        reason: e.to_string(),
    })
}
