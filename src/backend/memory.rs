//! In-process registry backend
//!
//! Keeps registrations, check state and KV entries in memory and records
//! every call it receives. Used for local runs without a Consul agent and
//! by the test suite, which can also make individual operations fail.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::{RegistryBackend, ServiceRegistration};
use crate::error::BackendError;

/// Operations of [`RegistryBackend`], used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Deregister,
    PassCheck,
    KvPut,
    KvGet,
}

/// A call received by the backend, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Register(ServiceRegistration),
    Deregister(String),
    PassCheck { check_id: String, note: String },
    KvPut(String),
    KvGet(String),
}

/// In-memory registry
#[derive(Default)]
pub struct MemoryBackend {
    services: DashMap<String, ServiceRegistration>,
    kv: DashMap<String, Vec<u8>>,
    calls: Mutex<Vec<BackendCall>>,
    failing: Mutex<HashSet<Operation>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `operation` fail (or succeed again)
    pub fn set_failing(&self, operation: Operation, failing: bool) {
        let mut set = lock(&self.failing);
        if failing {
            set.insert(operation);
        } else {
            set.remove(&operation);
        }
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Number of pass signals received for a check, failed ones included
    pub fn pass_count(&self, check_id: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, BackendCall::PassCheck { check_id: id, .. } if id == check_id))
            .count()
    }

    /// Number of registration attempts
    pub fn register_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, BackendCall::Register(_)))
            .count()
    }

    pub fn registration(&self, instance_id: &str) -> Option<ServiceRegistration> {
        self.services.get(instance_id).map(|r| r.value().clone())
    }

    pub fn is_registered(&self, instance_id: &str) -> bool {
        self.services.contains_key(instance_id)
    }

    /// Write a raw KV value, bypassing call recording
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        self.kv.insert(key.to_string(), value.to_vec());
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.kv.get(key).map(|v| v.value().clone())
    }

    fn record(&self, call: BackendCall, operation: Operation) -> Result<(), BackendError> {
        lock(&self.calls).push(call);
        if lock(&self.failing).contains(&operation) {
            return Err(BackendError::Unavailable(format!(
                "{:?} rejected by memory backend",
                operation
            )));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RegistryBackend for MemoryBackend {
    async fn register_instance(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Register(registration.clone()), Operation::Register)?;
        self.services
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn deregister_instance(&self, instance_id: &str) -> Result<(), BackendError> {
        self.record(
            BackendCall::Deregister(instance_id.to_string()),
            Operation::Deregister,
        )?;
        self.services.remove(instance_id);
        Ok(())
    }

    async fn pass_check(&self, check_id: &str, note: &str) -> Result<(), BackendError> {
        self.record(
            BackendCall::PassCheck {
                check_id: check_id.to_string(),
                note: note.to_string(),
            },
            Operation::PassCheck,
        )
    }

    async fn kv_put(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        self.record(BackendCall::KvPut(key.to_string()), Operation::KvPut)?;
        self.kv.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.record(BackendCall::KvGet(key.to_string()), Operation::KvGet)?;
        Ok(self.kv.get(key).map(|v| v.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CheckSpec;

    fn registration(id: &str) -> ServiceRegistration {
        ServiceRegistration {
            id: id.to_string(),
            name: "svc-api-1".to_string(),
            address: None,
            port: 80,
            check: CheckSpec {
                ttl: "15s".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_register_and_deregister() {
        let backend = MemoryBackend::new();
        backend.register_instance(&registration("a")).await.unwrap();
        assert!(backend.is_registered("a"));

        backend.deregister_instance("a").await.unwrap();
        assert!(!backend.is_registered("a"));
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let backend = MemoryBackend::new();
        backend.set_failing(Operation::Register, true);

        let result = backend.register_instance(&registration("a")).await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert!(!backend.is_registered("a"));
        assert_eq!(backend.register_count(), 1);

        backend.set_failing(Operation::Register, false);
        backend.register_instance(&registration("a")).await.unwrap();
        assert!(backend.is_registered("a"));
    }

    #[tokio::test]
    async fn test_kv_missing_key() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.kv_get("nope").await.unwrap(), None);

        backend.kv_put("k", b"v").await.unwrap();
        assert_eq!(backend.kv_get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
