//! Canonical identifiers derived from a service descriptor
//!
//! Every function here is pure. Registrar and declarer both address the
//! registry through these so an instance registered by one process can be
//! found by another.

use crate::service::ServiceDescriptor;

/// Note attached to every TTL pass
pub const HEARTBEAT_NOTE: &str = "TTL heartbeat";

/// Registry service name: `domain-title-version` with dots replaced by dashes
pub fn service_name(service: &ServiceDescriptor) -> String {
    format!("{}-{}-{}", service.domain, service.title, service.version).replace('.', "-")
}

/// Unique ID of one running instance
pub fn instance_id(service: &ServiceDescriptor) -> String {
    format!("{}-{}-{}", service_name(service), service.host, service.port)
}

/// ID of the TTL check Consul creates for a service-embedded check
pub fn check_id(service: &ServiceDescriptor) -> String {
    format!("service:{}", instance_id(service))
}

/// KV key holding the service definition. Uses raw field values and
/// ignores host/port, so all instances share one record.
pub fn declaration_key(base: &str, service: &ServiceDescriptor) -> String {
    format!(
        "{}/{}/{}/{}/definition",
        base, service.domain, service.title, service.version
    )
}
