//! Authoritative lease table.
//!
//! # Responsibilities
//! - Upsert instances on registration, renew leases on heartbeat
//! - Remove instances on deregistration or lease expiry
//! - Answer lookups with the UP instances of a service
//!
//! # Design Decisions
//! - One `DashMap` entry per service: writers to the same service are
//!   serialized by the shard lock, different services never contend
//! - Lease age is measured on the monotonic clock; the wall-clock
//!   `last_heartbeat` is informational only
//! - Lookups may return instances whose lease ran out since the last sweep

use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::schema::RegistryConfig;
use crate::error::{MeshError, Result};
use crate::observability::metrics;
use crate::registry::instance::{epoch_millis, Instance, InstanceStatus, Lease, ServiceSummary};

#[derive(Debug, Clone)]
struct InstanceRecord {
    instance: Instance,
    renewed_at: Instant,
}

/// In-memory service registry.
#[derive(Debug)]
pub struct Registry {
    table: DashMap<String, HashMap<String, InstanceRecord>>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            table: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Insert or update an instance and start its lease.
    ///
    /// In strict mode a conflicting host/port for an existing id is rejected.
    pub fn register(&self, mut instance: Instance) -> Result<Lease> {
        instance.service_name = instance.service_name.to_lowercase();
        instance.last_heartbeat = epoch_millis();
        let service = instance.service_name.clone();
        let instance_id = instance.instance_id.clone();

        let mut entry = self.table.entry(service.clone()).or_default();
        if let Some(existing) = entry.get(&instance_id) {
            let conflicting = existing.instance.host != instance.host
                || existing.instance.port != instance.port;
            if conflicting && self.config.strict {
                tracing::warn!(
                    service = %service,
                    instance_id = %instance_id,
                    existing = %existing.instance.address(),
                    requested = %instance.address(),
                    "Rejected conflicting registration"
                );
                return Err(MeshError::DuplicateInstance {
                    service,
                    instance_id,
                });
            }
        }

        tracing::info!(
            service = %service,
            instance_id = %instance_id,
            address = %instance.address(),
            status = %instance.status,
            "Instance registered"
        );
        entry.insert(
            instance_id.clone(),
            InstanceRecord {
                instance,
                renewed_at: Instant::now(),
            },
        );
        metrics::record_registry_instances(&service, entry.len());
        drop(entry);

        Ok(Lease {
            service_name: service,
            instance_id,
            duration_secs: self.config.lease_duration_secs,
            renewal_interval_secs: self.config.renewal_interval_secs,
        })
    }

    /// Renew the lease of a registered instance, optionally changing its status.
    ///
    /// Returns `NotFound` once the instance has been evicted; the caller must register again.
    pub fn heartbeat(
        &self,
        service: &str,
        instance_id: &str,
        status: Option<InstanceStatus>,
    ) -> Result<()> {
        let service = service.to_lowercase();
        let mut entry = self
            .table
            .get_mut(&service)
            .ok_or_else(|| not_found(&service, instance_id))?;
        let record = entry
            .get_mut(instance_id)
            .ok_or_else(|| not_found(&service, instance_id))?;

        record.renewed_at = Instant::now();
        record.instance.last_heartbeat = epoch_millis();
        if let Some(status) = status {
            if status != record.instance.status {
                tracing::info!(
                    service = %service,
                    instance_id = %instance_id,
                    from = %record.instance.status,
                    to = %status,
                    "Instance status changed"
                );
                record.instance.status = status;
            }
        }
        tracing::trace!(service = %service, instance_id = %instance_id, "Lease renewed");
        Ok(())
    }

    /// Remove an instance immediately.
    pub fn deregister(&self, service: &str, instance_id: &str) -> Result<()> {
        let service = service.to_lowercase();
        let removed = match self.table.get_mut(&service) {
            Some(mut entry) => {
                let removed = entry.remove(instance_id);
                metrics::record_registry_instances(&service, entry.len());
                removed
            }
            None => None,
        };
        self.table.remove_if(&service, |_, instances| instances.is_empty());

        match removed {
            Some(_) => {
                tracing::info!(service = %service, instance_id = %instance_id, "Instance deregistered");
                Ok(())
            }
            None => Err(not_found(&service, instance_id)),
        }
    }

    /// UP instances of a service, ordered by instance id. Empty when none exist.
    pub fn lookup(&self, service: &str) -> Vec<Instance> {
        let mut instances: Vec<Instance> = self
            .table
            .get(&service.to_lowercase())
            .map(|entry| {
                entry
                    .values()
                    .filter(|r| r.instance.status == InstanceStatus::Up)
                    .map(|r| r.instance.clone())
                    .collect()
            })
            .unwrap_or_default();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        instances
    }

    /// Every instance of a service regardless of status.
    pub fn instances(&self, service: &str) -> Vec<Instance> {
        let mut instances: Vec<Instance> = self
            .table
            .get(&service.to_lowercase())
            .map(|entry| entry.values().map(|r| r.instance.clone()).collect())
            .unwrap_or_default();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        instances
    }

    /// Summary of every known service, ordered by name.
    pub fn services(&self) -> Vec<ServiceSummary> {
        let mut services: Vec<ServiceSummary> = self
            .table
            .iter()
            .map(|entry| ServiceSummary {
                name: entry.key().clone(),
                instances: entry.len(),
                up: entry
                    .values()
                    .filter(|r| r.instance.status == InstanceStatus::Up)
                    .count(),
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Remove every instance whose lease is older than
    /// `lease_duration * eviction_threshold` at `now`. Returns the evicted instances.
    pub fn evict_expired(&self, now: Instant) -> Vec<Instance> {
        let max_age = self.config.eviction_age();
        let mut evicted = Vec::new();

        for mut entry in self.table.iter_mut() {
            let service = entry.key().clone();
            let before = entry.len();
            entry.retain(|_, record| {
                let expired = now.saturating_duration_since(record.renewed_at) > max_age;
                if expired {
                    evicted.push(record.instance.clone());
                }
                !expired
            });
            if entry.len() != before {
                metrics::record_registry_instances(&service, entry.len());
            }
        }
        self.table.retain(|_, instances| !instances.is_empty());

        for instance in &evicted {
            metrics::record_eviction(&instance.service_name);
            tracing::warn!(
                service = %instance.service_name,
                instance_id = %instance.instance_id,
                address = %instance.address(),
                "Lease expired, instance evicted"
            );
        }
        evicted
    }
}

fn not_found(service: &str, instance_id: &str) -> MeshError {
    MeshError::NotFound(format!("instance {}/{}", service, instance_id))
}
