//! Registry of named policies.
//!
//! # Design Decisions
//! - The policy table is an `ArcSwap`: lookups are lock-free and a reload
//!   replaces the whole table at once
//! - Unknown names get a policy built from the default config on first use
//! - A reload keeps the live policy (and its breaker/bulkhead state) for every
//!   name whose config did not change; in-flight calls finish on the policy
//!   they started with

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::{PolicyConfig, ResilienceConfig};
use crate::error::Result;
use crate::resilience::policy::CallPolicy;

type PolicyTable = HashMap<String, Arc<CallPolicy>>;

#[derive(Debug)]
pub struct ResilienceEngine {
    default: ArcSwap<PolicyConfig>,
    policies: ArcSwap<PolicyTable>,
}

impl ResilienceEngine {
    pub fn new(config: &ResilienceConfig) -> Self {
        let engine = Self {
            default: ArcSwap::from_pointee(config.default.clone()),
            policies: ArcSwap::from_pointee(HashMap::new()),
        };
        engine.reload(config);
        engine
    }

    /// The policy registered under `name`, created from the default on first use.
    pub fn policy(&self, name: &str) -> Arc<CallPolicy> {
        if let Some(policy) = self.policies.load().get(name) {
            return policy.clone();
        }

        let created = Arc::new(CallPolicy::from_config(name, &self.default.load()));
        tracing::debug!(policy = %name, "Created policy from default");
        let table = self.policies.rcu(|current| {
            let mut next = PolicyTable::clone(current);
            next.entry(name.to_string()).or_insert_with(|| created.clone());
            next
        });
        // `rcu` returns the table it replaced; the entry may have been added concurrently.
        table.get(name).cloned().unwrap_or(created)
    }

    /// Run `op` under the policy called `name`.
    pub async fn call<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.policy(name).call(op).await
    }

    /// Swap in a new set of policies.
    pub fn reload(&self, config: &ResilienceConfig) {
        self.default.store(Arc::new(config.default.clone()));

        self.policies.rcu(|current| {
            let mut next = PolicyTable::new();
            for (name, policy_config) in &config.policies {
                next.insert(name.clone(), keep_or_build(current, name, policy_config));
            }
            // Everything else follows the default.
            for name in current.keys() {
                if !config.policies.contains_key(name) {
                    next.insert(name.clone(), keep_or_build(current, name, &config.default));
                }
            }
            next
        });

        tracing::info!(policies = config.policies.len(), "Resilience policies loaded");
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.load().keys().cloned().collect();
        names.sort();
        names
    }
}

fn keep_or_build(current: &PolicyTable, name: &str, config: &PolicyConfig) -> Arc<CallPolicy> {
    match current.get(name) {
        Some(existing) if existing.config() == Some(config) => existing.clone(),
        _ => Arc::new(CallPolicy::from_config(name, config)),
    }
}
