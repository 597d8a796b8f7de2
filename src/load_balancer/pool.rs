//! Per-service balancer state.

use dashmap::DashMap;

use crate::load_balancer::{round_robin::RoundRobin, LoadBalancer};
use crate::registry::Instance;

/// Round-robin counters keyed by service name.
#[derive(Debug, Default)]
pub struct BalancerPool {
    balancers: DashMap<String, RoundRobin>,
}

impl BalancerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next instance for `service` out of `instances`.
    pub fn select(&self, service: &str, instances: &[Instance]) -> Option<Instance> {
        if instances.is_empty() {
            tracing::debug!(service = %service, "No instances to balance across");
            return None;
        }
        if let Some(balancer) = self.balancers.get(service) {
            return balancer.next_instance(instances).cloned();
        }
        self.balancers
            .entry(service.to_string())
            .or_default()
            .next_instance(instances)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_service() {
        let pool = BalancerPool::new();
        let exchange = vec![
            Instance::new("exchange", "A", "h1", 8000),
            Instance::new("exchange", "B", "h2", 8000),
        ];
        let limits = vec![
            Instance::new("limits", "L1", "h3", 8080),
            Instance::new("limits", "L2", "h4", 8080),
        ];

        assert_eq!(pool.select("exchange", &exchange).unwrap().instance_id, "A");
        assert_eq!(pool.select("limits", &limits).unwrap().instance_id, "L1");
        assert_eq!(pool.select("exchange", &exchange).unwrap().instance_id, "B");
        assert!(pool.select("exchange", &[]).is_none());
    }
}
