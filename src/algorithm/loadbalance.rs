//! Read load balancers for read/write splitting

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::config::{AlgorithmConfiguration, Props};
use crate::{Result, ShardError};

/// Chooses one read data source of a group
pub trait LoadBalanceAlgorithm: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    /// Pick from `reads`; `None` only when `reads` is empty
    fn choose(&self, group: &str, reads: &[String]) -> Option<String>;
}

// ============================================================================
// Round Robin
// ============================================================================

#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    counters: Mutex<HashMap<String, usize>>,
}

impl LoadBalanceAlgorithm for RoundRobinLoadBalancer {
    fn type_name(&self) -> &'static str {
        "ROUND_ROBIN"
    }

    fn choose(&self, group: &str, reads: &[String]) -> Option<String> {
        if reads.is_empty() {
            return None;
        }
        let mut counters = self.counters.lock();
        let counter = counters.entry(group.to_string()).or_insert(0);
        let picked = reads[*counter % reads.len()].clone();
        *counter = counter.wrapping_add(1);
        Some(picked)
    }
}

// ============================================================================
// Random
// ============================================================================

#[derive(Debug, Default)]
pub struct RandomLoadBalancer;

impl LoadBalanceAlgorithm for RandomLoadBalancer {
    fn type_name(&self) -> &'static str {
        "RANDOM"
    }

    fn choose(&self, _group: &str, reads: &[String]) -> Option<String> {
        if reads.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..reads.len());
        Some(reads[idx].clone())
    }
}

// ============================================================================
// Weight
// ============================================================================

/// Random choice proportional to per-data-source weights given as props
/// (`replica_0 = 2`, `replica_1 = 1`). Unlisted data sources weigh 0.
#[derive(Debug)]
pub struct WeightLoadBalancer {
    weights: HashMap<String, f64>,
}

impl WeightLoadBalancer {
    pub fn new(props: &Props) -> Result<Self> {
        let mut weights = HashMap::new();
        for (name, raw) in props {
            let weight: f64 = raw.trim().parse().map_err(|_| {
                ShardError::Configuration(format!("weight of '{}' must be a number, got '{}'", name, raw))
            })?;
            if weight < 0.0 || !weight.is_finite() {
                return Err(ShardError::Configuration(format!("weight of '{}' must be non-negative", name)));
            }
            weights.insert(name.clone(), weight);
        }
        Ok(Self { weights })
    }
}

impl LoadBalanceAlgorithm for WeightLoadBalancer {
    fn type_name(&self) -> &'static str {
        "WEIGHT"
    }

    fn choose(&self, _group: &str, reads: &[String]) -> Option<String> {
        let weighted: Vec<(&String, f64)> = reads
            .iter()
            .map(|r| (r, self.weights.get(r).copied().unwrap_or(0.0)))
            .collect();
        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return reads.first().cloned();
        }
        let mut point = rand::thread_rng().gen_range(0.0..total);
        for (name, weight) in &weighted {
            if point < *weight {
                return Some((*name).clone());
            }
            point -= weight;
        }
        weighted.last().map(|(name, _)| (*name).clone())
    }
}

// ============================================================================
// Registry
// ============================================================================

type LoadBalancerFactory = fn(&Props) -> Result<Arc<dyn LoadBalanceAlgorithm>>;

fn round_robin(_: &Props) -> Result<Arc<dyn LoadBalanceAlgorithm>> {
    Ok(Arc::new(RoundRobinLoadBalancer::default()))
}

fn random(_: &Props) -> Result<Arc<dyn LoadBalanceAlgorithm>> {
    Ok(Arc::new(RandomLoadBalancer))
}

fn weight(props: &Props) -> Result<Arc<dyn LoadBalanceAlgorithm>> {
    Ok(Arc::new(WeightLoadBalancer::new(props)?))
}

const LOAD_BALANCERS: &[(&str, LoadBalancerFactory)] = &[
    ("ROUND_ROBIN", round_robin),
    ("RANDOM", random),
    ("WEIGHT", weight),
];

pub fn create_load_balancer(config: &AlgorithmConfiguration) -> Result<Arc<dyn LoadBalanceAlgorithm>> {
    let tag = config.kind.to_ascii_uppercase();
    LOAD_BALANCERS
        .iter()
        .find(|(name, _)| *name == tag)
        .ok_or_else(|| ShardError::Configuration(format!("unknown load balancer type '{}'", config.kind)))
        .and_then(|(_, factory)| factory(&config.props))
}
