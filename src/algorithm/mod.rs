//! Sharding Algorithms - Pure functions from a sharding value to targets
//!
//! Every algorithm resolves a precise value to at most one target name taken
//! from the caller's candidate list. Algorithms that can prune ranges also
//! expose [`RangeShardingAlgorithm`] through [`ShardingAlgorithm::as_range`].
//!
//! Algorithms, key generators and load balancers are created from an
//! explicit registry: a static table mapping a type tag to a factory.

pub mod interval;
pub mod keygen;
pub mod loadbalance;
pub mod modulo;
pub mod range;
pub mod inline;

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use crate::config::{AlgorithmConfiguration, Props};
use crate::data::{compare_non_null, Value};
use crate::{Result, ShardError};

pub use keygen::KeyGenerator;
pub use loadbalance::LoadBalanceAlgorithm;

// ============================================================================
// Sharding Values
// ============================================================================

/// A single value for a sharding column (`=` or one member of `IN`)
#[derive(Debug, Clone, PartialEq)]
pub struct PreciseShardingValue {
    pub logic_table: String,
    pub column: String,
    pub value: Value,
}

/// A range condition on a sharding column (`BETWEEN`, `<`, `>=`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct RangeShardingValue {
    pub logic_table: String,
    pub column: String,
    pub range: ValueRange,
}

/// Sharding value handed to an algorithm
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    Precise(PreciseShardingValue),
    Range(RangeShardingValue),
}

/// Interval over values with inclusive/exclusive/unbounded ends
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn new(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self { lower, upper }
    }

    /// `[lower, upper]`
    pub fn closed(lower: Value, upper: Value) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// Whether `value` falls inside the range
    pub fn contains(&self, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        let above = match &self.lower {
            Bound::Included(l) => compare_non_null(value, l).is_ge(),
            Bound::Excluded(l) => compare_non_null(value, l).is_gt(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => compare_non_null(value, u).is_le(),
            Bound::Excluded(u) => compare_non_null(value, u).is_lt(),
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Whether no value can satisfy the range
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => compare_non_null(l, u).is_gt(),
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => compare_non_null(l, u).is_ge(),
            _ => false,
        }
    }

    /// Intersection of two ranges, `None` when disjoint
    pub fn intersect(&self, other: &ValueRange) -> Option<ValueRange> {
        let lower = tighter_lower(&self.lower, &other.lower);
        let upper = tighter_upper(&self.upper, &other.upper);
        let result = ValueRange::new(lower, upper);
        if result.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    /// Inclusive integer bounds; `None` on a side that is unbounded or non-integral
    pub fn integer_bounds(&self) -> (Option<i64>, Option<i64>) {
        let lower = match &self.lower {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|x| x.checked_add(1)),
            Bound::Unbounded => None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|x| x.checked_sub(1)),
            Bound::Unbounded => None,
        };
        (lower, upper)
    }
}

fn tighter_lower(a: &Bound<Value>, b: &Bound<Value>) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x.clone(),
        (Bound::Included(x), Bound::Included(y)) => {
            if compare_non_null(x, y).is_ge() { a.clone() } else { b.clone() }
        }
        (Bound::Excluded(x), Bound::Excluded(y)) => {
            if compare_non_null(x, y).is_ge() { a.clone() } else { b.clone() }
        }
        (Bound::Included(x), Bound::Excluded(y)) | (Bound::Excluded(y), Bound::Included(x)) => {
            if compare_non_null(x, y).is_gt() {
                Bound::Included(x.clone())
            } else {
                Bound::Excluded(y.clone())
            }
        }
    }
}

fn tighter_upper(a: &Bound<Value>, b: &Bound<Value>) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x.clone(),
        (Bound::Included(x), Bound::Included(y)) => {
            if compare_non_null(x, y).is_le() { a.clone() } else { b.clone() }
        }
        (Bound::Excluded(x), Bound::Excluded(y)) => {
            if compare_non_null(x, y).is_le() { a.clone() } else { b.clone() }
        }
        (Bound::Included(x), Bound::Excluded(y)) | (Bound::Excluded(y), Bound::Included(x)) => {
            if compare_non_null(x, y).is_lt() {
                Bound::Included(x.clone())
            } else {
                Bound::Excluded(y.clone())
            }
        }
    }
}

// ============================================================================
// Algorithm Traits
// ============================================================================

/// Precise-value capability, implemented by every sharding algorithm
pub trait ShardingAlgorithm: Send + Sync + fmt::Debug {
    /// Registry type tag
    fn type_name(&self) -> &'static str;

    /// Resolve one value to a target among `targets`.
    ///
    /// `Ok(None)` means no configured target can hold the value.
    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>>;

    /// Range capability, when the algorithm can prune ranges
    fn as_range(&self) -> Option<&dyn RangeShardingAlgorithm> {
        None
    }
}

/// Range-value capability
pub trait RangeShardingAlgorithm {
    /// Subset of `targets` that may hold values inside the range, in `targets` order
    fn do_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>>;
}

// ============================================================================
// Target suffix helpers
// ============================================================================

/// Trailing decimal digits of a target name (`t_order_12` → 12)
pub fn target_suffix(target: &str) -> Option<u64> {
    let stem = target.trim_end_matches(|c: char| c.is_ascii_digit());
    target[stem.len()..].parse().ok()
}

/// First target whose numeric suffix equals `suffix`
pub(crate) fn find_by_suffix(targets: &[String], suffix: u64) -> Option<String> {
    targets
        .iter()
        .find(|t| target_suffix(t) == Some(suffix))
        .cloned()
}

/// Targets whose numeric suffix satisfies `keep`
pub(crate) fn filter_by_suffix(targets: &[String], keep: impl Fn(u64) -> bool) -> Vec<String> {
    targets
        .iter()
        .filter(|t| target_suffix(t).map(&keep).unwrap_or(false))
        .cloned()
        .collect()
}

pub(crate) fn integer_value(value: &PreciseShardingValue) -> Result<i64> {
    value.value.as_i64().ok_or_else(|| {
        ShardError::Configuration(format!(
            "sharding value '{}' of {}.{} is not an integer",
            value.value, value.logic_table, value.column
        ))
    })
}

// ============================================================================
// Registry
// ============================================================================

type ShardingAlgorithmFactory = fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>>;

const SHARDING_ALGORITHMS: &[(&str, ShardingAlgorithmFactory)] = &[
    ("MOD", modulo::ModShardingAlgorithm::create),
    ("HASH_MOD", modulo::HashModShardingAlgorithm::create),
    ("VOLUME_RANGE", range::VolumeRangeShardingAlgorithm::create),
    ("BOUNDARY_RANGE", range::BoundaryRangeShardingAlgorithm::create),
    ("INLINE", inline::InlineShardingAlgorithm::create),
    ("INTERVAL", interval::IntervalShardingAlgorithm::create),
];

/// Build a sharding algorithm from its configuration
pub fn create_sharding_algorithm(config: &AlgorithmConfiguration) -> Result<Arc<dyn ShardingAlgorithm>> {
    let tag = config.kind.to_ascii_uppercase();
    let factory = SHARDING_ALGORITHMS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| ShardError::Configuration(format!("unknown sharding algorithm type '{}'", config.kind)))?;
    factory(&config.props)
}

/// Registered sharding algorithm type tags
pub fn sharding_algorithm_types() -> impl Iterator<Item = &'static str> {
    SHARDING_ALGORITHMS.iter().map(|(name, _)| *name)
}
