//! Modulo sharding
//!
//! - `MOD`: integer value modulo `sharding-count`, matched against the
//!   numeric suffix of each target.
//! - `HASH_MOD`: CRC32 of the value's bytes modulo `sharding-count`. Hashing
//!   destroys order, so ranges cannot be pruned.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    filter_by_suffix, find_by_suffix, integer_value, PreciseShardingValue, RangeShardingAlgorithm,
    RangeShardingValue, ShardingAlgorithm,
};
use crate::config::{required_i64, Props};
use crate::{Result, ShardError};

fn sharding_count(props: &Props) -> Result<u64> {
    let count = required_i64(props, "sharding-count")?;
    if count <= 0 {
        return Err(ShardError::Configuration(format!(
            "sharding-count must be positive, got {}",
            count
        )));
    }
    Ok(count as u64)
}

// ============================================================================
// MOD
// ============================================================================

#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: u64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: u64) -> Self {
        Self { sharding_count }
    }

    pub(crate) fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>> {
        Ok(Arc::new(Self::new(sharding_count(props)?)))
    }

    fn residue(&self, value: i64) -> u64 {
        value.rem_euclid(self.sharding_count as i64) as u64
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "MOD"
    }

    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        let v = integer_value(value)?;
        Ok(find_by_suffix(targets, self.residue(v)))
    }

    fn as_range(&self) -> Option<&dyn RangeShardingAlgorithm> {
        Some(self)
    }
}

impl RangeShardingAlgorithm for ModShardingAlgorithm {
    fn do_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>> {
        let residues: BTreeSet<u64> = match value.range.integer_bounds() {
            (Some(lower), Some(upper)) => {
                if upper < lower {
                    return Ok(Vec::new());
                }
                let span = (upper as i128 - lower as i128 + 1) as u128;
                if span >= self.sharding_count as u128 {
                    (0..self.sharding_count).collect()
                } else {
                    (lower..=upper).map(|v| self.residue(v)).collect()
                }
            }
            _ => (0..self.sharding_count).collect(),
        };
        Ok(filter_by_suffix(targets, |suffix| residues.contains(&suffix)))
    }
}

// ============================================================================
// HASH_MOD
// ============================================================================

#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: u64,
}

impl HashModShardingAlgorithm {
    pub fn new(sharding_count: u64) -> Self {
        Self { sharding_count }
    }

    pub(crate) fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>> {
        Ok(Arc::new(Self::new(sharding_count(props)?)))
    }
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HASH_MOD"
    }

    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&value.value.hash_bytes());
        let checksum = hasher.finalize() as u64;
        Ok(find_by_suffix(targets, checksum % self.sharding_count))
    }
}
