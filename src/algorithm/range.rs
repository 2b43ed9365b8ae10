//! Range sharding - contiguous value partitions mapped to target suffixes
//!
//! Both algorithms reduce to a sorted list of boundaries. With N boundaries
//! there are N+1 partitions:
//!
//! ```text
//! partition 0:   (-inf, b[0])
//! partition i:   [b[i-1], b[i])
//! partition N:   [b[N-1], +inf)
//! ```
//!
//! Partition `i` lives in the target whose numeric suffix is `i`.
//!
//! - `VOLUME_RANGE`: boundaries every `sharding-volume` from `range-lower`
//!   up to `range-upper`.
//! - `BOUNDARY_RANGE`: explicit `sharding-ranges` boundaries, e.g. `1,5,10`.

use std::sync::Arc;

use super::{
    filter_by_suffix, find_by_suffix, integer_value, PreciseShardingValue, RangeShardingAlgorithm,
    RangeShardingValue, ShardingAlgorithm,
};
use crate::config::{required_i64, required_prop, Props};
use crate::{Result, ShardError};

// ============================================================================
// Partition Boundaries
// ============================================================================

/// Sorted partition boundaries shared by the range algorithms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBoundaries {
    boundaries: Vec<i64>,
}

impl PartitionBoundaries {
    pub fn new(mut boundaries: Vec<i64>) -> Self {
        boundaries.sort_unstable();
        boundaries.dedup();
        Self { boundaries }
    }

    /// Boundaries every `volume` from `lower`, closing at `upper`
    pub fn with_volume(lower: i64, upper: i64, volume: i64) -> Result<Self> {
        if volume <= 0 || upper < lower {
            return Err(ShardError::Configuration(format!(
                "invalid volume range: lower={}, upper={}, volume={}",
                lower, upper, volume
            )));
        }
        let mut boundaries = vec![lower];
        let mut current = lower;
        while current < upper {
            current = current.saturating_add(volume).min(upper);
            boundaries.push(current);
        }
        Ok(Self::new(boundaries))
    }

    pub fn boundaries(&self) -> &[i64] {
        &self.boundaries
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Partition holding `value`
    pub fn partition_of(&self, value: i64) -> u64 {
        self.boundaries.partition_point(|b| *b <= value) as u64
    }

    fn route_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        let v = integer_value(value)?;
        Ok(find_by_suffix(targets, self.partition_of(v)))
    }

    fn route_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>> {
        let (lower, upper) = value.range.integer_bounds();
        let first = lower.map(|v| self.partition_of(v)).unwrap_or(0);
        let last = upper
            .map(|v| self.partition_of(v))
            .unwrap_or(self.boundaries.len() as u64);
        if let (Some(l), Some(u)) = (lower, upper) {
            if u < l {
                return Ok(Vec::new());
            }
        }
        Ok(filter_by_suffix(targets, |suffix| suffix >= first && suffix <= last))
    }
}

// ============================================================================
// VOLUME_RANGE
// ============================================================================

#[derive(Debug, Clone)]
pub struct VolumeRangeShardingAlgorithm {
    partitions: PartitionBoundaries,
}

impl VolumeRangeShardingAlgorithm {
    pub fn new(lower: i64, upper: i64, volume: i64) -> Result<Self> {
        Ok(Self {
            partitions: PartitionBoundaries::with_volume(lower, upper, volume)?,
        })
    }

    pub(crate) fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>> {
        Ok(Arc::new(Self::new(
            required_i64(props, "range-lower")?,
            required_i64(props, "range-upper")?,
            required_i64(props, "sharding-volume")?,
        )?))
    }

    pub fn partitions(&self) -> &PartitionBoundaries {
        &self.partitions
    }
}

impl ShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "VOLUME_RANGE"
    }

    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        self.partitions.route_precise(targets, value)
    }

    fn as_range(&self) -> Option<&dyn RangeShardingAlgorithm> {
        Some(self)
    }
}

impl RangeShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn do_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>> {
        self.partitions.route_range(targets, value)
    }
}

// ============================================================================
// BOUNDARY_RANGE
// ============================================================================

#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    partitions: PartitionBoundaries,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(boundaries: Vec<i64>) -> Self {
        Self {
            partitions: PartitionBoundaries::new(boundaries),
        }
    }

    pub(crate) fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>> {
        let raw = required_prop(props, "sharding-ranges")?;
        let boundaries = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>().map_err(|_| {
                    ShardError::Configuration(format!("invalid sharding-ranges entry '{}'", s))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if boundaries.is_empty() {
            return Err(ShardError::Configuration("sharding-ranges must not be empty".into()));
        }
        Ok(Arc::new(Self::new(boundaries)))
    }
}

impl ShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "BOUNDARY_RANGE"
    }

    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        self.partitions.route_precise(targets, value)
    }

    fn as_range(&self) -> Option<&dyn RangeShardingAlgorithm> {
        Some(self)
    }
}

impl RangeShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn do_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>> {
        self.partitions.route_range(targets, value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::ValueRange;
    use crate::data::Value;
    use std::ops::Bound;

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t_{}", i)).collect()
    }

    fn precise(v: i64) -> PreciseShardingValue {
        PreciseShardingValue {
            logic_table: "t".into(),
            column: "id".into(),
            value: Value::Int64(v),
        }
    }

    fn range(lower: Bound<Value>, upper: Bound<Value>) -> RangeShardingValue {
        RangeShardingValue {
            logic_table: "t".into(),
            column: "id".into(),
            range: ValueRange::new(lower, upper),
        }
    }

    #[test]
    fn test_volume_boundaries() {
        let p = PartitionBoundaries::with_volume(10, 45, 10).unwrap();
        assert_eq!(p.boundaries(), &[10, 20, 30, 40, 45]);
        assert_eq!(p.partition_count(), 6);
        assert_eq!(p.partition_of(9), 0);
        assert_eq!(p.partition_of(10), 1);
        assert_eq!(p.partition_of(44), 4);
        assert_eq!(p.partition_of(45), 5);
    }

    #[test]
    fn test_boundary_precise() {
        let alg = BoundaryRangeShardingAlgorithm::new(vec![10, 1, 5]);
        let t = targets(4);
        assert_eq!(alg.do_precise(&t, &precise(0)).unwrap(), Some("t_0".into()));
        assert_eq!(alg.do_precise(&t, &precise(1)).unwrap(), Some("t_1".into()));
        assert_eq!(alg.do_precise(&t, &precise(7)).unwrap(), Some("t_2".into()));
        assert_eq!(alg.do_precise(&t, &precise(100)).unwrap(), Some("t_3".into()));
    }

    #[test]
    fn test_range_matches_brute_force() {
        let alg = VolumeRangeShardingAlgorithm::new(0, 40, 10).unwrap();
        let t = targets(alg.partitions().partition_count());
        for lower in -5i64..50 {
            for upper in [lower - 1, lower, lower + 3, lower + 12, lower + 30] {
                let r = range(Bound::Included(Value::Int64(lower)), Bound::Included(Value::Int64(upper)));
                let expected: Vec<String> = t
                    .iter()
                    .filter(|name| {
                        let idx = crate::algorithm::target_suffix(name).unwrap();
                        (lower..=upper).any(|v| alg.partitions().partition_of(v) == idx)
                    })
                    .cloned()
                    .collect();
                assert_eq!(alg.do_range(&t, &r).unwrap(), expected, "[{}, {}]", lower, upper);
            }
        }
    }

    #[test]
    fn test_range_open_ends() {
        let alg = BoundaryRangeShardingAlgorithm::new(vec![1, 5, 10]);
        let t = targets(4);
        let below = range(Bound::Unbounded, Bound::Excluded(Value::Int64(5)));
        assert_eq!(alg.do_range(&t, &below).unwrap(), vec!["t_0", "t_1"]);
        let above = range(Bound::Excluded(Value::Int64(9)), Bound::Unbounded);
        assert_eq!(alg.do_range(&t, &above).unwrap(), vec!["t_3"]);
    }

    #[test]
    fn test_create_from_props() {
        let mut props = Props::new();
        props.insert("sharding-ranges".into(), "1, 5,10".into());
        let alg = BoundaryRangeShardingAlgorithm::create(&props).unwrap();
        assert_eq!(alg.type_name(), "BOUNDARY_RANGE");

        props.insert("sharding-ranges".into(), "1,x".into());
        assert!(BoundaryRangeShardingAlgorithm::create(&props).is_err());
        assert!(VolumeRangeShardingAlgorithm::new(0, 10, 0).is_err());
    }
}
