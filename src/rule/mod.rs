//! Rules - compiled, immutable routing configuration
//!
//! - [`ShardingRule`]: sharded tables, binding groups, broadcast tables
//! - [`ReadwriteSplittingRule`]: primary/replica groups
//! - [`RuleHolder`]: atomically swappable handle shared by all statements

pub mod data_node;
pub mod readwrite;
pub mod sharding_rule;
pub mod table_rule;

use std::sync::Arc;

use parking_lot::RwLock;

pub use data_node::{expand_inline_expression, DataNode};
pub use readwrite::{ReadwriteGroup, ReadwriteSplittingRule};
pub use sharding_rule::ShardingRule;
pub use table_rule::{KeyGenerateStrategy, ShardingStrategy, TableRule};

/// Holds the current [`ShardingRule`].
///
/// Statements take an `Arc` snapshot with [`RuleHolder::load`] and keep it
/// for their whole lifetime; a reload replaces the rule as a whole.
#[derive(Debug)]
pub struct RuleHolder {
    current: RwLock<Arc<ShardingRule>>,
}

impl RuleHolder {
    pub fn new(rule: ShardingRule) -> Self {
        Self {
            current: RwLock::new(Arc::new(rule)),
        }
    }

    /// Snapshot of the current rule
    pub fn load(&self) -> Arc<ShardingRule> {
        self.current.read().clone()
    }

    /// Replace the rule, returning the previous one
    pub fn swap(&self, rule: ShardingRule) -> Arc<ShardingRule> {
        let next = Arc::new(rule);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        log::info!("Sharding rule replaced");
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardingRuleConfiguration;

    fn rule(sources: &[&str]) -> ShardingRule {
        let config = ShardingRuleConfiguration {
            data_sources: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        ShardingRule::new(&config).unwrap()
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let holder = RuleHolder::new(rule(&["ds0"]));
        let before = holder.load();
        let previous = holder.swap(rule(&["ds0", "ds1"]));
        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(before.data_sources().len(), 1);
        assert_eq!(holder.load().data_sources().len(), 2);
    }
}
