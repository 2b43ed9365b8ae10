//! Complex routing - sharded tables from more than one binding group
//!
//! Tables are clustered by binding group and each cluster is routed on its
//! own. Inside every data source shared by all clusters the cluster units
//! are combined by cartesian product. When no data source is shared the
//! units are returned side by side and the statement is flagged for the
//! federation fallback.

use crate::rule::ShardingRule;
use crate::Result;

use super::condition::ShardingCondition;
use super::standard::route_standard;
use super::RouteUnit;

/// Route unrelated sharded tables.
///
/// Returns the units and whether the clusters share no data source.
pub(crate) fn route_complex(
    rule: &ShardingRule,
    sharded_tables: &[String],
    conditions: &[ShardingCondition],
) -> Result<(Vec<RouteUnit>, bool)> {
    let mut routed: Vec<Vec<RouteUnit>> = Vec::new();
    for cluster in clusters(rule, sharded_tables) {
        let units = route_standard(rule, &cluster, conditions)?;
        if units.is_empty() {
            return Ok((Vec::new(), false));
        }
        routed.push(units);
    }

    let Some((first, rest)) = routed.split_first() else {
        return Ok((Vec::new(), false));
    };
    let mut common: Vec<&str> = Vec::new();
    for unit in first {
        let ds = unit.logic_data_source();
        if !common.contains(&ds) && rest.iter().all(|units| units.iter().any(|u| u.logic_data_source() == ds)) {
            common.push(ds);
        }
    }
    if common.is_empty() {
        log::debug!("Tables {:?} share no data source", sharded_tables);
        return Ok((routed.into_iter().flatten().collect(), true));
    }

    let mut units = Vec::new();
    for ds in common {
        let mut product: Vec<RouteUnit> = vec![RouteUnit::new(ds)];
        for cluster_units in &routed {
            let mut next = Vec::new();
            for partial in &product {
                for unit in cluster_units.iter().filter(|u| u.logic_data_source() == ds) {
                    let mut combined = partial.clone();
                    for table in &unit.tables {
                        combined.add_table(&table.logic_name, &table.actual_name);
                    }
                    next.push(combined);
                }
            }
            product = next;
        }
        units.extend(product);
    }
    Ok((units, false))
}

/// Sharded tables grouped by binding group, in statement order
fn clusters(rule: &ShardingRule, tables: &[String]) -> Vec<Vec<String>> {
    let mut clusters: Vec<Vec<String>> = Vec::new();
    for table in tables {
        let group = rule.binding_group(table);
        let existing = clusters.iter_mut().find(|cluster| match (group, rule.binding_group(&cluster[0])) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        });
        match existing {
            Some(cluster) => cluster.push(table.clone()),
            None => clusters.push(vec![table.clone()]),
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableRuleConfiguration;
    use crate::data::Value;
    use crate::route::condition::ShardingValues;
    use crate::test_fixtures::{order_config, order_rule};

    #[test]
    fn test_clusters_follow_binding_groups() {
        let rule = order_rule();
        let tables: Vec<String> = ["t_order", "t_user", "t_order_item"].iter().map(|t| t.to_string()).collect();
        let clusters = clusters(&rule, &tables);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec!["t_order".to_string(), "t_order_item".to_string()]);
    }

    #[test]
    fn test_cartesian_product_within_data_source() {
        let rule = order_rule();
        let mut condition = ShardingCondition::default();
        condition.add("t_user", "user_id", ShardingValues::Precise(vec![Value::Int64(0)]));
        condition.add("t_order", "user_id", ShardingValues::Precise(vec![Value::Int64(0)]));
        let tables = vec!["t_order".to_string(), "t_user".to_string()];
        let (units, disjoint) = route_complex(&rule, &tables, &[condition]).unwrap();
        assert!(!disjoint);
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| u.data_source_name() == "ds0" && u.actual_table("t_user") == Some("t_user")));
    }

    #[test]
    fn test_disjoint_data_sources_are_flagged() {
        let mut config = order_config();
        config.tables.push(TableRuleConfiguration {
            logic_table: "t_audit".into(),
            actual_data_nodes: Some("ds1.t_audit".into()),
            ..Default::default()
        });
        let rule = ShardingRule::new(&config).unwrap();
        let mut condition = ShardingCondition::default();
        condition.add("t_user", "user_id", ShardingValues::Precise(vec![Value::Int64(2)]));
        let tables = vec!["t_user".to_string(), "t_audit".to_string()];
        let (units, disjoint) = route_complex(&rule, &tables, &[condition]).unwrap();
        assert!(disjoint);
        assert_eq!(units.len(), 2);
    }
}
