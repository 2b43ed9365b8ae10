//! Standard routing - one sharded table, or tables of one binding group
//!
//! The database strategy picks data sources, then the table strategy picks
//! actual tables inside each chosen data source. Bound tables follow the
//! primary table by shard index.

use crate::algorithm::{PreciseShardingValue, RangeShardingValue};
use crate::rule::{DataNode, ShardingRule, ShardingStrategy, TableRule};
use crate::Result;

use super::condition::{ShardingCondition, ShardingValues};
use super::RouteUnit;

/// Route `targets` through a strategy; no strategy or no value keeps them all
pub(crate) fn route_targets(
    logic_table: &str,
    strategy: Option<&ShardingStrategy>,
    values: Option<&ShardingValues>,
    targets: &[String],
) -> Result<Vec<String>> {
    let (Some(strategy), Some(values)) = (strategy, values) else {
        return Ok(targets.to_vec());
    };
    let routed = match values {
        ShardingValues::Precise(values) => {
            let mut hits: Vec<String> = Vec::new();
            for value in values {
                let sharding_value = PreciseShardingValue {
                    logic_table: logic_table.to_string(),
                    column: strategy.column.clone(),
                    value: value.clone(),
                };
                if let Some(target) = strategy.algorithm.do_precise(targets, &sharding_value)? {
                    if !hits.contains(&target) {
                        hits.push(target);
                    }
                }
            }
            targets.iter().filter(|t| hits.contains(t)).cloned().collect()
        }
        ShardingValues::Range(range) => match strategy.algorithm.as_range() {
            Some(algorithm) => algorithm.do_range(
                targets,
                &RangeShardingValue {
                    logic_table: logic_table.to_string(),
                    column: strategy.column.clone(),
                    range: range.clone(),
                },
            )?,
            None => targets.to_vec(),
        },
    };
    Ok(routed)
}

/// Data nodes of one table under one AND group
pub(crate) fn route_table(
    rule: &ShardingRule,
    table_rule: &TableRule,
    condition: &ShardingCondition,
) -> Result<Vec<DataNode>> {
    let logic_table = table_rule.logic_table();
    let database_strategy = rule.database_strategy(table_rule);
    let table_strategy = rule.table_strategy(table_rule);
    let database_values =
        database_strategy.and_then(|s| condition.values_for(rule, logic_table, &s.column));
    let table_values = table_strategy.and_then(|s| condition.values_for(rule, logic_table, &s.column));

    let data_sources = route_targets(logic_table, database_strategy, database_values, table_rule.data_sources())?;
    let mut nodes = Vec::new();
    for data_source in &data_sources {
        let tables = route_targets(
            logic_table,
            table_strategy,
            table_values,
            table_rule.actual_tables(data_source),
        )?;
        nodes.extend(tables.into_iter().map(|t| DataNode::new(data_source.clone(), t)));
    }
    Ok(nodes)
}

/// Units for `tables` (a single table or one binding group) under the OR of
/// `conditions`; the first table is the primary
pub(crate) fn route_standard(
    rule: &ShardingRule,
    tables: &[String],
    conditions: &[ShardingCondition],
) -> Result<Vec<RouteUnit>> {
    let Some(primary) = tables.first() else {
        return Ok(Vec::new());
    };
    let primary_rule = rule.table_rule(primary)?;
    let mut nodes: Vec<DataNode> = Vec::new();
    for condition in conditions {
        for node in route_table(rule, primary_rule, condition)? {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
    }
    nodes
        .iter()
        .map(|node| binding_unit(rule, primary_rule, tables, node))
        .collect()
}

/// Unit for `node` of the primary table with bound tables paired by index
pub(crate) fn binding_unit(
    rule: &ShardingRule,
    primary_rule: &TableRule,
    tables: &[String],
    node: &DataNode,
) -> Result<RouteUnit> {
    let mut unit = RouteUnit::new(&node.data_source);
    unit.add_table(primary_rule.logic_table(), &node.table);
    for table in tables.iter().skip(1) {
        let actual = rule.binding_actual_table(&node.data_source, table, primary_rule.logic_table(), &node.table)?;
        unit.add_table(table, &actual);
    }
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::test_fixtures::order_rule;

    fn condition(user_id: Option<i64>, order_id: Option<ShardingValues>) -> ShardingCondition {
        let mut c = ShardingCondition::default();
        if let Some(u) = user_id {
            c.add("t_order", "user_id", ShardingValues::Precise(vec![Value::Int64(u)]));
        }
        if let Some(o) = order_id {
            c.add("t_order_item", "order_id", o);
        }
        c
    }

    #[test]
    fn test_precise_routes_to_one_node() {
        let rule = order_rule();
        let nodes = route_table(
            &rule,
            rule.table_rule("t_order").unwrap(),
            &condition(Some(3), Some(ShardingValues::Precise(vec![Value::Int64(10)]))),
        )
        .unwrap();
        assert_eq!(nodes, vec![DataNode::new("ds1", "t_order_0")]);
    }

    #[test]
    fn test_missing_values_route_everywhere() {
        let rule = order_rule();
        let nodes = route_table(&rule, rule.table_rule("t_order").unwrap(), &condition(None, None)).unwrap();
        assert_eq!(nodes.len(), 4);
    }

    #[test]
    fn test_binding_tables_are_zipped() {
        let rule = order_rule();
        let tables = vec!["t_order".to_string(), "t_order_item".to_string()];
        let units = route_standard(&rule, &tables, &[condition(Some(2), None)]).unwrap();
        assert_eq!(units.len(), 2);
        for unit in &units {
            assert_eq!(unit.data_source_name(), "ds0");
            let order = unit.actual_table("t_order").unwrap();
            let item = unit.actual_table("t_order_item").unwrap();
            assert_eq!(order.trim_start_matches("t_order_"), item.trim_start_matches("t_order_item_"));
        }
    }

    #[test]
    fn test_or_groups_are_unioned() {
        let rule = order_rule();
        let tables = vec!["t_order".to_string()];
        let units = route_standard(
            &rule,
            &tables,
            &[condition(Some(0), Some(ShardingValues::Precise(vec![Value::Int64(1)]))), condition(Some(1), None)],
        )
        .unwrap();
        // ds0.t_order_1 from the first group, both ds1 tables from the second
        assert_eq!(units.len(), 3);
    }
}
