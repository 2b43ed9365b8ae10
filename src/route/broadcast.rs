//! Broadcast routing
//!
//! - Database broadcast: one unit per data source (TCL, `SET`, writes to
//!   broadcast tables).
//! - Table broadcast: one unit per data node of every sharded table (DDL).

use crate::rule::ShardingRule;
use crate::Result;

use super::{RouteContext, RouteUnit};

/// One unit per data source; `tables` keep their logic names
pub(crate) fn route_database_broadcast(rule: &ShardingRule, tables: &[String]) -> RouteContext {
    let units = rule
        .data_sources()
        .iter()
        .map(|data_source| {
            let mut unit = RouteUnit::new(data_source);
            for table in tables {
                unit.add_table(table, table);
            }
            unit
        })
        .collect();
    RouteContext::new(units)
}

/// One unit per data node of each sharded table
pub(crate) fn route_table_broadcast(rule: &ShardingRule, sharded_tables: &[String]) -> Result<RouteContext> {
    let mut units = Vec::new();
    for table in sharded_tables {
        let table_rule = rule.table_rule(table)?;
        units.extend(
            table_rule
                .data_nodes()
                .iter()
                .map(|node| RouteUnit::new(&node.data_source).with_table(table_rule.logic_table(), &node.table)),
        );
    }
    Ok(RouteContext::new(units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::order_rule;

    #[test]
    fn test_database_broadcast_covers_every_data_source() {
        let rule = order_rule();
        let route = route_database_broadcast(&rule, &["t_dict".to_string()]);
        assert_eq!(route.data_source_names(), vec!["ds0", "ds1"]);
        assert!(route.units().iter().all(|u| u.actual_table("t_dict") == Some("t_dict")));
    }

    #[test]
    fn test_table_broadcast_covers_every_node() {
        let rule = order_rule();
        let route =
            route_table_broadcast(&rule, &["t_order".to_string(), "t_user".to_string()]).unwrap();
        assert_eq!(route.units().len(), 6);
        assert_eq!(route.units()[0].to_string(), "ds0[t_order_0]");
        assert_eq!(route.units()[5].to_string(), "ds1[t_user]");
    }
}
