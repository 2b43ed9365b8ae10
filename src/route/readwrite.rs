//! Read/write splitting decorator
//!
//! Runs after sharding. Units whose data source names a read/write group are
//! pointed at the group's write data source, or at one load-balanced read
//! chosen once per group for the whole statement.

use std::collections::HashMap;

use crate::rule::ReadwriteSplittingRule;
use crate::statement::{HintContext, SqlStatement, StatementContext};

use super::RouteContext;

/// Whether the statement must see the primary
fn is_write_route(ctx: &StatementContext, hint: &HintContext) -> bool {
    if !ctx.is_read_only() || hint.write_route_only || hint.in_transaction {
        return true;
    }
    match ctx.statement() {
        SqlStatement::Select(select) => select.lock || select.last_insert_id,
        _ => true,
    }
}

pub(crate) fn decorate(
    route: &mut RouteContext,
    rule: &ReadwriteSplittingRule,
    ctx: &StatementContext,
    hint: &HintContext,
) {
    let write = is_write_route(ctx, hint);
    let mut chosen: HashMap<String, String> = HashMap::new();
    for unit in route.units_mut() {
        let Some(group) = rule.find_group(&unit.data_source.logic_name) else {
            continue;
        };
        let target = if write {
            group.write_data_source().to_string()
        } else {
            chosen
                .entry(group.name().to_string())
                .or_insert_with(|| group.choose_read())
                .clone()
        };
        unit.data_source.actual_name = target;
    }
    log::debug!(
        "Read/write splitting routed to {:?} ({})",
        route.data_source_names(),
        if write { "write" } else { "read" }
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::route::RouteUnit;
    use crate::statement::{DatabaseType, DmlStatement, Projection, SelectStatement, TableSegment};
    use crate::test_fixtures::{order_rule, readwrite_rule};

    fn route() -> RouteContext {
        RouteContext::new(vec![
            RouteUnit::new("ds0").with_table("t_order", "t_order_0"),
            RouteUnit::new("ds0").with_table("t_order", "t_order_1"),
            RouteUnit::new("ds1").with_table("t_order", "t_order_0"),
        ])
    }

    fn select(lock: bool) -> StatementContext {
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 15)],
            projections: vec![Projection::column("id")],
            lock,
            ..Default::default()
        });
        StatementContext::new(Arc::new(statement), Vec::new(), &order_rule(), DatabaseType::MySQL).unwrap()
    }

    #[test]
    fn test_reads_pick_one_replica_per_group() {
        let mut route = route();
        decorate(&mut route, &readwrite_rule(), &select(false), &HintContext::default());
        let units = route.units();
        assert!(units[0].data_source_name().starts_with("ds0_replica_"));
        assert_eq!(units[0].data_source_name(), units[1].data_source_name());
        assert!(units[2].data_source_name().starts_with("ds1_replica_"));
        assert_eq!(units[0].logic_data_source(), "ds0");
    }

    #[test]
    fn test_lock_and_hints_force_primary() {
        let rule = readwrite_rule();
        let mut locked = route();
        decorate(&mut locked, &rule, &select(true), &HintContext::default());
        assert_eq!(locked.units()[0].data_source_name(), "ds0_primary");

        let mut hinted = route();
        let hint = HintContext {
            in_transaction: true,
            ..Default::default()
        };
        decorate(&mut hinted, &rule, &select(false), &hint);
        assert_eq!(hinted.units()[2].data_source_name(), "ds1_primary");
    }

    #[test]
    fn test_writes_go_to_primary() {
        let statement = SqlStatement::Delete(DmlStatement {
            tables: vec![TableSegment::new("t_order", 12)],
            where_groups: Vec::new(),
        });
        let ctx = StatementContext::new(Arc::new(statement), Vec::new(), &order_rule(), DatabaseType::MySQL).unwrap();
        let mut route = route();
        decorate(&mut route, &readwrite_rule(), &ctx, &HintContext::default());
        assert!(route.units().iter().all(|u| u.data_source_name().ends_with("_primary")));
    }
}
