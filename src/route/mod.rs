//! Route Engine - Computes the physical targets of one statement
//!
//! Handles:
//! - Shard pruning from WHERE and INSERT values (standard routing)
//! - Binding tables zipped by shard index, unrelated tables combined by
//!   cartesian product (complex routing)
//! - Database and table broadcast for TCL, DDL and broadcast tables
//! - Unicast for statements any single data source can answer
//! - Read/write splitting as a decorator pass after sharding
//!
//! Routing is a pure function of the rule, the statement context and the
//! session hints. Handlers are picked from a static table keyed by
//! [`StatementKind`].

pub mod broadcast;
pub mod complex;
pub mod condition;
pub mod readwrite;
pub mod standard;
pub mod unicast;

use std::fmt;

use crate::config::KernelProperties;
use crate::rule::{DataNode, ReadwriteSplittingRule, ShardingRule};
use crate::statement::{DalKind, HintContext, SqlStatement, StatementContext, StatementKind};
use crate::{Result, ShardError};

use condition::ShardingConditions;

pub use condition::{ShardingCondition, ShardingValues};

// ============================================================================
// Route Units
// ============================================================================

/// Logical name paired with the physical name it routes to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: &str, actual_name: &str) -> Self {
        Self {
            logic_name: logic_name.to_string(),
            actual_name: actual_name.to_string(),
        }
    }
}

/// One physical execution target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    pub tables: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source: &str) -> Self {
        Self {
            data_source: RouteMapper::new(data_source, data_source),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, logic_table: &str, actual_table: &str) -> Self {
        self.add_table(logic_table, actual_table);
        self
    }

    pub fn add_table(&mut self, logic_table: &str, actual_table: &str) {
        if !self
            .tables
            .iter()
            .any(|t| t.logic_name.eq_ignore_ascii_case(logic_table))
        {
            self.tables.push(RouteMapper::new(logic_table, actual_table));
        }
    }

    /// Physical data source the executor connects to
    pub fn data_source_name(&self) -> &str {
        &self.data_source.actual_name
    }

    /// Data source name as the sharding rule knows it
    pub fn logic_data_source(&self) -> &str {
        &self.data_source.logic_name
    }

    /// Actual table of a logic table, case-insensitive
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|t| t.actual_name.as_str())
    }

    /// Whether the unit holds the given data node
    pub fn contains_node(&self, node: &DataNode) -> bool {
        self.data_source.logic_name == node.data_source
            && self.tables.iter().any(|t| t.actual_name == node.table)
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.data_source.actual_name)?;
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", table.actual_name)?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// Route Context
// ============================================================================

/// Result of routing one statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteContext {
    units: Vec<RouteUnit>,
    needs_federation: bool,
    /// Target node of every INSERT row, in row order
    insert_nodes: Vec<DataNode>,
}

impl RouteContext {
    /// Context over deduplicated `units`
    pub fn new(units: Vec<RouteUnit>) -> Self {
        let mut deduped: Vec<RouteUnit> = Vec::with_capacity(units.len());
        for unit in units {
            if !deduped.contains(&unit) {
                deduped.push(unit);
            }
        }
        Self {
            units: deduped,
            needs_federation: false,
            insert_nodes: Vec::new(),
        }
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub(crate) fn units_mut(&mut self) -> &mut [RouteUnit] {
        &mut self.units
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    /// The statement cannot be pushed down safely and needs the federation fallback
    pub fn needs_federation(&self) -> bool {
        self.needs_federation
    }

    pub(crate) fn set_needs_federation(&mut self, needs_federation: bool) {
        self.needs_federation = needs_federation;
    }

    /// Distinct physical data sources, in unit order
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source_name()) {
                names.push(unit.data_source_name());
            }
        }
        names
    }

    /// Indexes of the INSERT rows a unit receives; every row when the
    /// statement was not routed row by row
    pub fn insert_rows_of(&self, unit: &RouteUnit, row_count: usize) -> Vec<usize> {
        if self.insert_nodes.is_empty() {
            return (0..row_count).collect();
        }
        self.insert_nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| unit.contains_node(node))
            .map(|(i, _)| i)
            .collect()
    }
}

// ============================================================================
// Route Engine
// ============================================================================

type RouteHandler = fn(&RouteEngine<'_>, &StatementContext, &HintContext) -> Result<RouteContext>;

/// Handler per statement category
fn handler(kind: StatementKind) -> RouteHandler {
    match kind {
        StatementKind::Select | StatementKind::Update | StatementKind::Delete => route_dml,
        StatementKind::Insert => route_insert,
        StatementKind::Ddl | StatementKind::Dcl => route_schema,
        StatementKind::Dal => route_dal,
        StatementKind::Tcl => route_tcl,
    }
}

/// Routes statements against one rule snapshot
pub struct RouteEngine<'a> {
    rule: &'a ShardingRule,
    readwrite: Option<&'a ReadwriteSplittingRule>,
    props: &'a KernelProperties,
}

impl<'a> RouteEngine<'a> {
    pub fn new(
        rule: &'a ShardingRule,
        readwrite: Option<&'a ReadwriteSplittingRule>,
        props: &'a KernelProperties,
    ) -> Self {
        Self { rule, readwrite, props }
    }

    /// Route a statement: sharding first, then read/write splitting
    pub fn route(&self, ctx: &StatementContext, hint: &HintContext) -> Result<RouteContext> {
        let mut route = handler(ctx.kind())(self, ctx, hint)?;
        if let Some(readwrite) = self.readwrite {
            readwrite::decorate(&mut route, readwrite, ctx, hint);
        }
        log::debug!(
            "Routed {:?} on {:?} to {} unit(s){}",
            ctx.kind(),
            ctx.tables(),
            route.units().len(),
            if route.needs_federation() { ", federation required" } else { "" }
        );
        Ok(route)
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn sharded_tables(rule: &ShardingRule, tables: &[String]) -> Vec<String> {
    tables.iter().filter(|t| rule.is_sharding_table(t)).cloned().collect()
}

/// SELECT, UPDATE and DELETE
fn route_dml(engine: &RouteEngine<'_>, ctx: &StatementContext, hint: &HintContext) -> Result<RouteContext> {
    let rule = engine.rule;
    let tables = ctx.tables();
    if tables.is_empty() {
        return Ok(RouteContext::new(vec![unicast::route_unicast(rule, tables, hint)?]));
    }
    let sharded = sharded_tables(rule, tables);
    if sharded.is_empty() {
        if rule.is_all_broadcast(tables) {
            return match ctx.kind() {
                StatementKind::Select => Ok(RouteContext::new(vec![unicast::route_unicast(rule, tables, hint)?])),
                _ => Ok(broadcast::route_database_broadcast(rule, tables)),
            };
        }
        return single_data_source(rule, tables);
    }

    let groups = match ShardingConditions::from_where(ctx, rule)? {
        ShardingConditions::Groups(groups) => groups,
        ShardingConditions::AlwaysFalse => {
            return Ok(RouteContext::new(vec![unicast::route_unicast(rule, tables, hint)?]));
        }
    };
    let (units, no_common_data_source) = if sharded.len() == 1 || rule.is_all_binding(&sharded) {
        (standard::route_standard(rule, &sharded, &groups)?, false)
    } else {
        complex::route_complex(rule, &sharded, &groups)?
    };
    if units.is_empty() {
        // no configured target can hold the values: the statement matches nothing
        return Ok(RouteContext::new(vec![unicast::route_unicast(rule, tables, hint)?]));
    }
    let mut route = RouteContext::new(units);
    let outside_single_source = map_single_tables(rule, tables, &mut route)?;
    let federation = no_common_data_source
        || outside_single_source
        || (engine.props.sql_federation_enabled && needs_federation(rule, ctx, &sharded, &route));
    route.set_needs_federation(federation);
    Ok(route)
}

/// Map unconfigured tables into the units on their data source.
///
/// Returns true when some unit lives on another data source, where those
/// tables do not exist.
fn map_single_tables(rule: &ShardingRule, tables: &[String], route: &mut RouteContext) -> Result<bool> {
    let single: Vec<&String> = tables
        .iter()
        .filter(|t| !rule.is_sharding_table(t) && !rule.is_broadcast_table(t))
        .collect();
    if single.is_empty() {
        return Ok(false);
    }
    let data_source = rule.single_data_source()?;
    let mut outside = false;
    for unit in route.units_mut() {
        if unit.logic_data_source() != data_source {
            outside = true;
            continue;
        }
        for table in &single {
            unit.add_table(table, table);
        }
    }
    if outside {
        log::debug!("Tables {:?} only exist on '{}', route spans other data sources", single, data_source);
    }
    Ok(outside)
}

/// SELECTs the sharded route cannot answer correctly on its own
fn needs_federation(rule: &ShardingRule, ctx: &StatementContext, sharded: &[String], route: &RouteContext) -> bool {
    let SqlStatement::Select(select) = ctx.statement() else {
        return false;
    };
    let cross_source_join = select.contains_join
        && sharded.len() > 1
        && !rule.is_all_binding(sharded)
        && route.data_source_names().len() > 1;
    let multi_unit_nested = (select.contains_subquery || select.contains_having) && route.units().len() > 1;
    cross_source_join || multi_unit_nested
}

/// Tables without any sharding rule
fn single_data_source(rule: &ShardingRule, tables: &[String]) -> Result<RouteContext> {
    let data_source = rule.single_data_source()?;
    let mut unit = RouteUnit::new(data_source);
    for table in tables {
        unit.add_table(table, table);
    }
    Ok(RouteContext::new(vec![unit]))
}

fn route_insert(engine: &RouteEngine<'_>, ctx: &StatementContext, _hint: &HintContext) -> Result<RouteContext> {
    let rule = engine.rule;
    let Some(insert) = ctx.insert() else {
        return Err(ShardError::Configuration("INSERT without insert context".into()));
    };
    if rule.is_broadcast_table(&insert.table) {
        return Ok(broadcast::route_database_broadcast(rule, ctx.tables()));
    }
    let Some(table_rule) = rule.find_table_rule(&insert.table) else {
        return single_data_source(rule, ctx.tables());
    };
    if insert.rows.is_empty() {
        return Err(ShardError::Configuration(format!(
            "INSERT into sharded table '{}' has no VALUES rows",
            insert.table
        )));
    }
    let mut units: Vec<RouteUnit> = Vec::new();
    let mut insert_nodes = Vec::with_capacity(insert.rows.len());
    for (i, condition) in ShardingConditions::from_insert(ctx, rule).iter().enumerate() {
        let nodes = standard::route_table(rule, table_rule, condition)?;
        let [node] = nodes.as_slice() else {
            return Err(ShardError::Configuration(format!(
                "INSERT row {} of '{}' routes to {} data nodes, expected exactly one",
                i,
                insert.table,
                nodes.len()
            )));
        };
        units.push(RouteUnit::new(&node.data_source).with_table(table_rule.logic_table(), &node.table));
        insert_nodes.push(node.clone());
    }
    let mut route = RouteContext::new(units);
    route.insert_nodes = insert_nodes;
    Ok(route)
}

/// DDL and DCL
fn route_schema(engine: &RouteEngine<'_>, ctx: &StatementContext, _hint: &HintContext) -> Result<RouteContext> {
    let rule = engine.rule;
    let tables = ctx.tables();
    let sharded = sharded_tables(rule, tables);
    if !sharded.is_empty() {
        return broadcast::route_table_broadcast(rule, &sharded);
    }
    if tables.is_empty() || rule.is_all_broadcast(tables) {
        return Ok(broadcast::route_database_broadcast(rule, tables));
    }
    single_data_source(rule, tables)
}

fn route_dal(engine: &RouteEngine<'_>, ctx: &StatementContext, hint: &HintContext) -> Result<RouteContext> {
    let SqlStatement::Dal(dal) = ctx.statement() else {
        return Err(ShardError::Configuration("DAL route on a non-DAL statement".into()));
    };
    match dal.kind {
        DalKind::Set | DalKind::ShowDatabases => Ok(broadcast::route_database_broadcast(engine.rule, &[])),
        DalKind::Show | DalKind::Other => Ok(RouteContext::new(vec![unicast::route_unicast(
            engine.rule,
            ctx.tables(),
            hint,
        )?])),
    }
}

fn route_tcl(engine: &RouteEngine<'_>, _ctx: &StatementContext, _hint: &HintContext) -> Result<RouteContext> {
    Ok(broadcast::route_database_broadcast(engine.rule, &[]))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::Value;
    use crate::statement::{
        ColumnCondition, ConditionOperator, DalStatement, DatabaseType, DmlStatement, InsertRowSegment,
        InsertStatement, InsertValue, Operand, Projection, SchemaStatement, SelectStatement, TableSegment,
    };
    use crate::test_fixtures::order_rule;

    fn context(rule: &ShardingRule, statement: SqlStatement, params: Vec<Value>) -> StatementContext {
        StatementContext::new(Arc::new(statement), params, rule, DatabaseType::MySQL).unwrap()
    }

    fn select(tables: &[&str], where_groups: Vec<Vec<ColumnCondition>>) -> SqlStatement {
        SqlStatement::Select(SelectStatement {
            tables: tables.iter().map(|t| TableSegment::new(t, 20)).collect(),
            where_groups,
            projections: vec![Projection::column("id")],
            ..Default::default()
        })
    }

    fn eq(table: &str, column: &str, value: i64) -> ColumnCondition {
        ColumnCondition::new(table, column, ConditionOperator::Eq(Operand::Literal(Value::Int64(value))))
    }

    fn route(rule: &ShardingRule, statement: SqlStatement) -> Result<RouteContext> {
        let props = KernelProperties::default();
        let ctx = context(rule, statement, Vec::new());
        RouteEngine::new(rule, None, &props).route(&ctx, &HintContext::default())
    }

    #[test]
    fn test_select_without_predicate_hits_every_node() {
        let rule = order_rule();
        let route = route(&rule, select(&["t_order"], Vec::new())).unwrap();
        assert_eq!(route.units().len(), 4);
        assert_eq!(route.data_source_names(), vec!["ds0", "ds1"]);
    }

    #[test]
    fn test_precise_select_hits_one_unit() {
        let rule = order_rule();
        let route = route(
            &rule,
            select(&["t_order"], vec![vec![eq("t_order", "user_id", 1), eq("t_order", "order_id", 4)]]),
        )
        .unwrap();
        assert!(route.is_single_unit());
        assert_eq!(route.units()[0].to_string(), "ds1[t_order_0]");
    }

    #[test]
    fn test_contradiction_falls_back_to_unicast() {
        let rule = order_rule();
        let route = route(
            &rule,
            select(&["t_order"], vec![vec![eq("t_order", "user_id", 1), eq("t_order", "user_id", 2)]]),
        )
        .unwrap();
        assert!(route.is_single_unit());
        assert_eq!(route.units()[0].actual_table("t_order"), Some("t_order_0"));
    }

    #[test]
    fn test_broadcast_select_is_unicast_and_write_is_broadcast() {
        let rule = order_rule();
        let read = route(&rule, select(&["t_dict"], Vec::new())).unwrap();
        assert!(read.is_single_unit());
        let write = route(
            &rule,
            SqlStatement::Update(DmlStatement {
                tables: vec![TableSegment::new("t_dict", 7)],
                where_groups: Vec::new(),
            }),
        )
        .unwrap();
        assert_eq!(write.units().len(), 2);
    }

    #[test]
    fn test_unconfigured_table_goes_to_default() {
        let rule = order_rule();
        let route = route(&rule, select(&["t_config"], Vec::new())).unwrap();
        assert_eq!(route.units()[0].data_source_name(), "ds0");
        assert_eq!(route.units()[0].actual_table("t_config"), Some("t_config"));
    }

    #[test]
    fn test_insert_rows_route_individually() {
        let rule = order_rule();
        let literal = |v: i64| InsertValue::Operand(Operand::Literal(Value::Int64(v)));
        let statement = SqlStatement::Insert(InsertStatement {
            table: TableSegment::new("t_order", 12),
            columns: vec!["user_id".into(), "order_id".into()],
            columns_stop: Some(38),
            rows: vec![
                InsertRowSegment { start: 47, stop: 52, values: vec![literal(1), literal(1)] },
                InsertRowSegment { start: 55, stop: 60, values: vec![literal(2), literal(3)] },
                InsertRowSegment { start: 63, stop: 68, values: vec![literal(3), literal(5)] },
            ],
            values_start: 47,
            values_stop: 68,
        });
        let route = route(&rule, statement).unwrap();
        assert_eq!(route.units().len(), 2);
        let ds1 = route.units().iter().find(|u| u.data_source_name() == "ds1").unwrap();
        assert_eq!(ds1.actual_table("t_order"), Some("t_order_1"));
        assert_eq!(route.insert_rows_of(ds1, 3), vec![0, 2]);
    }

    #[test]
    fn test_tcl_and_ddl_broadcast() {
        let rule = order_rule();
        assert_eq!(route(&rule, SqlStatement::Tcl).unwrap().units().len(), 2);
        let ddl = route(
            &rule,
            SqlStatement::Ddl(SchemaStatement {
                tables: vec![TableSegment::new("t_order", 13)],
            }),
        )
        .unwrap();
        assert_eq!(ddl.units().len(), 4);
    }

    #[test]
    fn test_dal_dispatch() {
        let rule = order_rule();
        let set = route(
            &rule,
            SqlStatement::Dal(DalStatement { kind: DalKind::Set, tables: Vec::new() }),
        )
        .unwrap();
        assert_eq!(set.units().len(), 2);
        let show = route(
            &rule,
            SqlStatement::Dal(DalStatement {
                kind: DalKind::Show,
                tables: vec![TableSegment::new("t_order", 14)],
            }),
        )
        .unwrap();
        assert!(show.is_single_unit());
    }

    #[test]
    fn test_join_with_unconfigured_table_needs_federation() {
        let rule = order_rule();
        let props = KernelProperties {
            sql_federation_enabled: true,
            ..Default::default()
        };
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 20), TableSegment::new("t_config", 40)],
            projections: vec![Projection::column("id")],
            contains_join: true,
            ..Default::default()
        });
        let ctx = context(&rule, statement, Vec::new());
        let route = RouteEngine::new(&rule, None, &props)
            .route(&ctx, &HintContext::default())
            .unwrap();
        assert!(route.needs_federation());
        for unit in route.units() {
            let mapped = unit.actual_table("t_config");
            if unit.data_source_name() == "ds0" {
                assert_eq!(mapped, Some("t_config"));
            } else {
                assert_eq!(mapped, None);
            }
        }
    }

    #[test]
    fn test_unconfigured_table_joined_on_its_data_source() {
        let rule = order_rule();
        let route = route(
            &rule,
            select(&["t_order", "t_config"], vec![vec![eq("t_order", "user_id", 2)]]),
        )
        .unwrap();
        assert!(!route.needs_federation());
        assert!(route.units().iter().all(|u| u.data_source_name() == "ds0"));
        assert!(route.units().iter().all(|u| u.actual_table("t_config") == Some("t_config")));
    }

    #[test]
    fn test_join_across_data_sources_needs_federation() {
        let rule = order_rule();
        let props = KernelProperties {
            sql_federation_enabled: true,
            ..Default::default()
        };
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 20), TableSegment::new("t_user", 40)],
            projections: vec![Projection::column("id")],
            contains_join: true,
            ..Default::default()
        });
        let ctx = context(&rule, statement, Vec::new());
        let route = RouteEngine::new(&rule, None, &props)
            .route(&ctx, &HintContext::default())
            .unwrap();
        assert!(route.needs_federation());
        // cartesian product inside each data source: 2 order tables x 1 user table
        assert_eq!(route.units().len(), 4);
    }
}
