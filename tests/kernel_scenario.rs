//! End-to-end: prepare a statement, run the per-unit SQL against in-memory
//! shards and merge the results.

use std::collections::HashMap;
use std::sync::Arc;

use apexshard::config::{KernelProperties, ShardingRuleConfiguration};
use apexshard::statement::{
    HintContext, InsertRowSegment, InsertStatement, InsertValue, Operand, OrderByItem, OrderDirection,
    PaginationSegment, PaginationSyntax, PaginationValueSegment, Projection, SelectStatement, SqlStatement,
    TableSegment,
};
use apexshard::{MemoryQueryResult, QueryResult, Row, ShardingKernel, Value};

const RULE: &str = r#"{
    "data_sources": ["ds0", "ds1"],
    "tables": [{
        "logic_table": "t_order",
        "actual_data_nodes": "ds${0..1}.t_order",
        "database_strategy": { "sharding_column": "user_id", "algorithm": "user_mod" }
    }],
    "sharding_algorithms": {
        "user_mod": { "type": "MOD", "props": { "sharding-count": "2" } }
    }
}"#;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn kernel() -> ShardingKernel {
    let config = ShardingRuleConfiguration::from_json(RULE).unwrap();
    let props = KernelProperties {
        sql_show: true,
        ..Default::default()
    };
    ShardingKernel::from_configuration(&config, None, props).unwrap()
}

fn position(sql: &str, needle: &str) -> usize {
    sql.find(needle).unwrap()
}

/// `ds0` holds odd ids, `ds1` even ones, each sorted
fn shard_rows() -> HashMap<&'static str, Vec<Row>> {
    let ids = |values: &[i64]| values.iter().map(|v| vec![Value::Int64(*v)]).collect::<Vec<Row>>();
    HashMap::from([("ds0", ids(&[1, 3, 5, 7])), ("ds1", ids(&[2, 4, 6, 8]))])
}

/// Apply the shard-level `LIMIT n OFFSET m` the rewritten SQL asks for
fn execute(rows: &[Row], offset: usize, limit: usize) -> Box<dyn QueryResult> {
    let window = rows.iter().skip(offset).take(limit).cloned().collect();
    Box::new(MemoryQueryResult::new(vec!["id".into()], window))
}

#[test]
fn test_insert_routes_to_one_shard() {
    init();
    let sql = "INSERT INTO t_order (user_id, id) VALUES (1, 9)";
    let literal = |v: i64| InsertValue::Operand(Operand::Literal(Value::Int64(v)));
    let statement = SqlStatement::Insert(InsertStatement {
        table: TableSegment::new("t_order", position(sql, "t_order")),
        columns: vec!["user_id".into(), "id".into()],
        columns_stop: Some(position(sql, ")")),
        rows: vec![InsertRowSegment {
            start: position(sql, "(1"),
            stop: sql.len() - 1,
            values: vec![literal(1), literal(9)],
        }],
        values_start: position(sql, "(1"),
        values_stop: sql.len() - 1,
    });
    let plan = kernel()
        .prepare(Arc::new(statement), Vec::new(), sql, &HintContext::default())
        .unwrap();
    assert_eq!(plan.units.len(), 1);
    assert_eq!(plan.units[0].data_source, "ds1");
    assert_eq!(plan.units[0].sql, sql);
}

#[test]
fn test_select_without_predicate_hits_both_shards() {
    init();
    let sql = "SELECT id FROM t_order";
    let statement = SqlStatement::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", position(sql, "t_order"))],
        projections: vec![Projection::column("id")],
        projections_start: 7,
        projections_stop: 8,
        ..Default::default()
    });
    let plan = kernel()
        .prepare(Arc::new(statement), Vec::new(), sql, &HintContext::default())
        .unwrap();
    let sources: Vec<&str> = plan.units.iter().map(|u| u.data_source.as_str()).collect();
    assert_eq!(sources, vec!["ds0", "ds1"]);
}

#[test]
fn test_order_by_limit_offset_across_shards() {
    init();
    let sql = "SELECT id FROM t_order ORDER BY id LIMIT 3 OFFSET 2";
    let statement = SqlStatement::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", position(sql, "t_order"))],
        projections: vec![Projection::column("id")],
        projections_start: 7,
        projections_stop: 8,
        order_by: vec![OrderByItem::column("id", OrderDirection::Asc)],
        pagination: Some(PaginationSegment {
            syntax: PaginationSyntax::Limit,
            offset: Some(PaginationValueSegment::literal(2, position(sql, "2"))),
            row_count: Some(PaginationValueSegment::literal(3, position(sql, "3"))),
        }),
        ..Default::default()
    });
    let kernel = kernel();
    let plan = kernel
        .prepare(Arc::new(statement), Vec::new(), sql, &HintContext::default())
        .unwrap();
    for unit in &plan.units {
        assert_eq!(unit.sql, "SELECT id FROM t_order ORDER BY id LIMIT 5 OFFSET 0");
    }

    let rows = shard_rows();
    let results = plan
        .units
        .iter()
        .map(|unit| execute(&rows[unit.data_source.as_str()], 0, 5))
        .collect();
    let mut merged = kernel.merge(&plan, results).unwrap();
    let mut ids = Vec::new();
    while merged.next().unwrap() {
        ids.push(merged.value(0).unwrap());
    }
    assert_eq!(ids, vec![Value::Int64(4), Value::Int64(5), Value::Int64(6)]);
}

#[test]
fn test_parameterized_pagination() {
    init();
    let sql = "SELECT id FROM t_order ORDER BY id LIMIT ?, ?";
    let offset_at = position(sql, "?");
    let statement = SqlStatement::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", position(sql, "t_order"))],
        projections: vec![Projection::column("id")],
        projections_start: 7,
        projections_stop: 8,
        order_by: vec![OrderByItem::column("id", OrderDirection::Asc)],
        pagination: Some(PaginationSegment {
            syntax: PaginationSyntax::Limit,
            offset: Some(PaginationValueSegment::parameter(0, offset_at)),
            row_count: Some(PaginationValueSegment::parameter(1, offset_at + 3)),
        }),
        ..Default::default()
    });
    let kernel = kernel();
    let plan = kernel
        .prepare(
            Arc::new(statement),
            vec![Value::Int64(6), Value::Int64(10)],
            sql,
            &HintContext::default(),
        )
        .unwrap();
    assert_eq!(plan.units[0].sql, sql);
    assert_eq!(plan.units[0].parameters, vec![Value::Int64(0), Value::Int64(16)]);

    let rows = shard_rows();
    let results = plan
        .units
        .iter()
        .map(|unit| execute(&rows[unit.data_source.as_str()], 0, 16))
        .collect();
    let mut merged = kernel.merge(&plan, results).unwrap();
    let mut ids = Vec::new();
    while merged.next().unwrap() {
        ids.extend(merged.row().unwrap());
    }
    // past the end of data: fewer than the row count
    assert_eq!(ids, vec![Value::Int64(7), Value::Int64(8)]);
}
