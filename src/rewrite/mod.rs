//! SQL Rewrite Engine - Per-unit SQL text and parameters
//!
//! ```text
//! logic SQL ──► generators ──► tokens (sorted, non-overlapping)
//!                                 │
//!            RouteUnit ──────────►├─► actual SQL
//!                                 └─► parameters (flat, or one group per INSERT row)
//! ```
//!
//! Tokens are generated once per statement and materialized once per unit.
//! A statement no generator touches is passed through unchanged.

pub mod generator;
pub mod token;

use crate::data::Value;
use crate::route::{RouteContext, RouteUnit};
use crate::statement::{DatabaseType, SqlStatement, StatementContext};
use crate::{Result, ShardError};

pub use token::SqlToken;

use token::InsertPart;

/// Parameters of one rewritten statement
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteParameters {
    Flat(Vec<Value>),
    /// One group per INSERT row routed to the unit, then the parameters
    /// outside the VALUES clause
    Grouped { groups: Vec<Vec<Value>>, generic: Vec<Value> },
}

impl RewriteParameters {
    /// Parameters in marker order
    pub fn flatten(&self) -> Vec<Value> {
        match self {
            RewriteParameters::Flat(values) => values.clone(),
            RewriteParameters::Grouped { groups, generic } => {
                groups.iter().flatten().chain(generic.iter()).cloned().collect()
            }
        }
    }
}

/// Rewritten statement for one route unit
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: RewriteParameters,
}

/// Rewrites logic SQL for one dialect
#[derive(Debug, Clone, Copy)]
pub struct RewriteEngine {
    database_type: DatabaseType,
}

impl RewriteEngine {
    pub fn new(database_type: DatabaseType) -> Self {
        Self { database_type }
    }

    /// SQL and parameters for every unit of the route, in unit order
    pub fn rewrite(&self, sql: &str, ctx: &StatementContext, route: &RouteContext) -> Result<Vec<(RouteUnit, SqlUnit)>> {
        let generated = generator::generate(ctx, route, self.database_type)?;
        let tokens = token::arrange(sql, generated.tokens)?;

        let mut parameters = ctx.parameters().to_vec();
        for (index, value) in generated.parameter_changes {
            match parameters.get_mut(index) {
                Some(slot) => *slot = value,
                None => return Err(ShardError::ParameterOutOfRange(index)),
            }
        }

        let insert = ctx.insert();
        let spans: Vec<(usize, usize)> = match ctx.statement() {
            SqlStatement::Insert(statement) => {
                statement.rows.iter().map(|r| (r.start, r.stop)).collect()
            }
            _ => Vec::new(),
        };

        let mut units = Vec::with_capacity(route.units().len());
        for unit in route.units() {
            let sql_unit = match insert {
                Some(context) => {
                    let row_indexes = route.insert_rows_of(unit, context.rows.len());
                    let part = InsertPart {
                        context,
                        spans: &spans,
                        row_indexes,
                    };
                    let sql = token::render(sql, &tokens, unit, Some(&part))?;
                    let groups = part
                        .row_indexes
                        .iter()
                        .filter_map(|&i| context.rows.get(i))
                        .map(|row| row.parameters.clone())
                        .collect();
                    SqlUnit {
                        sql,
                        parameters: RewriteParameters::Grouped {
                            groups,
                            generic: context.generic_parameters.clone(),
                        },
                    }
                }
                None => SqlUnit {
                    sql: token::render(sql, &tokens, unit, None)?,
                    parameters: RewriteParameters::Flat(parameters.clone()),
                },
            };
            units.push((unit.clone(), sql_unit));
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::KernelProperties;
    use crate::route::RouteEngine;
    use crate::statement::{
        AggregationType, ColumnCondition, ConditionOperator, HintContext, InsertRowSegment, InsertStatement,
        InsertValue, Operand, OrderByItem, OrderDirection, PaginationSegment, PaginationSyntax,
        PaginationValueSegment, Projection, SelectStatement, TableSegment,
    };
    use crate::test_fixtures::order_rule;

    fn rewrite(
        sql: &str,
        statement: SqlStatement,
        params: Vec<Value>,
        database_type: DatabaseType,
    ) -> Result<Vec<(RouteUnit, SqlUnit)>> {
        let rule = order_rule();
        let props = KernelProperties::default();
        let ctx = StatementContext::new(Arc::new(statement), params, &rule, database_type)?;
        let route = RouteEngine::new(&rule, None, &props).route(&ctx, &HintContext::default())?;
        RewriteEngine::new(database_type).rewrite(sql, &ctx, &route)
    }

    #[test]
    fn test_single_unit_only_swaps_table() {
        let sql = "SELECT id, status FROM t_order WHERE user_id = 1 AND order_id = 2 ORDER BY status LIMIT 5, 10";
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 23)],
            where_groups: vec![vec![
                ColumnCondition::new("t_order", "user_id", ConditionOperator::Eq(Operand::Literal(Value::Int64(1)))),
                ColumnCondition::new("t_order", "order_id", ConditionOperator::Eq(Operand::Literal(Value::Int64(2)))),
            ]],
            projections: vec![Projection::column("id"), Projection::column("status")],
            projections_start: 7,
            projections_stop: 16,
            order_by: vec![OrderByItem::column("status", OrderDirection::Asc)],
            pagination: Some(PaginationSegment {
                syntax: PaginationSyntax::Limit,
                offset: Some(PaginationValueSegment::literal(5, 89)),
                row_count: Some(PaginationValueSegment::literal(10, 92)),
            }),
            ..Default::default()
        });
        let units = rewrite(sql, statement, Vec::new(), DatabaseType::MySQL).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(
            units[0].1.sql,
            "SELECT id, status FROM t_order_0 WHERE user_id = 1 AND order_id = 2 ORDER BY status LIMIT 5, 10"
        );
    }

    #[test]
    fn test_multi_unit_pagination_and_derived_columns() {
        let sql = "SELECT id FROM t_order ORDER BY status LIMIT ? OFFSET ?";
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 15)],
            projections: vec![Projection::column("id")],
            projections_start: 7,
            projections_stop: 8,
            order_by: vec![OrderByItem::column("status", OrderDirection::Asc)],
            pagination: Some(PaginationSegment {
                syntax: PaginationSyntax::Limit,
                offset: Some(PaginationValueSegment::parameter(1, 54)),
                row_count: Some(PaginationValueSegment::parameter(0, 45)),
            }),
            ..Default::default()
        });
        let units = rewrite(sql, statement, vec![Value::Int64(3), Value::Int64(2)], DatabaseType::MySQL).unwrap();
        assert_eq!(units.len(), 4);
        assert_eq!(
            units[0].1.sql,
            "SELECT id, status AS ORDER_BY_DERIVED_0 FROM t_order_0 ORDER BY status LIMIT ? OFFSET ?"
        );
        assert_eq!(
            units[0].1.parameters,
            RewriteParameters::Flat(vec![Value::Int64(5), Value::Int64(0)])
        );
    }

    #[test]
    fn test_group_by_gets_order_by_and_avg_is_derived() {
        let sql = "SELECT status, AVG(price) FROM t_order GROUP BY status";
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 31)],
            projections: vec![
                Projection::column("status"),
                Projection::aggregation(AggregationType::Avg, "price", 15, 24),
            ],
            projections_start: 7,
            projections_stop: 24,
            group_by: vec![OrderByItem::column("status", OrderDirection::Asc)],
            group_by_stop: Some(53),
            order_by_anchor: Some(54),
            ..Default::default()
        });
        let units = rewrite(sql, statement, Vec::new(), DatabaseType::PostgreSQL).unwrap();
        assert_eq!(
            units[3].1.sql,
            "SELECT status, AVG(price), COUNT(price) AS AVG_DERIVED_COUNT_0, SUM(price) AS AVG_DERIVED_SUM_0 \
             FROM t_order_1 GROUP BY status ORDER BY status"
        );
    }

    #[test]
    fn test_distinct_aggregation_is_grouped_per_shard() {
        let sql = "SELECT COUNT(DISTINCT user_id) FROM t_order";
        let mut count = Projection::aggregation(AggregationType::Count, "user_id", 7, 29);
        if let Projection::Aggregation { distinct, .. } = &mut count {
            *distinct = true;
        }
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 36)],
            projections: vec![count],
            projections_start: 7,
            projections_stop: 29,
            group_by_anchor: Some(43),
            ..Default::default()
        });
        let units = rewrite(sql, statement, Vec::new(), DatabaseType::MySQL).unwrap();
        assert_eq!(units[0].1.sql, "SELECT user_id FROM t_order_0 GROUP BY user_id");
    }

    #[test]
    fn test_unsupported_pagination_dialect() {
        let sql = "SELECT id FROM t_order LIMIT 1";
        let statement = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 15)],
            projections: vec![Projection::column("id")],
            projections_start: 7,
            projections_stop: 8,
            pagination: Some(PaginationSegment {
                syntax: PaginationSyntax::Limit,
                offset: None,
                row_count: Some(PaginationValueSegment::literal(1, 29)),
            }),
            ..Default::default()
        });
        let err = rewrite(sql, statement, Vec::new(), DatabaseType::Oracle).unwrap_err();
        assert!(matches!(err, ShardError::UnsupportedRewrite(_)));
    }

    #[test]
    fn test_insert_rows_are_partitioned_with_generated_keys() {
        let sql = "INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, ?)";
        let param = |i| InsertValue::Operand(Operand::Parameter(i));
        let statement = SqlStatement::Insert(InsertStatement {
            table: TableSegment::new("t_order", 12),
            columns: vec!["user_id".into(), "status".into()],
            columns_stop: Some(36),
            rows: vec![
                InsertRowSegment { start: 45, stop: 50, values: vec![param(0), param(1)] },
                InsertRowSegment { start: 53, stop: 58, values: vec![param(2), param(3)] },
            ],
            values_start: 45,
            values_stop: 58,
        });
        let params = vec![Value::Int64(1), Value::from("a"), Value::Int64(2), Value::from("b")];
        let units = rewrite(sql, statement, params, DatabaseType::MySQL).unwrap();
        assert_eq!(units.len(), 2);
        let (unit, first) = &units[0];
        // user 1, generated order 100: ds1.t_order_0
        assert_eq!(unit.to_string(), "ds1[t_order_0]");
        assert_eq!(first.sql, "INSERT INTO t_order_0 (user_id, status, order_id) VALUES (?, ?, ?)");
        assert_eq!(
            first.parameters.flatten(),
            vec![Value::Int64(1), Value::from("a"), Value::Int64(100)]
        );
        assert_eq!(units[1].0.to_string(), "ds0[t_order_1]");
    }
}
