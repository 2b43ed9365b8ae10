//! Token generators
//!
//! Every generator inspects the statement context and the route and emits
//! the tokens its construct needs. Pagination generators are registered per
//! dialect; a pagination syntax the active dialect has no generator for is
//! an unsupported rewrite.

use crate::data::Value;
use crate::route::RouteContext;
use crate::statement::{
    DatabaseType, OrderDirection, Pagination, PaginationSyntax, PaginationValue, PaginationValueSegment,
    SelectContext, SelectStatement, SqlStatement, StatementContext,
};
use crate::{Result, ShardError};

use super::token::SqlToken;

/// Parameter replaced by the rewrite: `(index, new value)`
pub(crate) type ParameterChange = (usize, Value);

/// Tokens plus parameter changes shared by every unit
#[derive(Debug, Default)]
pub(crate) struct Generated {
    pub tokens: Vec<SqlToken>,
    pub parameter_changes: Vec<ParameterChange>,
}

type PaginationGenerator = fn(&Pagination, bool, &mut Generated);

/// Pagination generators by dialect and syntax
fn pagination_generator(database_type: DatabaseType, syntax: PaginationSyntax) -> Option<PaginationGenerator> {
    match (database_type, syntax) {
        (DatabaseType::MySQL | DatabaseType::PostgreSQL, PaginationSyntax::Limit)
        | (DatabaseType::Oracle, PaginationSyntax::RowNumber)
        | (DatabaseType::SQLServer, PaginationSyntax::Top) => Some(revise_window),
        _ => None,
    }
}

/// Collect every token of the statement for the given route
pub(crate) fn generate(ctx: &StatementContext, route: &RouteContext, database_type: DatabaseType) -> Result<Generated> {
    let mut generated = Generated::default();
    table_tokens(ctx, &mut generated);
    if let Some(insert) = ctx.insert() {
        if let SqlStatement::Insert(statement) = ctx.statement() {
            if let Some(key) = insert.generated_key.as_ref().filter(|k| k.appended) {
                let position = statement.columns_stop.ok_or_else(|| {
                    ShardError::UnsupportedRewrite("generated key needs an INSERT column list".into())
                })?;
                generated.tokens.push(SqlToken::GeneratedKeyColumn {
                    position,
                    column: key.column.clone(),
                });
            }
            let partitioned = route
                .units()
                .iter()
                .any(|u| route.insert_rows_of(u, insert.rows.len()).len() != insert.rows.len());
            if partitioned || insert.generated_key.as_ref().map(|k| k.appended).unwrap_or(false) {
                generated.tokens.push(SqlToken::InsertValues {
                    start: statement.values_start,
                    stop: statement.values_stop,
                });
            }
        }
    }
    if route.is_single_unit() {
        return Ok(generated);
    }
    if let (SqlStatement::Select(statement), Some(select)) = (ctx.statement(), ctx.select()) {
        select_tokens(statement, select, database_type, &mut generated)?;
    }
    Ok(generated)
}

fn table_tokens(ctx: &StatementContext, generated: &mut Generated) {
    generated
        .tokens
        .extend(ctx.statement().table_segments().iter().map(|segment| SqlToken::Table {
            start: segment.start,
            stop: segment.stop,
            logic_table: segment.name.clone(),
            quote: segment.quote,
        }));
}

fn select_tokens(
    statement: &SelectStatement,
    select: &SelectContext,
    database_type: DatabaseType,
    generated: &mut Generated,
) -> Result<()> {
    if !select.derived.is_empty() {
        generated.tokens.push(SqlToken::Projections {
            position: statement.projections_stop + 1,
            items: select.derived.iter().map(|d| d.text()).collect(),
        });
    }

    let distinct: Vec<_> = select.aggregations.iter().filter(|a| a.distinct).collect();
    if !distinct.is_empty() {
        let mut items: Vec<String> = Vec::new();
        for aggregation in &distinct {
            generated.tokens.push(SqlToken::DistinctAggregation {
                start: aggregation.start,
                stop: aggregation.stop,
                argument: aggregation.argument.clone(),
            });
            if !items.contains(&aggregation.argument) {
                items.push(aggregation.argument.clone());
            }
        }
        // shards return each distinct argument once per group
        let token = match (statement.group_by.is_empty(), statement.group_by_stop, statement.group_by_anchor) {
            (false, Some(stop), _) => SqlToken::GroupByItems { position: stop + 1, items },
            (true, _, Some(anchor)) => SqlToken::GroupBy { position: anchor, items },
            _ => {
                return Err(ShardError::UnsupportedRewrite(
                    "distinct aggregation without a GROUP BY position".into(),
                ))
            }
        };
        generated.tokens.push(token);
    } else if select.order_by_from_group_by {
        let position = statement.order_by_anchor.ok_or_else(|| {
            ShardError::UnsupportedRewrite("GROUP BY without an ORDER BY position".into())
        })?;
        generated.tokens.push(SqlToken::OrderBy {
            position,
            items: statement
                .group_by
                .iter()
                .map(|item| match item.direction {
                    OrderDirection::Asc => item.expr.text(),
                    OrderDirection::Desc => format!("{} DESC", item.expr.text()),
                })
                .collect(),
        });
    }

    if let Some(pagination) = &select.pagination {
        let generator = pagination_generator(database_type, pagination.syntax).ok_or_else(|| {
            ShardError::UnsupportedRewrite(format!(
                "{:?} pagination is not supported for {:?}",
                pagination.syntax, database_type
            ))
        })?;
        generator(pagination, select.needs_all_rows(), generated);
    }
    Ok(())
}

// ============================================================================
// Pagination
// ============================================================================

/// Literal values are rewritten in the text, parameters in the parameter list
fn revise(segment: &PaginationValueSegment, value: i64, generated: &mut Generated) {
    match segment.value {
        PaginationValue::Literal(_) => generated.tokens.push(SqlToken::PaginationValue {
            start: segment.start,
            stop: segment.stop,
            value,
        }),
        PaginationValue::Parameter(index) => generated.parameter_changes.push((index, Value::Int64(value))),
    }
}

/// Shards read from row 0 up to the revised row count.
///
/// `LIMIT` row counts become `offset + n`; `ROWNUM` and `TOP` ends are
/// absolute already and only move when every row is needed.
fn revise_window(pagination: &Pagination, fetch_all: bool, generated: &mut Generated) {
    if let Some(segment) = &pagination.offset_segment {
        revise(segment, pagination.revised_offset(), generated);
    }
    if let (Some(segment), Some(row_count)) = (&pagination.row_count_segment, pagination.revised_row_count(fetch_all)) {
        revise(segment, row_count, generated);
    }
}
