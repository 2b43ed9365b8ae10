//! SQL tokens - positioned edits of the logic SQL text
//!
//! A token either substitutes an inclusive byte span or attaches text before
//! a byte position. Tokens are produced once per statement and materialized
//! once per route unit.

use crate::route::RouteUnit;
use crate::statement::{InsertContext, QuoteCharacter};
use crate::{Result, ShardError};

/// Edit applied to the logic SQL
#[derive(Debug, Clone, PartialEq)]
pub enum SqlToken {
    /// Logic table name replaced by the unit's actual table
    Table {
        start: usize,
        stop: usize,
        logic_table: String,
        quote: QuoteCharacter,
    },
    /// Pagination literal replaced by its per-shard value
    PaginationValue { start: usize, stop: usize, value: i64 },
    /// Derived columns appended to the SELECT list
    Projections { position: usize, items: Vec<String> },
    /// Columns appended to an existing GROUP BY
    GroupByItems { position: usize, items: Vec<String> },
    /// GROUP BY clause added to a statement without one
    GroupBy { position: usize, items: Vec<String> },
    /// ORDER BY clause added to a statement without one
    OrderBy { position: usize, items: Vec<String> },
    /// `AGG(DISTINCT x)` replaced by `x`
    DistinctAggregation { start: usize, stop: usize, argument: String },
    /// Generated key column appended to the INSERT column list
    GeneratedKeyColumn { position: usize, column: String },
    /// VALUES rows replaced by the rows routed to the unit
    InsertValues { start: usize, stop: usize },
}

impl SqlToken {
    /// First byte the token touches
    pub fn start(&self) -> usize {
        match self {
            SqlToken::Table { start, .. }
            | SqlToken::PaginationValue { start, .. }
            | SqlToken::DistinctAggregation { start, .. }
            | SqlToken::InsertValues { start, .. } => *start,
            SqlToken::Projections { position, .. }
            | SqlToken::GroupByItems { position, .. }
            | SqlToken::GroupBy { position, .. }
            | SqlToken::OrderBy { position, .. }
            | SqlToken::GeneratedKeyColumn { position, .. } => *position,
        }
    }

    /// Inclusive end of a substituted span; `None` for attached text
    pub fn stop(&self) -> Option<usize> {
        match self {
            SqlToken::Table { stop, .. }
            | SqlToken::PaginationValue { stop, .. }
            | SqlToken::DistinctAggregation { stop, .. }
            | SqlToken::InsertValues { stop, .. } => Some(*stop),
            _ => None,
        }
    }

    /// Order among tokens at the same position: attached text first, in
    /// clause order
    fn rank(&self) -> u8 {
        match self {
            SqlToken::GeneratedKeyColumn { .. } => 0,
            SqlToken::Projections { .. } => 1,
            SqlToken::GroupByItems { .. } | SqlToken::GroupBy { .. } => 2,
            SqlToken::OrderBy { .. } => 3,
            _ => 4,
        }
    }

    /// Replacement text for one unit
    fn materialize(&self, sql: &str, unit: &RouteUnit, insert: Option<&InsertPart<'_>>) -> Result<String> {
        Ok(match self {
            SqlToken::Table { logic_table, quote, .. } => {
                quote.wrap(unit.actual_table(logic_table).unwrap_or(logic_table))
            }
            SqlToken::PaginationValue { value, .. } => value.to_string(),
            SqlToken::Projections { items, .. } | SqlToken::GroupByItems { items, .. } => {
                items.iter().map(|i| format!(", {}", i)).collect()
            }
            SqlToken::GroupBy { items, .. } => format!(" GROUP BY {}", items.join(", ")),
            SqlToken::OrderBy { items, .. } => format!(" ORDER BY {}", items.join(", ")),
            SqlToken::DistinctAggregation { argument, .. } => argument.clone(),
            SqlToken::GeneratedKeyColumn { column, .. } => format!(", {}", column),
            SqlToken::InsertValues { .. } => {
                let Some(part) = insert else {
                    return Err(ShardError::UnsupportedRewrite(
                        "VALUES token without insert context".into(),
                    ));
                };
                part.render(sql)?
            }
        })
    }
}

/// Rows of one unit in a multi-row INSERT
pub(crate) struct InsertPart<'a> {
    pub context: &'a InsertContext,
    /// `(start, stop)` of every VALUES row of the statement
    pub spans: &'a [(usize, usize)],
    /// Rows routed to the unit
    pub row_indexes: Vec<usize>,
}

impl InsertPart<'_> {
    fn render(&self, sql: &str) -> Result<String> {
        let key = self.context.generated_key.as_ref().filter(|k| k.appended);
        let mut rendered = Vec::with_capacity(self.row_indexes.len());
        for &row in &self.row_indexes {
            let (start, stop) = self.spans.get(row).copied().ok_or_else(|| {
                ShardError::Configuration(format!("INSERT row {} has no source span", row))
            })?;
            match key {
                Some(key) => {
                    let body = slice(sql, start, stop)?;
                    let value = if key.as_parameter {
                        "?".to_string()
                    } else {
                        key.values.get(row).map(|v| v.to_sql_literal()).unwrap_or_else(|| "NULL".into())
                    };
                    rendered.push(format!("{}, {})", body, value));
                }
                None => rendered.push(slice(sql, start, stop + 1)?.to_string()),
            }
        }
        Ok(rendered.join(", "))
    }
}

fn slice(sql: &str, start: usize, end: usize) -> Result<&str> {
    sql.get(start..end).ok_or_else(|| {
        ShardError::Configuration(format!("span {}..{} is outside the SQL text", start, end))
    })
}

/// Sort tokens into splice order and reject overlaps or bad spans
pub(crate) fn arrange(sql: &str, mut tokens: Vec<SqlToken>) -> Result<Vec<SqlToken>> {
    tokens.sort_by_key(|t| (t.start(), t.rank()));
    let mut cursor = 0usize;
    let mut previous = 0usize;
    for token in &tokens {
        let start = token.start();
        if start < cursor {
            return Err(ShardError::OverlappingTokens {
                first: previous,
                second: start,
            });
        }
        let end = match token.stop() {
            Some(stop) if stop < start => {
                return Err(ShardError::Configuration(format!(
                    "token span {}..={} is reversed",
                    start, stop
                )))
            }
            Some(stop) => stop + 1,
            None => start,
        };
        if sql.get(start..end).is_none() {
            return Err(ShardError::Configuration(format!(
                "token span {}..{} is outside the SQL text",
                start, end
            )));
        }
        previous = start;
        cursor = end;
    }
    Ok(tokens)
}

/// Splice arranged tokens into the SQL for one unit
pub(crate) fn render(
    sql: &str,
    tokens: &[SqlToken],
    unit: &RouteUnit,
    insert: Option<&InsertPart<'_>>,
) -> Result<String> {
    let mut result = String::with_capacity(sql.len() + 16 * tokens.len());
    let mut cursor = 0usize;
    for token in tokens {
        let start = token.start();
        result.push_str(slice(sql, cursor, start)?);
        result.push_str(&token.materialize(sql, unit, insert)?);
        cursor = token.stop().map(|stop| stop + 1).unwrap_or(start);
    }
    result.push_str(slice(sql, cursor, sql.len())?);
    Ok(result)
}
