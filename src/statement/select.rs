//! SELECT context - projection layout seen by the merge stage
//!
//! Shards return the visible projections followed by derived columns:
//!
//! ```text
//! AVG(x) ─► AVG_DERIVED_COUNT_n, AVG_DERIVED_SUM_n
//! ORDER BY item not projected ─► ORDER_BY_DERIVED_n
//! GROUP BY item not projected ─► GROUP_BY_DERIVED_n
//! ```
//!
//! Derived columns are appended to each shard's SELECT list by the rewrite
//! stage and hidden again once rows are merged.

use std::cmp::Ordering;

use crate::data::{compare_values, NullsOrder, Row, Value};
use crate::{Result, ShardError};

use super::pagination::Pagination;
use super::segment::{AggregationType, OrderByExpr, OrderByItem, OrderDirection, Projection};
use super::{DatabaseType, SelectStatement};

/// A sort or group key column resolved to its index in shard rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderColumn {
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls: NullsOrder,
}

impl OrderColumn {
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(a, b, self.nulls);
        match self.direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    }
}

/// Compare two rows on a list of key columns
pub fn compare_rows(columns: &[OrderColumn], a: &Row, b: &Row) -> Ordering {
    for column in columns {
        let ordering = match (a.get(column.index), b.get(column.index)) {
            (Some(x), Some(y)) => column.compare(x, y),
            _ => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// A column appended to the shard SELECT list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProjection {
    pub expression: String,
    pub alias: String,
}

impl DerivedProjection {
    pub fn text(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

/// An aggregate in the SELECT list and where its inputs live in shard rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationColumn {
    pub function: AggregationType,
    pub distinct: bool,
    pub argument: String,
    pub index: usize,
    /// Span of the aggregate call in the logic SQL
    pub start: usize,
    pub stop: usize,
    /// Derived COUNT / SUM columns of a non-distinct AVG
    pub avg_count_index: Option<usize>,
    pub avg_sum_index: Option<usize>,
}

/// Matching data of one shard result column
#[derive(Debug, Clone)]
struct ColumnEntry {
    owner: Option<String>,
    name: Option<String>,
    alias: Option<String>,
    expression: String,
}

impl ColumnEntry {
    fn label(&self) -> String {
        self.alias
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.expression.clone())
    }

    fn matches(&self, expr: &OrderByExpr) -> bool {
        match expr {
            OrderByExpr::Column { owner, name } => {
                if owner.is_none() && eq(self.alias.as_deref(), name) {
                    return true;
                }
                let owner_ok = match (owner, &self.owner) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => true,
                };
                owner_ok && eq(self.name.as_deref(), name)
            }
            OrderByExpr::Expression(text) => {
                normalize(&self.expression) == normalize(text) || eq(self.alias.as_deref(), text)
            }
            OrderByExpr::Index(_) => false,
        }
    }
}

fn eq(a: Option<&str>, b: &str) -> bool {
    a.map(|a| a.eq_ignore_ascii_case(b)).unwrap_or(false)
}

fn normalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase()
}

/// Decorated SELECT: column layout, keys, aggregates and pagination
#[derive(Debug, Clone, PartialEq)]
pub struct SelectContext {
    /// Labels of every shard column, derived ones last
    pub labels: Vec<String>,
    /// Columns the caller sees
    pub visible_columns: usize,
    pub derived: Vec<DerivedProjection>,
    pub aggregations: Vec<AggregationColumn>,
    pub group_by: Vec<OrderColumn>,
    pub order_by: Vec<OrderColumn>,
    /// ORDER BY was absent and copied from GROUP BY
    pub order_by_from_group_by: bool,
    /// `SELECT DISTINCT` without GROUP BY or aggregates: rows are regrouped on
    /// every visible column
    pub distinct_row: bool,
    pub pagination: Option<Pagination>,
}

impl SelectContext {
    pub fn new(statement: &SelectStatement, params: &[Value], database_type: DatabaseType) -> Result<Self> {
        let mut entries: Vec<ColumnEntry> = Vec::new();
        let mut unexpanded_shorthand = false;
        let mut pending_aggregations = Vec::new();
        for projection in &statement.projections {
            match projection {
                Projection::Shorthand { owner, columns } => {
                    if columns.is_empty() {
                        unexpanded_shorthand = true;
                    }
                    entries.extend(columns.iter().map(|c| ColumnEntry {
                        owner: owner.clone(),
                        name: Some(c.clone()),
                        alias: None,
                        expression: c.clone(),
                    }));
                }
                Projection::Column { owner, name, alias } => entries.push(ColumnEntry {
                    owner: owner.clone(),
                    name: Some(name.clone()),
                    alias: alias.clone(),
                    expression: projection.expression(),
                }),
                Projection::Aggregation { function, distinct, argument, start, stop, .. } => {
                    pending_aggregations.push(AggregationColumn {
                        function: *function,
                        distinct: *distinct,
                        argument: argument.clone(),
                        index: entries.len(),
                        start: *start,
                        stop: *stop,
                        avg_count_index: None,
                        avg_sum_index: None,
                    });
                    entries.push(ColumnEntry {
                        owner: None,
                        name: None,
                        alias: projection.alias().map(|a| a.to_string()),
                        expression: projection.expression(),
                    });
                }
                Projection::Expression { .. } => entries.push(ColumnEntry {
                    owner: None,
                    name: None,
                    alias: projection.alias().map(|a| a.to_string()),
                    expression: projection.expression(),
                }),
            }
        }
        if unexpanded_shorthand && statement.projections.len() > 1 {
            return Err(ShardError::UnsupportedRewrite(
                "cannot place columns after an unexpanded '*' projection".into(),
            ));
        }
        let visible_columns = entries.len();
        let mut derived: Vec<DerivedProjection> = Vec::new();
        let mut push_derived = |entries: &mut Vec<ColumnEntry>, expression: String, alias: String| -> usize {
            let (owner, name) = match expression.split_once('.') {
                Some((o, n)) if !o.contains('(') => (Some(o.to_string()), Some(n.to_string())),
                _ if !expression.contains('(') => (None, Some(expression.clone())),
                _ => (None, None),
            };
            entries.push(ColumnEntry {
                owner,
                name,
                alias: Some(alias.clone()),
                expression: expression.clone(),
            });
            derived.push(DerivedProjection { expression, alias });
            entries.len() - 1
        };

        let mut avg_seq = 0;
        for aggregation in pending_aggregations.iter_mut() {
            if aggregation.function == AggregationType::Avg && !aggregation.distinct {
                let count = push_derived(
                    &mut entries,
                    format!("COUNT({})", aggregation.argument),
                    format!("AVG_DERIVED_COUNT_{}", avg_seq),
                );
                let sum = push_derived(
                    &mut entries,
                    format!("SUM({})", aggregation.argument),
                    format!("AVG_DERIVED_SUM_{}", avg_seq),
                );
                aggregation.avg_count_index = Some(count);
                aggregation.avg_sum_index = Some(sum);
                avg_seq += 1;
            }
        }

        let nulls_default = database_type.default_nulls_order();
        let mut resolve_items = |entries: &mut Vec<ColumnEntry>, items: &[OrderByItem], prefix: &str| -> Result<Vec<OrderColumn>> {
            let mut seq = 0;
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                let found = match &item.expr {
                    OrderByExpr::Index(i) if *i >= 1 && *i <= visible_columns => Some(i - 1),
                    OrderByExpr::Index(i) => return Err(ShardError::ColumnIndexOutOfRange(*i)),
                    expr => entries.iter().position(|e| e.matches(expr)),
                };
                let index = match found {
                    Some(index) => index,
                    None if unexpanded_shorthand => {
                        return Err(ShardError::UnsupportedRewrite(format!(
                            "cannot derive '{}' next to an unexpanded '*' projection",
                            item.expr.text()
                        )))
                    }
                    None => {
                        let alias = format!("{}_DERIVED_{}", prefix, seq);
                        seq += 1;
                        push_derived(entries, item.expr.text(), alias)
                    }
                };
                resolved.push(OrderColumn {
                    index,
                    direction: item.direction,
                    nulls: item.nulls.unwrap_or(nulls_default),
                });
            }
            Ok(resolved)
        };
        let mut order_by = resolve_items(&mut entries, &statement.order_by, "ORDER_BY")?;
        let group_by = resolve_items(&mut entries, &statement.group_by, "GROUP_BY")?;

        let order_by_from_group_by = order_by.is_empty() && !group_by.is_empty();
        if order_by_from_group_by {
            order_by = group_by.clone();
        }
        let distinct_row = statement.distinct_row && group_by.is_empty() && pending_aggregations.is_empty();
        let pagination = statement
            .pagination
            .as_ref()
            .map(|p| Pagination::resolve(p, params))
            .transpose()?;

        Ok(Self {
            labels: entries.iter().map(|e| e.label()).collect(),
            visible_columns,
            derived,
            aggregations: pending_aggregations,
            group_by,
            order_by,
            order_by_from_group_by,
            distinct_row,
            pagination,
        })
    }

    pub fn column_count(&self) -> usize {
        self.labels.len()
    }

    pub fn has_aggregation(&self) -> bool {
        !self.aggregations.is_empty()
    }

    pub fn has_distinct_aggregation(&self) -> bool {
        self.aggregations.iter().any(|a| a.distinct)
    }

    /// GROUP BY and ORDER BY name the same keys in the same order
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        !self.group_by.is_empty() && self.group_by == self.order_by
    }

    /// Shards must return all rows because grouping happens after the merge
    pub fn needs_all_rows(&self) -> bool {
        ((!self.group_by.is_empty() || self.has_aggregation()) && !self.is_same_group_by_and_order_by())
            || self.distinct_row
            || self.has_distinct_aggregation()
    }

    /// Visible columns as group keys, for DISTINCT rows
    pub fn distinct_keys(&self) -> Vec<OrderColumn> {
        (0..self.visible_columns)
            .map(|index| OrderColumn {
                index,
                direction: OrderDirection::Asc,
                nulls: NullsOrder::Low,
            })
            .collect()
    }
}
