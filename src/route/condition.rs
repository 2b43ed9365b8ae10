//! Sharding conditions - WHERE predicates reduced to sharding values
//!
//! Each AND group becomes one [`ShardingCondition`]. Values on the same
//! column inside a group are intersected; a group whose intersection is
//! empty can match no row and is dropped.

use std::ops::Bound;

use crate::algorithm::ValueRange;
use crate::data::Value;
use crate::rule::ShardingRule;
use crate::statement::{ColumnCondition, ConditionOperator, Operand, StatementContext};
use crate::Result;

/// Values a sharding column may take
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValues {
    Precise(Vec<Value>),
    Range(ValueRange),
}

impl ShardingValues {
    /// Intersection, `None` when nothing satisfies both
    pub fn intersect(&self, other: &ShardingValues) -> Option<ShardingValues> {
        let result = match (self, other) {
            (ShardingValues::Precise(a), ShardingValues::Precise(b)) => {
                ShardingValues::Precise(a.iter().filter(|v| b.contains(v)).cloned().collect())
            }
            (ShardingValues::Precise(values), ShardingValues::Range(range))
            | (ShardingValues::Range(range), ShardingValues::Precise(values)) => {
                ShardingValues::Precise(values.iter().filter(|v| range.contains(v)).cloned().collect())
            }
            (ShardingValues::Range(a), ShardingValues::Range(b)) => ShardingValues::Range(a.intersect(b)?),
        };
        match &result {
            ShardingValues::Precise(values) if values.is_empty() => None,
            _ => Some(result),
        }
    }
}

/// Sharding values of one AND group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    /// (lower-cased table, lower-cased column, values)
    values: Vec<(String, String, ShardingValues)>,
}

impl ShardingCondition {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add values for a column, intersecting with what is already known.
    /// Returns `false` when the group became unsatisfiable.
    pub fn add(&mut self, table: &str, column: &str, values: ShardingValues) -> bool {
        let table = table.to_ascii_lowercase();
        let column = column.to_ascii_lowercase();
        match self.values.iter_mut().find(|(t, c, _)| *t == table && *c == column) {
            Some((_, _, existing)) => match existing.intersect(&values) {
                Some(merged) => {
                    *existing = merged;
                    true
                }
                None => false,
            },
            None => {
                self.values.push((table, column, values));
                true
            }
        }
    }

    pub fn get(&self, table: &str, column: &str) -> Option<&ShardingValues> {
        self.values
            .iter()
            .find(|(t, c, _)| t.eq_ignore_ascii_case(table) && c.eq_ignore_ascii_case(column))
            .map(|(_, _, v)| v)
    }

    /// Values for `column` of `table`, or of a table bound to it
    pub fn values_for(&self, rule: &ShardingRule, table: &str, column: &str) -> Option<&ShardingValues> {
        if let Some(values) = self.get(table, column) {
            return Some(values);
        }
        rule.binding_group(table)?
            .iter()
            .filter(|t| !t.eq_ignore_ascii_case(table))
            .find_map(|t| self.get(t, column))
    }
}

/// All sharding conditions of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingConditions {
    /// OR of groups; a group without values routes everywhere
    Groups(Vec<ShardingCondition>),
    /// Every group is unsatisfiable
    AlwaysFalse,
}

impl ShardingConditions {
    /// Conditions of a SELECT, UPDATE or DELETE
    pub fn from_where(ctx: &StatementContext, rule: &ShardingRule) -> Result<Self> {
        let where_groups = ctx.statement().where_groups();
        if where_groups.is_empty() {
            return Ok(ShardingConditions::Groups(vec![ShardingCondition::default()]));
        }
        let mut groups = Vec::with_capacity(where_groups.len());
        'group: for and_group in where_groups {
            let mut condition = ShardingCondition::default();
            for column_condition in and_group {
                if !rule.is_sharding_column(&column_condition.table, &column_condition.column) {
                    continue;
                }
                let values = match to_values(ctx, column_condition)? {
                    Some(values) => values,
                    None => continue 'group,
                };
                if !condition.add(&column_condition.table, &column_condition.column, values) {
                    continue 'group;
                }
            }
            groups.push(condition);
        }
        if groups.is_empty() {
            Ok(ShardingConditions::AlwaysFalse)
        } else {
            Ok(ShardingConditions::Groups(groups))
        }
    }

    /// One condition per INSERT row, with the row's sharding column values
    pub fn from_insert(ctx: &StatementContext, rule: &ShardingRule) -> Vec<ShardingCondition> {
        let Some(insert) = ctx.insert() else {
            return Vec::new();
        };
        let sharding_columns: Vec<&str> = insert
            .columns
            .iter()
            .map(|c| c.as_str())
            .filter(|c| rule.is_sharding_column(&insert.table, c))
            .collect();
        (0..insert.rows.len())
            .map(|row| {
                let mut condition = ShardingCondition::default();
                for column in &sharding_columns {
                    if let Some(value) = insert.value_of(row, column).filter(|v| !v.is_null()) {
                        condition.add(&insert.table, column, ShardingValues::Precise(vec![value.clone()]));
                    }
                }
                condition
            })
            .collect()
    }
}

/// Sharding values of one predicate; `None` when it can never be true
fn to_values(ctx: &StatementContext, condition: &ColumnCondition) -> Result<Option<ShardingValues>> {
    let bound = |operand: &Operand, inclusive: bool| -> Result<Option<Bound<Value>>> {
        let value = ctx.resolve(operand)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(if inclusive {
            Bound::Included(value)
        } else {
            Bound::Excluded(value)
        }))
    };
    let range = |lower: Option<Bound<Value>>, upper: Option<Bound<Value>>| match (lower, upper) {
        (Some(l), Some(u)) => {
            let r = ValueRange::new(l, u);
            (!r.is_empty()).then_some(ShardingValues::Range(r))
        }
        _ => None,
    };
    Ok(match &condition.operator {
        ConditionOperator::Eq(operand) => {
            let value = ctx.resolve(operand)?;
            (!value.is_null()).then(|| ShardingValues::Precise(vec![value]))
        }
        ConditionOperator::In(operands) => {
            let mut values: Vec<Value> = Vec::with_capacity(operands.len());
            for operand in operands {
                let value = ctx.resolve(operand)?;
                if !value.is_null() && !values.contains(&value) {
                    values.push(value);
                }
            }
            (!values.is_empty()).then_some(ShardingValues::Precise(values))
        }
        ConditionOperator::Between(low, high) => range(bound(low, true)?, bound(high, true)?),
        ConditionOperator::Lt(o) => range(Some(Bound::Unbounded), bound(o, false)?),
        ConditionOperator::Le(o) => range(Some(Bound::Unbounded), bound(o, true)?),
        ConditionOperator::Gt(o) => range(bound(o, false)?, Some(Bound::Unbounded)),
        ConditionOperator::Ge(o) => range(bound(o, true)?, Some(Bound::Unbounded)),
    })
}
