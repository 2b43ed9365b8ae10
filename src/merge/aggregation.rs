//! Aggregate recomposition
//!
//! Each shard returns partial aggregates per group. A unit folds the partials
//! of one aggregate column back into the global value:
//!
//! | function        | partial               | merged                      |
//! |-----------------|-----------------------|-----------------------------|
//! | SUM, COUNT      | per-shard total       | sum of totals               |
//! | MIN, MAX        | per-shard extreme     | extreme of extremes         |
//! | AVG             | derived COUNT and SUM | SUM / COUNT                 |
//! | AGG(DISTINCT x) | x, one row per value  | AGG over the set of values  |

use std::cmp::Ordering;

use ahash::AHashSet;

use crate::data::{compare_non_null, Row, Value};
use crate::statement::{AggregationColumn, AggregationType};

#[derive(Debug, Clone)]
enum State {
    Additive(Value),
    Extreme(Value),
    Average { count: Value, sum: Value },
    Distinct(AHashSet<Value>),
}

/// Accumulator for one aggregate column of one group
#[derive(Debug, Clone)]
pub(crate) struct AggregationUnit {
    function: AggregationType,
    index: usize,
    avg_count_index: Option<usize>,
    avg_sum_index: Option<usize>,
    state: State,
}

impl AggregationUnit {
    pub fn new(column: &AggregationColumn) -> Self {
        let state = if column.distinct {
            State::Distinct(AHashSet::new())
        } else {
            match column.function {
                AggregationType::Sum | AggregationType::Count => State::Additive(Value::Null),
                AggregationType::Min | AggregationType::Max => State::Extreme(Value::Null),
                AggregationType::Avg => State::Average {
                    count: Value::Null,
                    sum: Value::Null,
                },
            }
        };
        Self {
            function: column.function,
            index: column.index,
            avg_count_index: column.avg_count_index,
            avg_sum_index: column.avg_sum_index,
            state,
        }
    }

    /// Fold one shard row into the accumulator
    pub fn accept(&mut self, row: &Row) {
        let value = row.get(self.index).unwrap_or(&Value::Null);
        match &mut self.state {
            State::Additive(total) => *total = total.add(value),
            State::Extreme(extreme) => {
                if !value.is_null() && (extreme.is_null() || replaces(self.function, value, extreme)) {
                    *extreme = value.clone();
                }
            }
            State::Average { count, sum } => {
                let cell = |index: Option<usize>| index.and_then(|i| row.get(i)).unwrap_or(&Value::Null);
                *count = count.add(cell(self.avg_count_index));
                *sum = sum.add(cell(self.avg_sum_index));
            }
            State::Distinct(values) => {
                if !value.is_null() {
                    values.insert(value.clone());
                }
            }
        }
    }

    /// Merged value of the aggregate
    pub fn result(&self) -> Value {
        match &self.state {
            State::Additive(total) => match (self.function, total) {
                (AggregationType::Count, Value::Null) => Value::Int64(0),
                _ => total.clone(),
            },
            State::Extreme(extreme) => extreme.clone(),
            State::Average { count, sum } => average(sum, count.as_f64()),
            State::Distinct(values) => match self.function {
                AggregationType::Count => Value::Int64(values.len() as i64),
                AggregationType::Sum => values.iter().fold(Value::Null, |acc, v| acc.add(v)),
                AggregationType::Avg => {
                    let sum = values.iter().fold(Value::Null, |acc, v| acc.add(v));
                    average(&sum, Some(values.len() as f64))
                }
                AggregationType::Min | AggregationType::Max => {
                    values.iter().fold(Value::Null, |acc, v| {
                        if acc.is_null() || replaces(self.function, v, &acc) {
                            v.clone()
                        } else {
                            acc
                        }
                    })
                }
            },
        }
    }
}

/// Whether `candidate` beats the current MIN/MAX
fn replaces(function: AggregationType, candidate: &Value, extreme: &Value) -> bool {
    let ordering = compare_non_null(candidate, extreme);
    match function {
        AggregationType::Max => ordering == Ordering::Greater,
        _ => ordering == Ordering::Less,
    }
}

fn average(sum: &Value, count: Option<f64>) -> Value {
    match (sum.as_f64(), count) {
        (Some(sum), Some(count)) if count != 0.0 => Value::Float64(sum / count),
        _ => Value::Null,
    }
}

/// One output group: its first row plus an accumulator per aggregate
#[derive(Debug, Clone)]
pub(crate) struct GroupAccumulator {
    first: Row,
    units: Vec<AggregationUnit>,
}

impl GroupAccumulator {
    pub fn new(first: Row, columns: &[AggregationColumn]) -> Self {
        let mut group = Self {
            units: columns.iter().map(AggregationUnit::new).collect(),
            first: Vec::new(),
        };
        group.accept(&first);
        group.first = first;
        group
    }

    pub fn accept(&mut self, row: &Row) {
        for unit in &mut self.units {
            unit.accept(row);
        }
    }

    /// The group's row with every aggregate column replaced by its merged value
    pub fn finish(self) -> Row {
        let mut row = self.first;
        for unit in &self.units {
            if let Some(cell) = row.get_mut(unit.index) {
                *cell = unit.result();
            }
        }
        row
    }
}
