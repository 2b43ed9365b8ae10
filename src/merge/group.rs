//! Grouped merges
//!
//! - [`GroupByStream`]: shards are sorted on the group keys, so groups arrive
//!   contiguously out of an order-by merge and one group is held at a time.
//! - [`GroupByMemory`]: every shard row is read on the first `next`, regrouped
//!   by a hash of the group key and then sorted on the ORDER BY keys.

use ahash::AHashMap;

use crate::data::{Row, Value};
use crate::statement::{compare_rows, AggregationColumn, OrderColumn};
use crate::Result;

use super::aggregation::GroupAccumulator;
use super::stream::{MergeStream, OrderByStream};

fn same_group(keys: &[OrderColumn], a: &Row, b: &Row) -> bool {
    compare_rows(keys, a, b) == std::cmp::Ordering::Equal
}

// ============================================================================
// Streaming group-by
// ============================================================================

pub(crate) struct GroupByStream {
    inner: OrderByStream,
    group_by: Vec<OrderColumn>,
    aggregations: Vec<AggregationColumn>,
    /// First row of the next group, already read from `inner`
    pending: Option<Row>,
    started: bool,
    current: Option<Row>,
}

impl GroupByStream {
    pub fn new(inner: OrderByStream, group_by: Vec<OrderColumn>, aggregations: Vec<AggregationColumn>) -> Self {
        Self {
            inner,
            group_by,
            aggregations,
            pending: None,
            started: false,
            current: None,
        }
    }

    fn pull(&mut self) -> Result<Option<Row>> {
        Ok(if self.inner.next()? {
            self.inner.current().cloned()
        } else {
            None
        })
    }
}

impl MergeStream for GroupByStream {
    fn next(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            self.pending = self.pull()?;
        }
        let Some(first) = self.pending.take() else {
            self.current = None;
            return Ok(false);
        };
        let mut group = GroupAccumulator::new(first.clone(), &self.aggregations);
        while let Some(row) = self.pull()? {
            if same_group(&self.group_by, &first, &row) {
                group.accept(&row);
            } else {
                self.pending = Some(row);
                break;
            }
        }
        self.current = Some(group.finish());
        Ok(true)
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.pending = None;
        self.current = None;
        self.inner.close();
    }
}

// ============================================================================
// In-memory group-by
// ============================================================================

pub(crate) struct GroupByMemory {
    source: Box<dyn MergeStream>,
    group_by: Vec<OrderColumn>,
    aggregations: Vec<AggregationColumn>,
    order_by: Vec<OrderColumn>,
    /// Merged rows, filled on the first `next`
    rows: Option<std::vec::IntoIter<Row>>,
    current: Option<Row>,
}

impl GroupByMemory {
    pub fn new(
        source: Box<dyn MergeStream>,
        group_by: Vec<OrderColumn>,
        aggregations: Vec<AggregationColumn>,
        order_by: Vec<OrderColumn>,
    ) -> Self {
        Self {
            source,
            group_by,
            aggregations,
            order_by,
            rows: None,
            current: None,
        }
    }

    fn materialize(&mut self) -> Result<Vec<Row>> {
        let mut index: AHashMap<Vec<Value>, usize> = AHashMap::new();
        let mut groups: Vec<GroupAccumulator> = Vec::new();
        while self.source.next()? {
            let Some(row) = self.source.current() else {
                continue;
            };
            let key: Vec<Value> = self
                .group_by
                .iter()
                .map(|c| row.get(c.index).cloned().unwrap_or(Value::Null))
                .collect();
            match index.get(&key) {
                Some(&i) => groups[i].accept(row),
                None => {
                    index.insert(key, groups.len());
                    groups.push(GroupAccumulator::new(row.clone(), &self.aggregations));
                }
            }
        }
        // every row is buffered; the shards are no longer needed
        self.source.close();

        let mut rows: Vec<Row> = groups.into_iter().map(GroupAccumulator::finish).collect();
        if !self.order_by.is_empty() {
            rows.sort_by(|a, b| compare_rows(&self.order_by, a, b));
        }
        log::debug!("In-memory merge produced {} groups", rows.len());
        Ok(rows)
    }
}

impl MergeStream for GroupByMemory {
    fn next(&mut self) -> Result<bool> {
        if self.rows.is_none() {
            let rows = self.materialize()?;
            self.rows = Some(rows.into_iter());
        }
        self.current = self.rows.as_mut().and_then(|rows| rows.next());
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.rows = Some(Vec::new().into_iter());
        self.current = None;
        self.source.close();
    }
}
