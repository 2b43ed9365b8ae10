//! Row streams over shard cursors
//!
//! Every merge strategy is a [`MergeStream`]: a forward-only source of full
//! shard rows (derived columns included). Streams own their cursors and
//! close them when closed themselves.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::data::Row;
use crate::statement::{compare_rows, OrderColumn};
use crate::Result;

use super::cursor::ShardCursor;

pub(crate) trait MergeStream: Send {
    fn next(&mut self) -> Result<bool>;

    /// Row the stream is positioned on
    fn current(&self) -> Option<&Row>;

    /// Close every underlying cursor and drop buffered rows
    fn close(&mut self);
}

// ============================================================================
// Iterator stream
// ============================================================================

/// Shards one after another, in route order
pub(crate) struct IteratorStream {
    cursors: Vec<ShardCursor>,
    position: usize,
    current: Option<Row>,
}

impl IteratorStream {
    pub fn new(cursors: Vec<ShardCursor>) -> Self {
        Self {
            cursors,
            position: 0,
            current: None,
        }
    }
}

impl MergeStream for IteratorStream {
    fn next(&mut self) -> Result<bool> {
        while let Some(cursor) = self.cursors.get_mut(self.position) {
            if cursor.next()? {
                self.current = Some(cursor.row()?);
                return Ok(true);
            }
            self.position += 1;
        }
        self.current = None;
        Ok(false)
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.current = None;
        for cursor in &mut self.cursors {
            cursor.close();
        }
    }
}

// ============================================================================
// Order-by stream
// ============================================================================

/// Head row of one shard
struct HeapItem {
    row: Row,
    shard: usize,
    keys: Arc<Vec<OrderColumn>>,
}

impl Eq for HeapItem {}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties go to the lower shard index
        compare_rows(&self.keys, &other.row, &self.row).then_with(|| other.shard.cmp(&self.shard))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merge of shard results that are each sorted on the same keys.
///
/// Holds at most one buffered row per shard.
pub(crate) struct OrderByStream {
    cursors: Vec<ShardCursor>,
    keys: Arc<Vec<OrderColumn>>,
    heap: BinaryHeap<HeapItem>,
    initialized: bool,
    current: Option<Row>,
}

impl OrderByStream {
    pub fn new(cursors: Vec<ShardCursor>, keys: Vec<OrderColumn>) -> Self {
        let heap = BinaryHeap::with_capacity(cursors.len());
        Self {
            cursors,
            keys: Arc::new(keys),
            heap,
            initialized: false,
            current: None,
        }
    }

    fn advance(&mut self, shard: usize) -> Result<()> {
        let Some(cursor) = self.cursors.get_mut(shard) else {
            return Ok(());
        };
        if cursor.next()? {
            self.heap.push(HeapItem {
                row: cursor.row()?,
                shard,
                keys: Arc::clone(&self.keys),
            });
        }
        Ok(())
    }
}

impl MergeStream for OrderByStream {
    fn next(&mut self) -> Result<bool> {
        if !self.initialized {
            self.initialized = true;
            for shard in 0..self.cursors.len() {
                self.advance(shard)?;
            }
        }
        match self.heap.pop() {
            Some(item) => {
                self.advance(item.shard)?;
                self.current = Some(item.row);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.heap.clear();
        self.current = None;
        for cursor in &mut self.cursors {
            cursor.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{NullsOrder, Value};
    use crate::merge::cursor::MemoryQueryResult;
    use crate::statement::OrderDirection;

    pub(crate) fn cursor(shard: &str, rows: Vec<Row>) -> ShardCursor {
        let width = rows.first().map(|r| r.len()).unwrap_or(1);
        let labels = (0..width).map(|i| format!("c{}", i)).collect();
        ShardCursor::new(shard, "t", Box::new(MemoryQueryResult::new(labels, rows)))
    }

    pub(crate) fn ints(values: &[i64]) -> Vec<Row> {
        values.iter().map(|v| vec![Value::Int64(*v)]).collect()
    }

    pub(crate) fn drain(stream: &mut dyn MergeStream) -> Vec<Row> {
        let mut rows = Vec::new();
        while stream.next().unwrap() {
            rows.push(stream.current().unwrap().clone());
        }
        rows
    }

    fn key(direction: OrderDirection) -> Vec<OrderColumn> {
        vec![OrderColumn {
            index: 0,
            direction,
            nulls: NullsOrder::Low,
        }]
    }

    #[test]
    fn test_iterator_concatenates_in_route_order() {
        let mut stream = IteratorStream::new(vec![
            cursor("ds0", ints(&[3, 1])),
            cursor("ds1", Vec::new()),
            cursor("ds2", ints(&[2])),
        ]);
        assert_eq!(drain(&mut stream), ints(&[3, 1, 2]));
    }

    #[test]
    fn test_order_by_interleaves_sorted_shards() {
        let mut stream = OrderByStream::new(
            vec![cursor("ds0", ints(&[1, 3, 5, 7])), cursor("ds1", ints(&[2, 4, 6, 8]))],
            key(OrderDirection::Asc),
        );
        assert_eq!(drain(&mut stream), ints(&[1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn test_order_by_desc_with_nulls() {
        let mut stream = OrderByStream::new(
            vec![
                cursor("ds0", vec![vec![Value::Int64(9)], vec![Value::Null]]),
                cursor("ds1", vec![vec![Value::Int64(4)]]),
            ],
            key(OrderDirection::Desc),
        );
        let rows = drain(&mut stream);
        assert_eq!(rows, vec![vec![Value::Int64(9)], vec![Value::Int64(4)], vec![Value::Null]]);
    }

    #[test]
    fn test_equal_keys_prefer_lower_shard() {
        let mut stream = OrderByStream::new(
            vec![
                cursor("ds0", vec![vec![Value::Int64(1), Value::from("a")]]),
                cursor("ds1", vec![vec![Value::Int64(1), Value::from("b")]]),
            ],
            key(OrderDirection::Asc),
        );
        let rows = drain(&mut stream);
        assert_eq!(rows[0][1], Value::from("a"));
        assert_eq!(rows[1][1], Value::from("b"));
    }
}
