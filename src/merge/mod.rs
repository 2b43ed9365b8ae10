//! Result Merge Engine - N shard cursors presented as one logical cursor
//!
//! ```text
//! ShardCursor ─┐
//! ShardCursor ─┼─► strategy stream ─► pagination ─► MergedResult (derived columns hidden)
//! ShardCursor ─┘   (iterator / order-by / group-by)
//! ```
//!
//! The first shard error aborts the statement: every cursor is closed, the
//! buffered rows are dropped and the error is returned with the shard's
//! identity. Later calls report the result as closed.

mod aggregation;
pub mod cursor;
mod group;
mod pagination;
mod stream;

use crate::data::{Row, Value};
use crate::statement::{SelectContext, StatementContext};
use crate::{Result, ShardError};

pub use cursor::{MemoryQueryResult, QueryResult, ShardCursor};

use group::{GroupByMemory, GroupByStream};
use pagination::PaginationDecorator;
use stream::{IteratorStream, MergeStream, OrderByStream};

/// How shard rows are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// One shard, rows passed through untouched
    Transparent,
    /// Shards concatenated in route order
    Iterator,
    /// K-way merge on the ORDER BY keys
    OrderByStream,
    /// Contiguous groups over an order-by merge
    GroupByStream,
    /// Every row regrouped in memory
    GroupByMemory,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn strategy_for(&self, ctx: &StatementContext, unit_count: usize) -> MergeStrategy {
        if unit_count <= 1 {
            return MergeStrategy::Transparent;
        }
        let Some(select) = ctx.select() else {
            return MergeStrategy::Iterator;
        };
        if !select.group_by.is_empty() || select.has_aggregation() {
            if !select.has_distinct_aggregation() && select.is_same_group_by_and_order_by() {
                MergeStrategy::GroupByStream
            } else {
                MergeStrategy::GroupByMemory
            }
        } else if select.distinct_row {
            MergeStrategy::GroupByMemory
        } else if !select.order_by.is_empty() {
            MergeStrategy::OrderByStream
        } else {
            MergeStrategy::Iterator
        }
    }

    /// Combine the cursors of every route unit, in unit order
    pub fn merge(&self, ctx: &StatementContext, cursors: Vec<ShardCursor>) -> Result<MergedResult> {
        let strategy = self.strategy_for(ctx, cursors.len());
        let labels = result_labels(ctx.select(), strategy, &cursors);
        log::debug!("Merging {} shard results with {:?}", cursors.len(), strategy);

        let select = ctx.select();
        let stream: Box<dyn MergeStream> = match (strategy, select) {
            (MergeStrategy::OrderByStream, Some(select)) => {
                Box::new(OrderByStream::new(cursors, select.order_by.clone()))
            }
            (MergeStrategy::GroupByStream, Some(select)) => Box::new(GroupByStream::new(
                OrderByStream::new(cursors, select.order_by.clone()),
                select.group_by.clone(),
                select.aggregations.clone(),
            )),
            (MergeStrategy::GroupByMemory, Some(select)) => {
                let group_by = if select.distinct_row {
                    select.distinct_keys()
                } else {
                    select.group_by.clone()
                };
                Box::new(GroupByMemory::new(
                    Box::new(IteratorStream::new(cursors)),
                    group_by,
                    select.aggregations.clone(),
                    select.order_by.clone(),
                ))
            }
            _ => Box::new(IteratorStream::new(cursors)),
        };

        let stream: Box<dyn MergeStream> = match select.and_then(|s| s.pagination.as_ref()) {
            Some(pagination) if strategy != MergeStrategy::Transparent && pagination.has_window() => {
                Box::new(PaginationDecorator::new(stream, pagination))
            }
            _ => stream,
        };
        Ok(MergedResult::new(stream, labels))
    }
}

/// Labels the caller sees: the statement's visible projections, or the first
/// shard's columns when the projection list is not known column by column
fn result_labels(select: Option<&SelectContext>, strategy: MergeStrategy, cursors: &[ShardCursor]) -> Vec<String> {
    match select {
        Some(select) if strategy != MergeStrategy::Transparent && select.visible_columns > 0 => {
            select.labels.iter().take(select.visible_columns).cloned().collect()
        }
        _ => match cursors.first() {
            Some(cursor) => (0..cursor.column_count())
                .map(|i| cursor.column_label(i).unwrap_or_else(|| format!("column_{}", i + 1)))
                .collect(),
            None => select
                .map(|s| s.labels.iter().take(s.visible_columns).cloned().collect())
                .unwrap_or_default(),
        },
    }
}

/// Sum of affected-row counts over every unit of a write
pub fn merge_update_counts(counts: &[u64]) -> u64 {
    counts.iter().fold(0u64, |total, c| total.saturating_add(*c))
}

// ============================================================================
// Merged result
// ============================================================================

/// Single-consumer, forward-only view over the merged rows
pub struct MergedResult {
    stream: Box<dyn MergeStream>,
    labels: Vec<String>,
    on_row: bool,
    closed: bool,
}

impl MergedResult {
    fn new(stream: Box<dyn MergeStream>, labels: Vec<String>) -> Self {
        Self {
            stream,
            labels,
            on_row: false,
            closed: false,
        }
    }

    /// Advance to the next merged row
    pub fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(ShardError::ResultClosed);
        }
        match self.stream.next() {
            Ok(has_row) => {
                self.on_row = has_row;
                Ok(has_row)
            }
            Err(e) => {
                log::error!("Merge aborted: {}", e);
                self.close();
                Err(e)
            }
        }
    }

    /// Value of a visible column of the current row, 0-based
    pub fn value(&self, index: usize) -> Result<Value> {
        self.current()?
            .get(index)
            .filter(|_| index < self.labels.len())
            .cloned()
            .ok_or(ShardError::ColumnIndexOutOfRange(index))
    }

    /// Visible columns of the current row
    pub fn row(&self) -> Result<Row> {
        let row = self.current()?;
        Ok(row.iter().take(self.labels.len()).cloned().collect())
    }

    fn current(&self) -> Result<&Row> {
        if self.closed {
            return Err(ShardError::ResultClosed);
        }
        if !self.on_row {
            return Err(ShardError::NoCurrentRow);
        }
        self.stream.current().ok_or(ShardError::NoCurrentRow)
    }

    pub fn column_count(&self) -> usize {
        self.labels.len()
    }

    pub fn column_label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(|s| s.as_str())
    }

    /// Close every shard cursor; safe to call more than once
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.on_row = false;
            self.stream.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MergedResult {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MergedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedResult")
            .field("labels", &self.labels)
            .field("closed", &self.closed)
            .finish()
    }
}
