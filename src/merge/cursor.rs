//! Per-shard cursors
//!
//! [`QueryResult`] is what the external executor hands back for one route
//! unit. [`ShardCursor`] wraps it with the unit's identity so failures keep
//! their origin, and guarantees the underlying result is closed exactly once.

use crate::data::{Row, Value};
use crate::route::RouteUnit;
use crate::{BoxError, Result, ShardError};

/// Forward-only result of one physical statement
pub trait QueryResult: Send {
    /// Advance to the next row
    fn next(&mut self) -> std::result::Result<bool, BoxError>;

    /// Value of the current row, 0-based
    fn value(&self, index: usize) -> std::result::Result<Value, BoxError>;

    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> Option<String>;

    /// Release the physical result
    fn close(&mut self) -> std::result::Result<(), BoxError>;
}

// ============================================================================
// In-memory result
// ============================================================================

/// Rows held in memory; also what tests and embedders without a driver use
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Row>,
    /// Next row to hand out
    position: usize,
    current: Option<usize>,
    closed: bool,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            labels,
            rows,
            ..Default::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> std::result::Result<bool, BoxError> {
        if self.closed {
            return Err("result is closed".into());
        }
        if self.position < self.rows.len() {
            self.current = Some(self.position);
            self.position += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn value(&self, index: usize) -> std::result::Result<Value, BoxError> {
        let row = self
            .current
            .and_then(|i| self.rows.get(i))
            .ok_or("no current row")?;
        row.get(index)
            .cloned()
            .ok_or_else(|| format!("column {} out of range", index).into())
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> Option<String> {
        self.labels.get(index).cloned()
    }

    fn close(&mut self) -> std::result::Result<(), BoxError> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

// ============================================================================
// Shard cursor
// ============================================================================

/// A [`QueryResult`] tagged with the unit it came from
pub struct ShardCursor {
    data_source: String,
    table: String,
    inner: Box<dyn QueryResult>,
    closed: bool,
}

impl std::fmt::Debug for ShardCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardCursor")
            .field("data_source", &self.data_source)
            .field("table", &self.table)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ShardCursor {
    pub fn new(data_source: &str, table: &str, inner: Box<dyn QueryResult>) -> Self {
        Self {
            data_source: data_source.to_string(),
            table: table.to_string(),
            inner,
            closed: false,
        }
    }

    /// Cursor named after the unit's data source and first actual table
    pub fn for_unit(unit: &RouteUnit, inner: Box<dyn QueryResult>) -> Self {
        let table = unit.tables.first().map(|t| t.actual_name.as_str()).unwrap_or("");
        Self::new(unit.data_source_name(), table, inner)
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    fn propagate(&self, source: BoxError) -> ShardError {
        log::error!("Shard {}.{} failed: {}", self.data_source, self.table, source);
        ShardError::ExecutionPropagated {
            data_source: self.data_source.clone(),
            table: self.table.clone(),
            source,
        }
    }

    pub fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(ShardError::ResultClosed);
        }
        self.inner.next().map_err(|e| self.propagate(e))
    }

    /// Every column of the current row
    pub fn row(&self) -> Result<Row> {
        (0..self.inner.column_count())
            .map(|i| self.inner.value(i).map_err(|e| self.propagate(e)))
            .collect()
    }

    pub fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    pub fn column_label(&self, index: usize) -> Option<String> {
        self.inner.column_label(index)
    }

    /// Close the underlying result; later calls do nothing
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close() {
            log::warn!("Closing {}.{} failed: {}", self.data_source, self.table, e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ShardCursor {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("Cursor on {}.{} dropped without close", self.data_source, self.table);
            self.close();
        }
    }
}
