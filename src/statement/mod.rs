//! Bound statements and their per-execution context
//!
//! [`SqlStatement`] is what an external parser/binder hands over: statement
//! category, positioned table segments, sharding-relevant conditions and the
//! SELECT/INSERT shape. It is immutable and shared across executions.
//!
//! [`StatementContext`] decorates one statement with one parameter list:
//! derived projections, resolved ORDER BY/GROUP BY indices, pagination and
//! generated keys. Building it never touches the statement itself.

pub mod context;
pub mod insert;
pub mod pagination;
pub mod segment;
pub mod select;

use serde::{Deserialize, Serialize};

use crate::data::NullsOrder;

pub use context::StatementContext;
pub use insert::{GeneratedKeyContext, InsertContext, InsertRowContext};
pub use pagination::Pagination;
pub use segment::*;
pub use select::{compare_rows, AggregationColumn, DerivedProjection, OrderColumn, SelectContext};

// ============================================================================
// Dialect
// ============================================================================

/// SQL dialect of the physical databases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    MySQL,
    PostgreSQL,
    Oracle,
    SQLServer,
}

impl DatabaseType {
    /// Where the dialect sorts NULL when the statement does not say
    pub fn default_nulls_order(&self) -> NullsOrder {
        match self {
            DatabaseType::MySQL | DatabaseType::SQLServer => NullsOrder::Low,
            DatabaseType::PostgreSQL | DatabaseType::Oracle => NullsOrder::High,
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// Statement category tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Dal,
    Tcl,
    Dcl,
}

/// A bound statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(DmlStatement),
    Delete(DmlStatement),
    Ddl(SchemaStatement),
    Dal(DalStatement),
    Tcl,
    Dcl(SchemaStatement),
}

impl SqlStatement {
    pub fn kind(&self) -> StatementKind {
        match self {
            SqlStatement::Select(_) => StatementKind::Select,
            SqlStatement::Insert(_) => StatementKind::Insert,
            SqlStatement::Update(_) => StatementKind::Update,
            SqlStatement::Delete(_) => StatementKind::Delete,
            SqlStatement::Ddl(_) => StatementKind::Ddl,
            SqlStatement::Dal(_) => StatementKind::Dal,
            SqlStatement::Tcl => StatementKind::Tcl,
            SqlStatement::Dcl(_) => StatementKind::Dcl,
        }
    }

    /// Every table segment, in text order
    pub fn table_segments(&self) -> &[TableSegment] {
        match self {
            SqlStatement::Select(s) => &s.tables,
            SqlStatement::Insert(s) => std::slice::from_ref(&s.table),
            SqlStatement::Update(s) | SqlStatement::Delete(s) => &s.tables,
            SqlStatement::Ddl(s) | SqlStatement::Dcl(s) => &s.tables,
            SqlStatement::Dal(s) => &s.tables,
            SqlStatement::Tcl => &[],
        }
    }

    /// Distinct logic table names in first-appearance order
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in self.table_segments() {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&segment.name)) {
                names.push(segment.name.clone());
            }
        }
        names
    }

    /// WHERE conditions, for statements that have them
    pub fn where_groups(&self) -> &[Vec<ColumnCondition>] {
        match self {
            SqlStatement::Select(s) => &s.where_groups,
            SqlStatement::Update(s) | SqlStatement::Delete(s) => &s.where_groups,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub tables: Vec<TableSegment>,
    pub where_groups: WhereGroups,
    pub projections: Vec<Projection>,
    /// Span of the SELECT list
    pub projections_start: usize,
    pub projections_stop: usize,
    /// `SELECT DISTINCT`
    pub distinct_row: bool,
    pub group_by: Vec<OrderByItem>,
    /// Last byte of the GROUP BY clause
    pub group_by_stop: Option<usize>,
    /// Where a GROUP BY clause would start when the statement has none
    pub group_by_anchor: Option<usize>,
    pub order_by: Vec<OrderByItem>,
    /// Where an ORDER BY clause would start when the statement has none
    pub order_by_anchor: Option<usize>,
    pub pagination: Option<PaginationSegment>,
    /// `FOR UPDATE` / `LOCK IN SHARE MODE`
    pub lock: bool,
    pub contains_join: bool,
    pub contains_subquery: bool,
    pub contains_having: bool,
    /// Projects `LAST_INSERT_ID()` or a similar session-local value
    pub last_insert_id: bool,
}

impl SelectStatement {
    pub fn aggregations(&self) -> impl Iterator<Item = &Projection> {
        self.projections
            .iter()
            .filter(|p| matches!(p, Projection::Aggregation { .. }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableSegment,
    pub columns: Vec<String>,
    /// The closing parenthesis of the column list
    pub columns_stop: Option<usize>,
    pub rows: Vec<InsertRowSegment>,
    /// Span covering every row of the VALUES clause
    pub values_start: usize,
    pub values_stop: usize,
}

/// UPDATE and DELETE
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DmlStatement {
    pub tables: Vec<TableSegment>,
    pub where_groups: WhereGroups,
}

/// DDL and DCL: only the touched tables matter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaStatement {
    pub tables: Vec<TableSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DalKind {
    /// `SET ...`: every data source
    Set,
    /// `SHOW DATABASES`: every data source
    ShowDatabases,
    /// `SHOW TABLES`, `DESCRIBE t`, `SHOW CREATE TABLE t`, ...
    Show,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DalStatement {
    pub kind: DalKind,
    pub tables: Vec<TableSegment>,
}

// ============================================================================
// Hints
// ============================================================================

/// Per-statement routing hints supplied by the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintContext {
    /// Unicast target chosen by the caller
    pub data_source: Option<String>,
    /// Route reads to the write data source
    pub write_route_only: bool,
    /// The session has an open transaction
    pub in_transaction: bool,
}
