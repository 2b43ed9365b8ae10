//! Statement segments - positioned pieces of a bound statement
//!
//! Positions are byte offsets into the logic SQL text; `stop` is inclusive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::{NullsOrder, Value};

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuoteCharacter {
    #[default]
    None,
    /// `"name"`
    Quote,
    /// `` `name` ``
    BackQuote,
    /// `[name]`
    Bracket,
}

impl QuoteCharacter {
    pub fn wrap(&self, name: &str) -> String {
        match self {
            QuoteCharacter::None => name.to_string(),
            QuoteCharacter::Quote => format!("\"{}\"", name),
            QuoteCharacter::BackQuote => format!("`{}`", name),
            QuoteCharacter::Bracket => format!("[{}]", name),
        }
    }
}

/// One occurrence of a logic table name, including owner references such
/// as `t_order.user_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSegment {
    pub name: String,
    pub start: usize,
    pub stop: usize,
    #[serde(default)]
    pub quote: QuoteCharacter,
}

impl TableSegment {
    pub fn new(name: &str, start: usize) -> Self {
        Self {
            name: name.to_string(),
            start,
            stop: start + name.len() - 1,
            quote: QuoteCharacter::None,
        }
    }

    pub fn quoted(name: &str, start: usize, quote: QuoteCharacter) -> Self {
        Self {
            name: name.to_string(),
            start,
            // two quote characters around the name
            stop: start + name.len() + 1,
            quote,
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// A literal or a `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(Value),
    /// 0-based index into the statement parameters
    Parameter(usize),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Literal(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionOperator {
    Eq(Operand),
    In(Vec<Operand>),
    Between(Operand, Operand),
    Lt(Operand),
    Le(Operand),
    Gt(Operand),
    Ge(Operand),
}

/// `table.column <op> operand`, with `table` resolved to a logic table name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCondition {
    pub table: String,
    pub column: String,
    pub operator: ConditionOperator,
}

impl ColumnCondition {
    pub fn new(table: &str, column: &str, operator: ConditionOperator) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            operator,
        }
    }
}

/// WHERE predicate in disjunctive normal form: OR of AND groups.
///
/// An empty list means no usable predicate.
pub type WhereGroups = Vec<Vec<ColumnCondition>>;

// ============================================================================
// Projections
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregationType::Count => "COUNT",
            AggregationType::Sum => "SUM",
            AggregationType::Avg => "AVG",
            AggregationType::Min => "MIN",
            AggregationType::Max => "MAX",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Column {
        owner: Option<String>,
        name: String,
        alias: Option<String>,
    },
    Aggregation {
        function: AggregationType,
        distinct: bool,
        /// Argument text, e.g. `*` or `o.price`
        argument: String,
        alias: Option<String>,
        start: usize,
        stop: usize,
    },
    Expression {
        text: String,
        alias: Option<String>,
    },
    /// `*` or `o.*`, expanded by the binder into its columns
    Shorthand {
        owner: Option<String>,
        columns: Vec<String>,
    },
}

impl Projection {
    pub fn column(name: &str) -> Self {
        Projection::Column {
            owner: None,
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn aggregation(function: AggregationType, argument: &str, start: usize, stop: usize) -> Self {
        Projection::Aggregation {
            function,
            distinct: false,
            argument: argument.to_string(),
            alias: None,
            start,
            stop,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Projection::Column { alias, .. }
            | Projection::Aggregation { alias, .. }
            | Projection::Expression { alias, .. } => alias.as_deref(),
            Projection::Shorthand { .. } => None,
        }
    }

    /// Expression text as written in the SELECT list
    pub fn expression(&self) -> String {
        match self {
            Projection::Column { owner: Some(o), name, .. } => format!("{}.{}", o, name),
            Projection::Column { name, .. } => name.clone(),
            Projection::Aggregation { function, distinct, argument, .. } => {
                if *distinct {
                    format!("{}(DISTINCT {})", function, argument)
                } else {
                    format!("{}({})", function, argument)
                }
            }
            Projection::Expression { text, .. } => text.clone(),
            Projection::Shorthand { owner: Some(o), .. } => format!("{}.*", o),
            Projection::Shorthand { .. } => "*".to_string(),
        }
    }
}

// ============================================================================
// ORDER BY / GROUP BY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderByExpr {
    Column { owner: Option<String>, name: String },
    /// 1-based position in the SELECT list
    Index(usize),
    Expression(String),
}

impl OrderByExpr {
    pub fn text(&self) -> String {
        match self {
            OrderByExpr::Column { owner: Some(o), name } => format!("{}.{}", o, name),
            OrderByExpr::Column { name, .. } => name.clone(),
            OrderByExpr::Index(i) => i.to_string(),
            OrderByExpr::Expression(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: OrderByExpr,
    #[serde(default)]
    pub direction: OrderDirection,
    /// Explicit NULL placement; the dialect default otherwise
    #[serde(default)]
    pub nulls: Option<NullsOrder>,
}

impl OrderByItem {
    pub fn column(name: &str, direction: OrderDirection) -> Self {
        Self {
            expr: OrderByExpr::Column {
                owner: None,
                name: name.to_string(),
            },
            direction,
            nulls: None,
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaginationSyntax {
    /// `LIMIT n OFFSET m` / `LIMIT m, n`
    Limit,
    /// Oracle `ROWNUM` filters
    RowNumber,
    /// SQL Server `TOP(n)` with `ROW_NUMBER()` offset filter
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaginationValue {
    Literal(i64),
    Parameter(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationValueSegment {
    pub start: usize,
    pub stop: usize,
    pub value: PaginationValue,
    /// Exclusive comparison (`<`, `>`); only meaningful for row-number syntaxes
    #[serde(default)]
    pub bound_opened: bool,
}

impl PaginationValueSegment {
    pub fn literal(value: i64, start: usize) -> Self {
        Self {
            start,
            stop: start + value.to_string().len() - 1,
            value: PaginationValue::Literal(value),
            bound_opened: false,
        }
    }

    pub fn parameter(index: usize, start: usize) -> Self {
        Self {
            start,
            stop: start,
            value: PaginationValue::Parameter(index),
            bound_opened: false,
        }
    }

    pub fn opened(mut self) -> Self {
        self.bound_opened = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSegment {
    pub syntax: PaginationSyntax,
    pub offset: Option<PaginationValueSegment>,
    pub row_count: Option<PaginationValueSegment>,
}

// ============================================================================
// INSERT values
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertValue {
    Operand(Operand),
    /// Anything else (`NOW()`, `a + 1`); never usable as a sharding value
    Expression(String),
}

/// One `( ... )` row of a VALUES clause; `stop` is the closing parenthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowSegment {
    pub start: usize,
    pub stop: usize,
    pub values: Vec<InsertValue>,
}
