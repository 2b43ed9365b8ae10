//! Statement context - one statement decorated for one execution

use std::sync::Arc;

use crate::data::Value;
use crate::rule::ShardingRule;
use crate::{Result, ShardError};

use super::insert::InsertContext;
use super::segment::Operand;
use super::select::SelectContext;
use super::{DatabaseType, SqlStatement, StatementKind};

/// A bound statement plus everything derived from its parameters.
///
/// The statement is shared, never modified; each execution builds its own
/// context.
#[derive(Debug, Clone)]
pub struct StatementContext {
    statement: Arc<SqlStatement>,
    parameters: Vec<Value>,
    tables: Vec<String>,
    database_type: DatabaseType,
    select: Option<SelectContext>,
    insert: Option<InsertContext>,
}

impl StatementContext {
    pub fn new(
        statement: Arc<SqlStatement>,
        parameters: Vec<Value>,
        rule: &ShardingRule,
        database_type: DatabaseType,
    ) -> Result<Self> {
        let select = match statement.as_ref() {
            SqlStatement::Select(s) => Some(SelectContext::new(s, &parameters, database_type)?),
            _ => None,
        };
        let insert = match statement.as_ref() {
            SqlStatement::Insert(s) => Some(InsertContext::new(s, &parameters, rule)?),
            _ => None,
        };
        let tables = statement.table_names();
        Ok(Self {
            statement,
            parameters,
            tables,
            database_type,
            select,
            insert,
        })
    }

    pub fn statement(&self) -> &SqlStatement {
        &self.statement
    }

    pub fn kind(&self) -> StatementKind {
        self.statement.kind()
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// Distinct logic table names, in first-appearance order
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn select(&self) -> Option<&SelectContext> {
        self.select.as_ref()
    }

    pub fn insert(&self) -> Option<&InsertContext> {
        self.insert.as_ref()
    }

    /// Value of a literal or placeholder operand
    pub fn resolve(&self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Parameter(i) => self
                .parameters
                .get(*i)
                .cloned()
                .ok_or(ShardError::ParameterOutOfRange(*i)),
        }
    }

    /// Whether the statement only reads
    pub fn is_read_only(&self) -> bool {
        self.kind() == StatementKind::Select
    }
}
