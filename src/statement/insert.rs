//! INSERT context - resolved row values and generated keys

use std::collections::HashSet;

use crate::data::Value;
use crate::rule::ShardingRule;
use crate::{Result, ShardError};

use super::segment::{InsertValue, Operand};
use super::InsertStatement;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeyContext {
    pub column: String,
    /// The column was missing from the statement and is added by the rewrite
    pub appended: bool,
    /// Key of every row, in row order
    pub values: Vec<Value>,
    /// Appended keys travel as `?` parameters instead of literals
    pub as_parameter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowContext {
    /// Value per column, `None` for expressions; an appended key comes last
    pub values: Vec<Option<Value>>,
    /// Parameters referenced by the row, in marker order
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertContext {
    pub table: String,
    /// Column names, including an appended key column
    pub columns: Vec<String>,
    pub rows: Vec<InsertRowContext>,
    pub generated_key: Option<GeneratedKeyContext>,
    /// Parameters outside the VALUES rows
    pub generic_parameters: Vec<Value>,
}

impl InsertContext {
    pub fn new(statement: &InsertStatement, params: &[Value], rule: &ShardingRule) -> Result<Self> {
        let table = statement.table.name.clone();
        let mut columns = statement.columns.clone();
        let mut used_params: HashSet<usize> = HashSet::new();
        let mut rows = Vec::with_capacity(statement.rows.len());
        let mut any_parameter = false;
        for (i, row) in statement.rows.iter().enumerate() {
            if !columns.is_empty() && row.values.len() != columns.len() {
                return Err(ShardError::Configuration(format!(
                    "insert row {} has {} values for {} columns",
                    i,
                    row.values.len(),
                    columns.len()
                )));
            }
            let mut values = Vec::with_capacity(row.values.len() + 1);
            let mut parameters = Vec::new();
            for value in &row.values {
                match value {
                    InsertValue::Operand(Operand::Literal(v)) => values.push(Some(v.clone())),
                    InsertValue::Operand(Operand::Parameter(p)) => {
                        let v = params.get(*p).ok_or(ShardError::ParameterOutOfRange(*p))?;
                        used_params.insert(*p);
                        any_parameter = true;
                        parameters.push(v.clone());
                        values.push(Some(v.clone()));
                    }
                    InsertValue::Expression(_) => values.push(None),
                }
            }
            rows.push(InsertRowContext { values, parameters });
        }

        let generated_key = match rule.generate_key_column(&table) {
            Some(column) => {
                match columns.iter().position(|c| c.eq_ignore_ascii_case(column)) {
                    Some(pos) => Some(GeneratedKeyContext {
                        column: column.to_string(),
                        appended: false,
                        values: rows
                            .iter()
                            .map(|r| r.values.get(pos).cloned().flatten().unwrap_or(Value::Null))
                            .collect(),
                        as_parameter: any_parameter,
                    }),
                    // without a column list the key position is unknown
                    None if columns.is_empty() => None,
                    None => {
                        let mut keys = Vec::with_capacity(rows.len());
                        for row in rows.iter_mut() {
                            let key = rule.generate_key(&table).unwrap_or(Value::Null);
                            row.values.push(Some(key.clone()));
                            if any_parameter {
                                row.parameters.push(key.clone());
                            }
                            keys.push(key);
                        }
                        columns.push(column.to_string());
                        Some(GeneratedKeyContext {
                            column: column.to_string(),
                            appended: true,
                            values: keys,
                            as_parameter: any_parameter,
                        })
                    }
                }
            }
            None => None,
        };

        let generic_parameters = params
            .iter()
            .enumerate()
            .filter(|(i, _)| !used_params.contains(i))
            .map(|(_, v)| v.clone())
            .collect();

        Ok(Self {
            table,
            columns,
            rows,
            generated_key,
            generic_parameters,
        })
    }

    /// Value of `column` in row `row`, when it is a literal or parameter
    pub fn value_of(&self, row: usize, column: &str) -> Option<&Value> {
        let pos = self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))?;
        self.rows.get(row)?.values.get(pos)?.as_ref()
    }
}
