//! Pagination resolved against the statement parameters
//!
//! | syntax     | offset                      | row count                        |
//! |------------|-----------------------------|----------------------------------|
//! | LIMIT      | rows to skip                | rows to return, negative = all   |
//! | ROWNUM     | `rn > n` skips n, `>=` n-1  | absolute end, `<` excludes it    |
//! | TOP        | as ROWNUM                   | absolute end, always inclusive   |

use crate::data::Value;
use crate::{Result, ShardError};

use super::segment::{PaginationSegment, PaginationSyntax, PaginationValue, PaginationValueSegment};

/// Row count sent to shards that must return everything
pub const MAX_ROW_COUNT: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub syntax: PaginationSyntax,
    pub offset: Option<i64>,
    pub offset_bound_opened: bool,
    pub row_count: Option<i64>,
    pub row_count_bound_opened: bool,
    pub offset_segment: Option<PaginationValueSegment>,
    pub row_count_segment: Option<PaginationValueSegment>,
}

impl Pagination {
    pub fn resolve(segment: &PaginationSegment, params: &[Value]) -> Result<Self> {
        let offset = segment.offset.as_ref().map(|s| value_of(s, params)).transpose()?;
        let row_count = segment.row_count.as_ref().map(|s| value_of(s, params)).transpose()?;
        let row_count_bound_opened = match segment.syntax {
            PaginationSyntax::Top => false,
            _ => segment.row_count.as_ref().map(|s| s.bound_opened).unwrap_or(false),
        };
        Ok(Self {
            syntax: segment.syntax,
            offset,
            offset_bound_opened: segment.offset.as_ref().map(|s| s.bound_opened).unwrap_or(false),
            row_count,
            row_count_bound_opened,
            offset_segment: segment.offset.clone(),
            row_count_segment: segment.row_count.clone(),
        })
    }

    /// Rows the merged result skips
    pub fn actual_offset(&self) -> i64 {
        let Some(offset) = self.offset else {
            return 0;
        };
        let skip = match self.syntax {
            PaginationSyntax::Limit => offset,
            PaginationSyntax::RowNumber | PaginationSyntax::Top => {
                if self.offset_bound_opened {
                    offset
                } else {
                    offset - 1
                }
            }
        };
        skip.max(0)
    }

    /// Rows the merged result returns after skipping; `None` means unbounded
    pub fn actual_row_count(&self) -> Option<i64> {
        let row_count = self.row_count?;
        match self.syntax {
            PaginationSyntax::Limit => (row_count >= 0).then_some(row_count),
            PaginationSyntax::RowNumber | PaginationSyntax::Top => {
                let end = if self.row_count_bound_opened {
                    row_count - 1
                } else {
                    row_count
                };
                Some((end - self.actual_offset()).max(0))
            }
        }
    }

    /// Offset pushed to every shard
    pub fn revised_offset(&self) -> i64 {
        0
    }

    /// Row count pushed to every shard.
    ///
    /// `fetch_all` is set when the shards' rows are regrouped in memory and
    /// the global window can only be applied after the merge.
    pub fn revised_row_count(&self, fetch_all: bool) -> Option<i64> {
        let row_count = self.row_count?;
        if fetch_all {
            return Some(MAX_ROW_COUNT);
        }
        Some(match self.syntax {
            PaginationSyntax::Limit if row_count < 0 => row_count,
            PaginationSyntax::Limit => self.offset.unwrap_or(0).saturating_add(row_count),
            // ROWNUM and TOP bounds already count from the first row
            PaginationSyntax::RowNumber | PaginationSyntax::Top => row_count,
        })
    }

    pub fn has_window(&self) -> bool {
        self.actual_offset() > 0 || self.actual_row_count().is_some()
    }
}

fn value_of(segment: &PaginationValueSegment, params: &[Value]) -> Result<i64> {
    match segment.value {
        PaginationValue::Literal(v) => Ok(v),
        PaginationValue::Parameter(i) => {
            let value = params.get(i).ok_or(ShardError::ParameterOutOfRange(i))?;
            value.as_i64().ok_or_else(|| {
                ShardError::Configuration(format!("pagination parameter {} is not an integer: {}", i, value))
            })
        }
    }
}
