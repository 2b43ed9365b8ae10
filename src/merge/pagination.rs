//! Pagination decorator
//!
//! Shards each return their first `offset + n` rows, so the global window is
//! cut from the merged stream: skip the offset, then hand out at most the row
//! count. The bound arithmetic of LIMIT, ROWNUM and TOP lives in
//! [`Pagination::actual_offset`] and [`Pagination::actual_row_count`].

use crate::data::Row;
use crate::statement::Pagination;
use crate::Result;

use super::stream::MergeStream;

pub(crate) struct PaginationDecorator {
    inner: Box<dyn MergeStream>,
    offset: i64,
    /// Rows left to return; `None` is unbounded
    remaining: Option<i64>,
    skipped: bool,
    exhausted: bool,
}

impl PaginationDecorator {
    pub fn new(inner: Box<dyn MergeStream>, pagination: &Pagination) -> Self {
        log::debug!(
            "{:?} pagination: skip {}, take {:?}",
            pagination.syntax,
            pagination.actual_offset(),
            pagination.actual_row_count()
        );
        Self {
            inner,
            offset: pagination.actual_offset(),
            remaining: pagination.actual_row_count(),
            skipped: false,
            exhausted: false,
        }
    }

    fn skip_offset(&mut self) -> Result<bool> {
        for _ in 0..self.offset {
            if !self.inner.next()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl MergeStream for PaginationDecorator {
    fn next(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.skipped {
            self.skipped = true;
            if !self.skip_offset()? {
                self.exhausted = true;
                return Ok(false);
            }
        }
        if self.remaining == Some(0) || !self.inner.next()? {
            self.exhausted = true;
            return Ok(false);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(true)
    }

    fn current(&self) -> Option<&Row> {
        if self.exhausted {
            None
        } else {
            self.inner.current()
        }
    }

    fn close(&mut self) {
        self.exhausted = true;
        self.inner.close();
    }
}
