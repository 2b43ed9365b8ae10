//! Inline expression sharding
//!
//! `algorithm-expression` is a target name template with one placeholder:
//! `t_order_${user_id % 2}` or `ds_${region}`. The placeholder evaluates the
//! sharding value, optionally modulo a constant, and splices it into the
//! template.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    integer_value, PreciseShardingValue, RangeShardingAlgorithm, RangeShardingValue,
    ShardingAlgorithm,
};
use crate::config::{required_prop, Props};
use crate::{Result, ShardError};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>[^$]*)\$\{\s*(?P<column>\w+)\s*(?:%\s*(?P<modulo>\d+)\s*)?\}(?P<suffix>[^$]*)$")
        .expect("static inline expression pattern")
});

#[derive(Debug, Clone)]
pub struct InlineShardingAlgorithm {
    prefix: String,
    column: String,
    modulo: Option<i64>,
    suffix: String,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    pub fn new(expression: &str, allow_range_query: bool) -> Result<Self> {
        let caps = PLACEHOLDER.captures(expression.trim()).ok_or_else(|| {
            ShardError::Configuration(format!("unsupported inline expression '{}'", expression))
        })?;
        let modulo = match caps.name("modulo") {
            Some(m) => {
                let n: i64 = m.as_str().parse().map_err(|_| {
                    ShardError::Configuration(format!("invalid modulo in '{}'", expression))
                })?;
                if n == 0 {
                    return Err(ShardError::Configuration(format!("modulo by zero in '{}'", expression)));
                }
                Some(n)
            }
            None => None,
        };
        Ok(Self {
            prefix: caps["prefix"].to_string(),
            column: caps["column"].to_string(),
            modulo,
            suffix: caps["suffix"].to_string(),
            allow_range_query,
        })
    }

    pub(crate) fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>> {
        let expression = required_prop(props, "algorithm-expression")?;
        let allow_range = props
            .get("allow-range-query-with-inline-sharding")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Arc::new(Self::new(expression, allow_range)?))
    }

    /// Column named by the placeholder
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Evaluate the expression for one value
    pub fn evaluate(&self, value: &PreciseShardingValue) -> Result<String> {
        let middle = match self.modulo {
            Some(m) => integer_value(value)?.rem_euclid(m).to_string(),
            None => value.value.to_string_value(),
        };
        Ok(format!("{}{}{}", self.prefix, middle, self.suffix))
    }
}

impl ShardingAlgorithm for InlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INLINE"
    }

    fn do_precise(&self, targets: &[String], value: &PreciseShardingValue) -> Result<Option<String>> {
        let name = self.evaluate(value)?;
        Ok(targets.iter().find(|t| t.eq_ignore_ascii_case(&name)).cloned())
    }

    fn as_range(&self) -> Option<&dyn RangeShardingAlgorithm> {
        Some(self)
    }
}

impl RangeShardingAlgorithm for InlineShardingAlgorithm {
    fn do_range(&self, targets: &[String], value: &RangeShardingValue) -> Result<Vec<String>> {
        if !self.allow_range_query {
            return Err(ShardError::Configuration(format!(
                "range condition on {}.{} needs allow-range-query-with-inline-sharding",
                value.logic_table, value.column
            )));
        }
        Ok(targets.to_vec())
    }
}
