//! Data nodes and inline topology expressions

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Result, ShardError};

/// A physical table on a physical data source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse `ds0.t_order_0`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        match text.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ShardError::Configuration(format!(
                "invalid data node '{}', expected <data_source>.<table>",
                text
            ))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

static SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("static segment pattern"));

static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(-?\d+)\s*\.\.\s*(-?\d+)\s*$").expect("static range pattern"));

/// Expand an inline expression into the names it denotes, in order.
///
/// ```text
/// ds${0..1}.t_${['a','b']}  →  ds0.t_a, ds0.t_b, ds1.t_a, ds1.t_b
/// ds0.t_config, ds1.t_config  →  ds0.t_config, ds1.t_config
/// ```
pub fn expand_inline_expression(expression: &str) -> Result<Vec<String>> {
    let mut result = Vec::new();
    for item in split_top_level(expression) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut expanded = vec![String::new()];
        let mut last = 0;
        for caps in SEGMENT.captures_iter(item) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let literal = &item[last..whole.start];
            let choices = segment_choices(&caps[1])?;
            expanded = expanded
                .iter()
                .flat_map(|prefix| choices.iter().map(move |c| format!("{}{}{}", prefix, literal, c)))
                .collect();
            last = whole.end;
        }
        let tail = &item[last..];
        result.extend(expanded.into_iter().map(|prefix| format!("{}{}", prefix, tail)));
    }
    Ok(result)
}

fn segment_choices(body: &str) -> Result<Vec<String>> {
    if let Some(caps) = RANGE.captures(body) {
        let lower: i64 = caps[1].parse().map_err(|_| bad_segment(body))?;
        let upper: i64 = caps[2].parse().map_err(|_| bad_segment(body))?;
        if upper < lower {
            return Err(bad_segment(body));
        }
        return Ok((lower..=upper).map(|v| v.to_string()).collect());
    }
    let body = body.trim();
    if body.starts_with('[') && body.ends_with(']') {
        let choices: Vec<String> = body[1..body.len() - 1]
            .split(',')
            .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if choices.is_empty() {
            return Err(bad_segment(body));
        }
        return Ok(choices);
    }
    Err(bad_segment(body))
}

fn bad_segment(body: &str) -> ShardError {
    ShardError::Configuration(format!("unsupported inline segment '${{{}}}'", body))
}

/// Split on commas that are not inside `${...}`
fn split_top_level(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expression[start..]);
    parts
}
