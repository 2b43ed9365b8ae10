//! Unicast routing - one data source answers the whole statement

use crate::rule::ShardingRule;
use crate::statement::HintContext;
use crate::{Result, ShardError};

use super::RouteUnit;

/// Pick one deterministic unit for `tables`.
///
/// A data source named by the hint wins. Otherwise the first data source
/// holding every table is chosen; sharded tables map to their first actual
/// table there.
pub(crate) fn route_unicast(rule: &ShardingRule, tables: &[String], hint: &HintContext) -> Result<RouteUnit> {
    let data_source = match &hint.data_source {
        Some(ds) => {
            if !rule.data_sources().contains(ds) {
                return Err(ShardError::Configuration(format!(
                    "hinted data source '{}' is not configured",
                    ds
                )));
            }
            ds.clone()
        }
        None => {
            let mut candidates: Vec<String> = rule.data_sources().to_vec();
            for table in tables {
                let holders = rule.data_sources_of(table);
                candidates.retain(|ds| holders.contains(ds));
            }
            candidates
                .into_iter()
                .next()
                .ok_or_else(|| ShardError::RoutingAmbiguity { tables: tables.to_vec() })?
        }
    };

    let mut unit = RouteUnit::new(&data_source);
    for table in tables {
        match rule.find_table_rule(table) {
            Some(table_rule) => {
                let actual = table_rule.actual_tables(&data_source).first().ok_or_else(|| {
                    ShardError::Configuration(format!(
                        "table '{}' has no data node on '{}'",
                        table, data_source
                    ))
                })?;
                unit.add_table(table, actual);
            }
            None => unit.add_table(table, table),
        }
    }
    Ok(unit)
}
