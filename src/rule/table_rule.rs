//! Table Rule - compiled topology and strategies of one sharded logical table

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::algorithm::{KeyGenerator, ShardingAlgorithm};
use crate::config::{KeyGenerateStrategyConfiguration, ShardingStrategyConfiguration, TableRuleConfiguration};
use crate::{Result, ShardError};

use super::data_node::{expand_inline_expression, DataNode};

/// Sharding column bound to a compiled algorithm
#[derive(Clone)]
pub struct ShardingStrategy {
    pub column: String,
    pub algorithm: Arc<dyn ShardingAlgorithm>,
}

impl fmt::Debug for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardingStrategy")
            .field("column", &self.column)
            .field("algorithm", &self.algorithm.type_name())
            .finish()
    }
}

impl ShardingStrategy {
    pub(crate) fn compile(
        config: &ShardingStrategyConfiguration,
        algorithms: &BTreeMap<String, Arc<dyn ShardingAlgorithm>>,
    ) -> Result<Self> {
        let algorithm = algorithms.get(&config.algorithm).cloned().ok_or_else(|| {
            ShardError::Configuration(format!(
                "sharding algorithm '{}' for column '{}' is not defined",
                config.algorithm, config.sharding_column
            ))
        })?;
        if config.sharding_column.trim().is_empty() {
            return Err(ShardError::Configuration(format!(
                "strategy using '{}' has no sharding column",
                config.algorithm
            )));
        }
        Ok(Self {
            column: config.sharding_column.trim().to_string(),
            algorithm,
        })
    }
}

/// Generated-key column bound to a compiled key generator
#[derive(Clone)]
pub struct KeyGenerateStrategy {
    pub column: String,
    pub generator: Arc<dyn KeyGenerator>,
}

impl fmt::Debug for KeyGenerateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerateStrategy")
            .field("column", &self.column)
            .field("generator", &self.generator.type_name())
            .finish()
    }
}

impl KeyGenerateStrategy {
    pub(crate) fn compile(
        config: &KeyGenerateStrategyConfiguration,
        generators: &BTreeMap<String, Arc<dyn KeyGenerator>>,
    ) -> Result<Self> {
        let generator = generators.get(&config.generator).cloned().ok_or_else(|| {
            ShardError::Configuration(format!("key generator '{}' is not defined", config.generator))
        })?;
        Ok(Self {
            column: config.column.trim().to_string(),
            generator,
        })
    }
}

/// Compiled rule of one sharded logical table
#[derive(Debug, Clone)]
pub struct TableRule {
    logic_table: String,
    data_nodes: Vec<DataNode>,
    /// Data sources in first-appearance order
    data_sources: Vec<String>,
    /// Actual tables per data source, in declaration order
    tables_by_source: BTreeMap<String, Vec<String>>,
    pub(crate) database_strategy: Option<ShardingStrategy>,
    pub(crate) table_strategy: Option<ShardingStrategy>,
    pub(crate) key_generate: Option<KeyGenerateStrategy>,
}

impl TableRule {
    pub(crate) fn new(
        config: &TableRuleConfiguration,
        all_data_sources: &[String],
        database_strategy: Option<ShardingStrategy>,
        table_strategy: Option<ShardingStrategy>,
        key_generate: Option<KeyGenerateStrategy>,
    ) -> Result<Self> {
        let logic_table = config.logic_table.trim().to_string();
        if logic_table.is_empty() {
            return Err(ShardError::Configuration("table rule without logic_table".into()));
        }
        let data_nodes: Vec<DataNode> = match &config.actual_data_nodes {
            Some(expression) => expand_inline_expression(expression)?
                .iter()
                .map(|node| DataNode::parse(node))
                .collect::<Result<_>>()?,
            None => all_data_sources
                .iter()
                .map(|ds| DataNode::new(ds.clone(), logic_table.clone()))
                .collect(),
        };
        if data_nodes.is_empty() {
            return Err(ShardError::Configuration(format!(
                "table '{}' has no actual data nodes",
                logic_table
            )));
        }
        let mut data_sources: Vec<String> = Vec::new();
        let mut tables_by_source: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &data_nodes {
            if !all_data_sources.is_empty() && !all_data_sources.contains(&node.data_source) {
                return Err(ShardError::Configuration(format!(
                    "data node '{}' of '{}' references unknown data source",
                    node, logic_table
                )));
            }
            if !data_sources.contains(&node.data_source) {
                data_sources.push(node.data_source.clone());
            }
            let tables = tables_by_source.entry(node.data_source.clone()).or_default();
            if tables.contains(&node.table) {
                return Err(ShardError::Configuration(format!(
                    "duplicate data node '{}' in '{}'",
                    node, logic_table
                )));
            }
            tables.push(node.table.clone());
        }
        Ok(Self {
            logic_table,
            data_nodes,
            data_sources,
            tables_by_source,
            database_strategy,
            table_strategy,
            key_generate,
        })
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn data_nodes(&self) -> &[DataNode] {
        &self.data_nodes
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    /// Actual tables configured on `data_source`, in declaration order
    pub fn actual_tables(&self, data_source: &str) -> &[String] {
        self.tables_by_source
            .get(data_source)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Position of `actual_table` among the tables of `data_source`
    pub fn actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.actual_tables(data_source)
            .iter()
            .position(|t| t.eq_ignore_ascii_case(actual_table))
    }

    pub fn contains_node(&self, data_source: &str, actual_table: &str) -> bool {
        self.actual_table_index(data_source, actual_table).is_some()
    }

    pub fn key_generate_column(&self) -> Option<&str> {
        self.key_generate.as_ref().map(|k| k.column.as_str())
    }

    /// Sharding columns of both levels
    pub fn sharding_columns(&self) -> impl Iterator<Item = &str> {
        self.database_strategy
            .iter()
            .chain(self.table_strategy.iter())
            .map(|s| s.column.as_str())
    }

    pub(crate) fn table_counts(&self) -> Vec<(String, usize)> {
        self.data_sources
            .iter()
            .map(|ds| (ds.clone(), self.actual_tables(ds).len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(nodes: Option<&str>) -> TableRuleConfiguration {
        TableRuleConfiguration {
            logic_table: "t_order".into(),
            actual_data_nodes: nodes.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    fn sources() -> Vec<String> {
        vec!["ds0".to_string(), "ds1".to_string()]
    }

    #[test]
    fn test_table_rule_topology() {
        let rule = TableRule::new(&config(Some("ds${0..1}.t_order_${0..1}")), &sources(), None, None, None).unwrap();
        assert_eq!(rule.data_nodes().len(), 4);
        assert_eq!(rule.data_sources(), &["ds0", "ds1"]);
        assert_eq!(rule.actual_tables("ds1"), &["t_order_0", "t_order_1"]);
        assert_eq!(rule.actual_table_index("ds1", "T_ORDER_1"), Some(1));
        assert!(rule.actual_tables("ds9").is_empty());
    }

    #[test]
    fn test_table_rule_defaults_to_logic_name() {
        let rule = TableRule::new(&config(None), &sources(), None, None, None).unwrap();
        assert_eq!(rule.data_nodes(), &[DataNode::new("ds0", "t_order"), DataNode::new("ds1", "t_order")]);
    }

    #[test]
    fn test_table_rule_rejects_unknown_source() {
        let err = TableRule::new(&config(Some("ds7.t_order_0")), &sources(), None, None, None).unwrap_err();
        assert!(matches!(err, ShardError::Configuration(_)));
    }

    #[test]
    fn test_table_rule_rejects_duplicates() {
        assert!(TableRule::new(&config(Some("ds0.t_a, ds0.t_a")), &sources(), None, None, None).is_err());
    }
}
