//! Sharding Rule - immutable compiled view of [`ShardingRuleConfiguration`]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::algorithm::{create_sharding_algorithm, keygen::create_key_generator, KeyGenerator, ShardingAlgorithm};
use crate::config::{ShardingRuleConfiguration, ShardingStrategyConfiguration};
use crate::data::Value;
use crate::{Result, ShardError};

use super::data_node::{expand_inline_expression, DataNode};
use super::table_rule::{KeyGenerateStrategy, ShardingStrategy, TableRule};

/// Compiled sharding rule.
///
/// Built once per configuration load and never mutated; concurrent
/// statements share it through [`super::RuleHolder`].
#[derive(Debug)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    table_rules: Vec<TableRule>,
    /// lower-cased logic table → index into `table_rules`
    table_index: HashMap<String, usize>,
    /// lower-cased binding groups
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    default_data_source: Option<String>,
    default_database_strategy: Option<ShardingStrategy>,
    default_table_strategy: Option<ShardingStrategy>,
    default_key_generate: Option<KeyGenerateStrategy>,
}

impl ShardingRule {
    pub fn new(config: &ShardingRuleConfiguration) -> Result<Self> {
        let algorithms: BTreeMap<String, Arc<dyn ShardingAlgorithm>> = config
            .sharding_algorithms
            .iter()
            .map(|(name, alg)| Ok((name.clone(), create_sharding_algorithm(alg)?)))
            .collect::<Result<_>>()?;
        let generators: BTreeMap<String, Arc<dyn KeyGenerator>> = config
            .key_generators
            .iter()
            .map(|(name, gen)| Ok((name.clone(), create_key_generator(gen)?)))
            .collect::<Result<_>>()?;

        let data_sources = resolve_data_sources(config)?;
        if let Some(ds) = &config.default_data_source {
            if !data_sources.contains(ds) {
                return Err(ShardError::Configuration(format!(
                    "default data source '{}' is not a configured data source",
                    ds
                )));
            }
        }

        let compile_strategy = |c: &Option<ShardingStrategyConfiguration>| -> Result<Option<ShardingStrategy>> {
            c.as_ref().map(|c| ShardingStrategy::compile(c, &algorithms)).transpose()
        };
        let default_database_strategy = compile_strategy(&config.default_database_strategy)?;
        let default_table_strategy = compile_strategy(&config.default_table_strategy)?;
        let default_key_generate = config
            .default_key_generate
            .as_ref()
            .map(|k| KeyGenerateStrategy::compile(k, &generators))
            .transpose()?;

        let mut table_rules = Vec::with_capacity(config.tables.len());
        let mut table_index = HashMap::new();
        for table in &config.tables {
            let rule = TableRule::new(
                table,
                &data_sources,
                compile_strategy(&table.database_strategy)?,
                compile_strategy(&table.table_strategy)?,
                table
                    .key_generate
                    .as_ref()
                    .map(|k| KeyGenerateStrategy::compile(k, &generators))
                    .transpose()?,
            )?;
            let key = rule.logic_table().to_ascii_lowercase();
            if table_index.insert(key, table_rules.len()).is_some() {
                return Err(ShardError::Configuration(format!(
                    "table '{}' is configured twice",
                    rule.logic_table()
                )));
            }
            table_rules.push(rule);
        }

        let broadcast_tables: Vec<String> = config
            .broadcast_tables
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(t) = broadcast_tables.iter().find(|t| table_index.contains_key(*t)) {
            return Err(ShardError::Configuration(format!(
                "table '{}' cannot be both sharded and broadcast",
                t
            )));
        }

        let mut rule = Self {
            data_sources,
            table_rules,
            table_index,
            binding_groups: Vec::new(),
            broadcast_tables,
            default_data_source: config.default_data_source.clone(),
            default_database_strategy,
            default_table_strategy,
            default_key_generate,
        };
        for group in &config.binding_tables {
            let tables: Vec<String> = group
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            rule.check_binding_group(&tables)?;
            rule.binding_groups.push(tables);
        }
        log::debug!(
            "Sharding rule built: {} data sources, {} sharded tables, {} binding groups",
            rule.data_sources.len(),
            rule.table_rules.len(),
            rule.binding_groups.len()
        );
        Ok(rule)
    }

    fn check_binding_group(&self, tables: &[String]) -> Result<()> {
        let mut rules = Vec::with_capacity(tables.len());
        for table in tables {
            let rule = self.find_table_rule(table).ok_or_else(|| {
                ShardError::Configuration(format!("binding table '{}' is not a sharded table", table))
            })?;
            if self.binding_group(table).is_some() {
                return Err(ShardError::Configuration(format!(
                    "table '{}' belongs to more than one binding group",
                    table
                )));
            }
            rules.push(rule);
        }
        if let Some((first, rest)) = rules.split_first() {
            let expected = first.table_counts();
            if let Some(other) = rest.iter().find(|r| r.table_counts() != expected) {
                return Err(ShardError::Configuration(format!(
                    "binding tables '{}' and '{}' have different data nodes",
                    first.logic_table(),
                    other.logic_table()
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.table_rules
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_index
            .get(&logic_table.to_ascii_lowercase())
            .map(|&i| &self.table_rules[i])
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.find_table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        let name = logic_table.to_ascii_lowercase();
        self.broadcast_tables.iter().any(|t| *t == name)
    }

    /// Whether every table is broadcast (and there is at least one)
    pub fn is_all_broadcast(&self, tables: &[String]) -> bool {
        !tables.is_empty() && tables.iter().all(|t| self.is_broadcast_table(t))
    }

    /// Whether any table is sharded or broadcast
    pub fn contains_configured_table(&self, tables: &[String]) -> bool {
        tables.iter().any(|t| self.is_sharding_table(t) || self.is_broadcast_table(t))
    }

    /// Binding group containing `logic_table`
    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let name = logic_table.to_ascii_lowercase();
        self.binding_groups
            .iter()
            .find(|g| g.contains(&name))
            .map(|g| g.as_slice())
    }

    /// Whether all tables are sharded and belong to one binding group
    pub fn is_all_binding(&self, tables: &[String]) -> bool {
        let Some(first) = tables.first() else {
            return false;
        };
        match self.binding_group(first) {
            Some(group) => tables
                .iter()
                .all(|t| group.contains(&t.to_ascii_lowercase())),
            None => false,
        }
    }

    /// Actual table of `logic_table` paired with `primary_actual` of the
    /// binding table `primary_logic` on `data_source`
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        logic_table: &str,
        primary_logic: &str,
        primary_actual: &str,
    ) -> Result<String> {
        let primary = self.table_rule(primary_logic)?;
        let target = self.table_rule(logic_table)?;
        primary
            .actual_table_index(data_source, primary_actual)
            .and_then(|i| target.actual_tables(data_source).get(i).cloned())
            .ok_or_else(|| {
                ShardError::Configuration(format!(
                    "no binding actual table of '{}' for {}.{}",
                    logic_table, data_source, primary_actual
                ))
            })
    }

    pub fn table_rule(&self, logic_table: &str) -> Result<&TableRule> {
        self.find_table_rule(logic_table)
            .ok_or_else(|| ShardError::Configuration(format!("no sharding rule for table '{}'", logic_table)))
    }

    pub fn database_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.database_strategy.as_ref().or(self.default_database_strategy.as_ref())
    }

    pub fn table_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.table_strategy.as_ref().or(self.default_table_strategy.as_ref())
    }

    fn key_generate<'a>(&'a self, rule: &'a TableRule) -> Option<&'a KeyGenerateStrategy> {
        rule.key_generate.as_ref().or(self.default_key_generate.as_ref())
    }

    /// Generated-key column of a sharded table
    pub fn generate_key_column(&self, logic_table: &str) -> Option<&str> {
        let rule = self.find_table_rule(logic_table)?;
        self.key_generate(rule).map(|k| k.column.as_str())
    }

    /// Next generated key for a sharded table
    pub fn generate_key(&self, logic_table: &str) -> Option<Value> {
        let rule = self.find_table_rule(logic_table)?;
        self.key_generate(rule).map(|k| k.generator.generate_key())
    }

    /// Whether `column` shards `logic_table` at either level
    pub fn is_sharding_column(&self, logic_table: &str, column: &str) -> bool {
        self.find_table_rule(logic_table)
            .map(|rule| {
                self.database_strategy(rule)
                    .into_iter()
                    .chain(self.table_strategy(rule))
                    .any(|s| s.column.eq_ignore_ascii_case(column))
            })
            .unwrap_or(false)
    }

    /// Data source for tables without any rule: the default, or the only one
    pub fn single_data_source(&self) -> Result<&str> {
        if let Some(ds) = &self.default_data_source {
            return Ok(ds.as_str());
        }
        match self.data_sources.as_slice() {
            [only] => Ok(only.as_str()),
            _ => Err(ShardError::Configuration(
                "no default data source for unconfigured tables".into(),
            )),
        }
    }

    /// Data sources that may hold the given table: its nodes when sharded,
    /// the single data source when unconfigured, every data source otherwise
    pub fn data_sources_of(&self, logic_table: &str) -> Vec<String> {
        match self.find_table_rule(logic_table) {
            Some(rule) => rule.data_sources().to_vec(),
            None if self.is_broadcast_table(logic_table) => self.data_sources.clone(),
            None => self
                .single_data_source()
                .map(|ds| vec![ds.to_string()])
                .unwrap_or_else(|_| self.data_sources.clone()),
        }
    }
}

fn resolve_data_sources(config: &ShardingRuleConfiguration) -> Result<Vec<String>> {
    if !config.data_sources.is_empty() {
        return Ok(config.data_sources.iter().map(|s| s.trim().to_string()).collect());
    }
    let mut sources: Vec<String> = Vec::new();
    for table in &config.tables {
        let Some(expression) = &table.actual_data_nodes else {
            continue;
        };
        for node in expand_inline_expression(expression)? {
            let node = DataNode::parse(&node)?;
            if !sources.contains(&node.data_source) {
                sources.push(node.data_source);
            }
        }
    }
    if let Some(ds) = &config.default_data_source {
        if !sources.contains(ds) {
            sources.push(ds.clone());
        }
    }
    if sources.is_empty() {
        return Err(ShardError::Configuration("no data sources configured".into()));
    }
    Ok(sources)
}
