//! Rule configuration
//!
//! Plain serde structs describing sharding and read/write-splitting rules.
//! They are validated and compiled into immutable rule objects by
//! [`crate::rule::ShardingRule::new`] and
//! [`crate::rule::ReadwriteSplittingRule::new`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::statement::DatabaseType;
use crate::{Result, ShardError};

/// Free-form algorithm properties (`sharding-count`, `worker-id`, ...)
pub type Props = BTreeMap<String, String>;

// ============================================================================
// Sharding Rule
// ============================================================================

/// Top-level sharding rule configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingRuleConfiguration {
    /// Logical data source names available to the rule
    pub data_sources: Vec<String>,
    /// Sharded logical tables
    pub tables: Vec<TableRuleConfiguration>,
    /// Binding groups, each a comma separated list of logical tables
    pub binding_tables: Vec<String>,
    /// Tables replicated on every data source
    pub broadcast_tables: Vec<String>,
    /// Data source for tables without any rule
    pub default_data_source: Option<String>,
    pub default_database_strategy: Option<ShardingStrategyConfiguration>,
    pub default_table_strategy: Option<ShardingStrategyConfiguration>,
    pub default_key_generate: Option<KeyGenerateStrategyConfiguration>,
    /// Named sharding algorithms referenced by strategies
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfiguration>,
    /// Named key generators referenced by key-generate strategies
    pub key_generators: BTreeMap<String, AlgorithmConfiguration>,
}

/// Rule for one sharded logical table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRuleConfiguration {
    pub logic_table: String,
    /// Inline expression such as `ds${0..1}.t_order_${0..1}`.
    /// When absent the table lives under its logical name on every data source.
    pub actual_data_nodes: Option<String>,
    pub database_strategy: Option<ShardingStrategyConfiguration>,
    pub table_strategy: Option<ShardingStrategyConfiguration>,
    pub key_generate: Option<KeyGenerateStrategyConfiguration>,
}

/// Binds a sharding column to a named algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardingStrategyConfiguration {
    pub sharding_column: String,
    pub algorithm: String,
}

/// Binds a generated-key column to a named key generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateStrategyConfiguration {
    pub column: String,
    pub generator: String,
}

/// Algorithm type tag plus its properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: Props,
}

impl AlgorithmConfiguration {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            props: Props::new(),
        }
    }

    /// Builder-style property setter
    pub fn prop(mut self, key: &str, value: impl ToString) -> Self {
        self.props.insert(key.to_string(), value.to_string());
        self
    }
}

// ============================================================================
// Read/Write Splitting
// ============================================================================

/// Read/write splitting configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadwriteSplittingRuleConfiguration {
    pub groups: Vec<ReadwriteGroupConfiguration>,
    pub load_balancers: BTreeMap<String, AlgorithmConfiguration>,
}

/// One logical data source backed by a primary and its replicas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadwriteGroupConfiguration {
    /// Logical name, matching a data source of the sharding rule
    pub name: String,
    pub write_data_source: String,
    pub read_data_sources: Vec<String>,
    /// Named load balancer; round robin when absent
    pub load_balancer: Option<String>,
    /// Replicas currently taken out of rotation
    pub disabled_data_sources: Vec<String>,
}

// ============================================================================
// Kernel Properties
// ============================================================================

/// Runtime switches for the kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelProperties {
    /// Log logic and actual SQL for every statement
    pub sql_show: bool,
    /// Flag unsafe cross-shard joins for the federation fallback
    pub sql_federation_enabled: bool,
    /// SQL dialect of the physical databases
    pub database_type: DatabaseType,
}

impl Default for KernelProperties {
    fn default() -> Self {
        Self {
            sql_show: false,
            sql_federation_enabled: false,
            database_type: DatabaseType::MySQL,
        }
    }
}

// ============================================================================
// JSON loading
// ============================================================================

fn parse_json<T: for<'de> Deserialize<'de>>(what: &str, json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| ShardError::Configuration(format!("invalid {} configuration: {}", what, e)))
}

impl ShardingRuleConfiguration {
    pub fn from_json(json: &str) -> Result<Self> {
        parse_json("sharding rule", json)
    }
}

impl ReadwriteSplittingRuleConfiguration {
    pub fn from_json(json: &str) -> Result<Self> {
        parse_json("read/write splitting", json)
    }
}

impl KernelProperties {
    pub fn from_json(json: &str) -> Result<Self> {
        parse_json("kernel properties", json)
    }
}

// ============================================================================
// Property helpers
// ============================================================================

/// Read a required property
pub(crate) fn required_prop<'a>(props: &'a Props, key: &str) -> Result<&'a str> {
    props
        .get(key)
        .map(|s| s.trim())
        .ok_or_else(|| ShardError::Configuration(format!("missing property '{}'", key)))
}

/// Read a required integer property
pub(crate) fn required_i64(props: &Props, key: &str) -> Result<i64> {
    let raw = required_prop(props, key)?;
    raw.parse().map_err(|_| {
        ShardError::Configuration(format!("property '{}' must be an integer, got '{}'", key, raw))
    })
}

/// Read an optional integer property with a default
pub(crate) fn i64_or(props: &Props, key: &str, default: i64) -> Result<i64> {
    match props.get(key) {
        Some(_) => required_i64(props, key),
        None => Ok(default),
    }
}
