//! ApexShard Core - Query federation for sharded databases
//!
//! Presents one logical table view over many physical shards. A bound
//! statement flows through three stages:
//!
//! ```text
//! statement + params ─► StatementContext ─► RouteEngine ─► RouteContext
//!                                                            │
//!                              RewriteEngine ◄───────────────┘
//!                                   │ per-unit SQL + params
//!                                   ▼
//!                         (external executor) ─► QueryResults ─► MergeEngine ─► MergedResult
//! ```
//!
//! Parsing, physical execution, wire protocols and configuration loading are
//! owned by the embedding application.

pub mod algorithm;
pub mod config;
pub mod data;
pub mod kernel;
pub mod merge;
pub mod rewrite;
pub mod route;
pub mod rule;
pub mod statement;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use config::{KernelProperties, ReadwriteSplittingRuleConfiguration, ShardingRuleConfiguration};
pub use data::{Row, Value};
pub use kernel::{ExecutionPlan, ExecutionUnit, ShardingKernel};
pub use merge::{merge_update_counts, MemoryQueryResult, MergeEngine, MergeStrategy, MergedResult, QueryResult, ShardCursor};
pub use rewrite::{RewriteEngine, SqlUnit};
pub use route::{RouteContext, RouteEngine, RouteMapper, RouteUnit};
pub use rule::{DataNode, ReadwriteSplittingRule, RuleHolder, ShardingRule};
pub use statement::{DatabaseType, SqlStatement, StatementContext};

/// Boxed error produced by an external per-shard cursor
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Sharding core error type
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Routing ambiguity: no common data source for tables {tables:?}")]
    RoutingAmbiguity { tables: Vec<String> },

    #[error("Unsupported rewrite: {0}")]
    UnsupportedRewrite(String),

    #[error("Execution failed on {data_source}.{table}: {source}")]
    ExecutionPropagated {
        data_source: String,
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Overlapping SQL tokens at {first} and {second}")]
    OverlappingTokens { first: usize, second: usize },

    #[error("Parameter index out of range: {0}")]
    ParameterOutOfRange(usize),

    #[error("Column index out of range: {0}")]
    ColumnIndexOutOfRange(usize),

    #[error("Merged result is closed")]
    ResultClosed,

    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,
}

impl ShardError {
    /// Whether the error came from a physical shard rather than static configuration
    pub fn is_execution(&self) -> bool {
        matches!(self, ShardError::ExecutionPropagated { .. })
    }
}

pub type Result<T> = std::result::Result<T, ShardError>;
