//! Sharding kernel - route, rewrite and merge behind one handle

use std::sync::Arc;

use crate::config::{KernelProperties, ReadwriteSplittingRuleConfiguration, ShardingRuleConfiguration};
use crate::data::Value;
use crate::merge::{MergeEngine, MergedResult, QueryResult, ShardCursor};
use crate::rewrite::RewriteEngine;
use crate::route::{RouteContext, RouteEngine, RouteUnit};
use crate::rule::{ReadwriteSplittingRule, RuleHolder, ShardingRule};
use crate::statement::{HintContext, SqlStatement, StatementContext};
use crate::{Result, ShardError};

/// One physical statement for the executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub route_unit: RouteUnit,
    /// Data source to run on, after read/write splitting
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

/// Everything needed to execute one statement and merge its results
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub context: StatementContext,
    pub route_context: RouteContext,
    pub units: Vec<ExecutionUnit>,
}

/// The sharding core
pub struct ShardingKernel {
    rules: RuleHolder,
    readwrite: Option<ReadwriteSplittingRule>,
    props: KernelProperties,
}

impl ShardingKernel {
    pub fn new(rule: ShardingRule, readwrite: Option<ReadwriteSplittingRule>, props: KernelProperties) -> Self {
        Self {
            rules: RuleHolder::new(rule),
            readwrite,
            props,
        }
    }

    /// Build the rules from their configurations
    pub fn from_configuration(
        sharding: &ShardingRuleConfiguration,
        readwrite: Option<&ReadwriteSplittingRuleConfiguration>,
        props: KernelProperties,
    ) -> Result<Self> {
        let rule = ShardingRule::new(sharding)?;
        let readwrite = readwrite.map(ReadwriteSplittingRule::new).transpose()?;
        Ok(Self::new(rule, readwrite, props))
    }

    /// Handle used to reload the sharding rule
    pub fn rules(&self) -> &RuleHolder {
        &self.rules
    }

    pub fn props(&self) -> &KernelProperties {
        &self.props
    }

    /// Route and rewrite a bound statement
    pub fn prepare(
        &self,
        statement: Arc<SqlStatement>,
        parameters: Vec<Value>,
        sql: &str,
        hint: &HintContext,
    ) -> Result<ExecutionPlan> {
        let rule = self.rules.load();
        let database_type = self.props.database_type;
        let context = StatementContext::new(statement, parameters, &rule, database_type)?;
        let route_context = RouteEngine::new(&rule, self.readwrite.as_ref(), &self.props).route(&context, hint)?;
        let rewritten = RewriteEngine::new(database_type).rewrite(sql, &context, &route_context)?;

        let units: Vec<ExecutionUnit> = rewritten
            .into_iter()
            .map(|(route_unit, sql_unit)| ExecutionUnit {
                data_source: route_unit.data_source_name().to_string(),
                sql: sql_unit.sql,
                parameters: sql_unit.parameters.flatten(),
                route_unit,
            })
            .collect();

        if self.props.sql_show {
            log::info!("Logic SQL: {}", sql);
            for unit in &units {
                log::info!("Actual SQL: {} ::: {} ::: {:?}", unit.data_source, unit.sql, unit.parameters);
            }
        }
        Ok(ExecutionPlan {
            context,
            route_context,
            units,
        })
    }

    /// Merge the executor's results, one per plan unit and in unit order
    pub fn merge(&self, plan: &ExecutionPlan, mut results: Vec<Box<dyn QueryResult>>) -> Result<MergedResult> {
        if results.len() != plan.units.len() {
            for result in &mut results {
                if let Err(e) = result.close() {
                    log::warn!("Closing an unmatched result failed: {}", e);
                }
            }
            return Err(ShardError::Configuration(format!(
                "expected {} results, got {}",
                plan.units.len(),
                results.len()
            )));
        }
        let cursors = plan
            .units
            .iter()
            .zip(results)
            .map(|(unit, result)| ShardCursor::for_unit(&unit.route_unit, result))
            .collect();
        MergeEngine::new().merge(&plan.context, cursors)
    }
}
