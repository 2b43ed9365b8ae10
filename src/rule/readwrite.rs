//! Read/write splitting rule

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::algorithm::loadbalance::{create_load_balancer, RoundRobinLoadBalancer};
use crate::algorithm::LoadBalanceAlgorithm;
use crate::config::ReadwriteSplittingRuleConfiguration;
use crate::{Result, ShardError};

/// One logical data source backed by a primary and replicas
pub struct ReadwriteGroup {
    name: String,
    write_data_source: String,
    read_data_sources: Vec<String>,
    disabled: HashSet<String>,
    load_balancer: Arc<dyn LoadBalanceAlgorithm>,
}

impl fmt::Debug for ReadwriteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadwriteGroup")
            .field("name", &self.name)
            .field("write", &self.write_data_source)
            .field("reads", &self.read_data_sources)
            .field("disabled", &self.disabled)
            .field("load_balancer", &self.load_balancer.type_name())
            .finish()
    }
}

impl ReadwriteGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn write_data_source(&self) -> &str {
        &self.write_data_source
    }

    /// Reads currently in rotation
    pub fn enabled_reads(&self) -> Vec<String> {
        self.read_data_sources
            .iter()
            .filter(|r| !self.disabled.contains(*r))
            .cloned()
            .collect()
    }

    /// Read target for one statement; the write data source when no read is healthy
    pub fn choose_read(&self) -> String {
        let reads = self.enabled_reads();
        self.load_balancer
            .choose(&self.name, &reads)
            .unwrap_or_else(|| self.write_data_source.clone())
    }
}

/// Compiled read/write splitting rule
#[derive(Debug)]
pub struct ReadwriteSplittingRule {
    groups: Vec<ReadwriteGroup>,
}

impl ReadwriteSplittingRule {
    pub fn new(config: &ReadwriteSplittingRuleConfiguration) -> Result<Self> {
        let balancers: BTreeMap<&str, Arc<dyn LoadBalanceAlgorithm>> = config
            .load_balancers
            .iter()
            .map(|(name, c)| Ok((name.as_str(), create_load_balancer(c)?)))
            .collect::<Result<_>>()?;
        let mut groups: Vec<ReadwriteGroup> = Vec::with_capacity(config.groups.len());
        for group in &config.groups {
            if group.name.is_empty() || group.write_data_source.is_empty() {
                return Err(ShardError::Configuration(
                    "read/write group needs a name and a write data source".into(),
                ));
            }
            if groups.iter().any(|g| g.name == group.name) {
                return Err(ShardError::Configuration(format!(
                    "read/write group '{}' is configured twice",
                    group.name
                )));
            }
            if let Some(unknown) = group
                .disabled_data_sources
                .iter()
                .find(|d| !group.read_data_sources.contains(*d))
            {
                return Err(ShardError::Configuration(format!(
                    "disabled data source '{}' is not a read of '{}'",
                    unknown, group.name
                )));
            }
            let load_balancer = match &group.load_balancer {
                Some(name) => balancers.get(name.as_str()).cloned().ok_or_else(|| {
                    ShardError::Configuration(format!("load balancer '{}' is not defined", name))
                })?,
                None => Arc::new(RoundRobinLoadBalancer::default()),
            };
            groups.push(ReadwriteGroup {
                name: group.name.clone(),
                write_data_source: group.write_data_source.clone(),
                read_data_sources: group.read_data_sources.clone(),
                disabled: group.disabled_data_sources.iter().cloned().collect(),
                load_balancer,
            });
        }
        Ok(Self { groups })
    }

    pub fn find_group(&self, logical_data_source: &str) -> Option<&ReadwriteGroup> {
        self.groups.iter().find(|g| g.name == logical_data_source)
    }

    pub fn groups(&self) -> &[ReadwriteGroup] {
        &self.groups
    }
}
