//! Shared rule fixtures for unit tests

use crate::config::{
    AlgorithmConfiguration, KeyGenerateStrategyConfiguration, ReadwriteGroupConfiguration,
    ReadwriteSplittingRuleConfiguration, ShardingRuleConfiguration, ShardingStrategyConfiguration,
    TableRuleConfiguration,
};
use crate::rule::{ReadwriteSplittingRule, ShardingRule};

fn strategy(column: &str, algorithm: &str) -> Option<ShardingStrategyConfiguration> {
    Some(ShardingStrategyConfiguration {
        sharding_column: column.into(),
        algorithm: algorithm.into(),
    })
}

/// `t_order` and `t_order_item` on `ds${0..1}.<table>_${0..1}`, bound,
/// databases by `user_id % 2`, tables by `order_id % 2`; `t_user` on
/// `ds${0..1}.t_user` by `user_id % 2`; `t_dict` broadcast; `ds0` default.
pub(crate) fn order_config() -> ShardingRuleConfiguration {
    let mut config = ShardingRuleConfiguration {
        data_sources: vec!["ds0".into(), "ds1".into()],
        broadcast_tables: vec!["t_dict".into()],
        binding_tables: vec!["t_order, t_order_item".into()],
        default_data_source: Some("ds0".into()),
        ..Default::default()
    };
    for table in ["t_order", "t_order_item"] {
        config.tables.push(TableRuleConfiguration {
            logic_table: table.into(),
            actual_data_nodes: Some(format!("ds${{0..1}}.{}_${{0..1}}", table)),
            database_strategy: strategy("user_id", "db_mod"),
            table_strategy: strategy("order_id", "table_mod"),
            key_generate: Some(KeyGenerateStrategyConfiguration {
                column: "order_id".into(),
                generator: "inc".into(),
            }),
        });
    }
    config.tables.push(TableRuleConfiguration {
        logic_table: "t_user".into(),
        actual_data_nodes: Some("ds${0..1}.t_user".into()),
        database_strategy: strategy("user_id", "db_mod"),
        ..Default::default()
    });
    config
        .sharding_algorithms
        .insert("db_mod".into(), AlgorithmConfiguration::new("MOD").prop("sharding-count", 2));
    config
        .sharding_algorithms
        .insert("table_mod".into(), AlgorithmConfiguration::new("MOD").prop("sharding-count", 2));
    config
        .key_generators
        .insert("inc".into(), AlgorithmConfiguration::new("INCREMENT").prop("start", 100));
    config
}

pub(crate) fn order_rule() -> ShardingRule {
    ShardingRule::new(&order_config()).unwrap()
}

/// `ds0` and `ds1` each backed by one primary and two replicas
pub(crate) fn readwrite_rule() -> ReadwriteSplittingRule {
    let groups = ["ds0", "ds1"]
        .iter()
        .map(|name| ReadwriteGroupConfiguration {
            name: name.to_string(),
            write_data_source: format!("{}_primary", name),
            read_data_sources: vec![format!("{}_replica_0", name), format!("{}_replica_1", name)],
            ..Default::default()
        })
        .collect();
    ReadwriteSplittingRule::new(&ReadwriteSplittingRuleConfiguration {
        groups,
        ..Default::default()
    })
    .unwrap()
}
