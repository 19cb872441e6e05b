// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use itertools::Itertools;
use tracing::debug;

use super::{
    builtin, RuleConfiguration, RuleKind, RuleMetaData, RuleRef, RuleScope,
};
use crate::{
    database::DatabaseRef, props::GlobalProperties, resource::ResourceMetaData,
    schema::SchemaRef, Error, Result,
};

/// Everything a builder may look at while constructing a rule.
pub struct RuleBuildContext<'a> {
    /// `None` when building global rules.
    pub database_name: Option<&'a str>,
    pub resource: Option<&'a ResourceMetaData>,
    pub schemas: Option<&'a HashMap<String, SchemaRef>>,
    pub databases: Option<&'a HashMap<String, DatabaseRef>>,
    /// Rules of the same scope built before this one.
    pub built_rules: &'a [RuleRef],
    pub props: &'a GlobalProperties,
}

/// Resolve one configuration variant into its constructed form.
pub trait RuleBuilder: Send + Sync {
    fn kind(&self) -> RuleKind;

    fn build(&self, config: &RuleConfiguration, ctx: &RuleBuildContext<'_>) -> Result<RuleRef>;
}

pub type RuleBuilderRef = Arc<dyn RuleBuilder>;

/// Builders keyed by the rule kind they construct.
///
/// Rules are built in [`RuleKind`] order, so that e.g. the single table rule
/// sees the distributed tables of the sharding rule.
#[derive(Clone, Default)]
pub struct RuleBuilderRegistry {
    builders: BTreeMap<RuleKind, RuleBuilderRef>,
}

impl RuleBuilderRegistry {
    /// Registry with a builder for every builtin rule kind.
    pub fn with_builtin() -> Self {
        let mut registry = Self::default();
        for builder in builtin::builders() {
            registry.register(builder);
        }

        registry
    }

    /// Register a builder, returning the one it replaces.
    pub fn register(&mut self, builder: RuleBuilderRef) -> Option<RuleBuilderRef> {
        self.builders.insert(builder.kind(), builder)
    }

    pub fn build_database_rules(
        &self,
        database_name: &str,
        configs: &[RuleConfiguration],
        resource: &ResourceMetaData,
        schemas: Option<&HashMap<String, SchemaRef>>,
        props: &GlobalProperties,
    ) -> Result<RuleMetaData> {
        let base = RuleBuildContext {
            database_name: Some(database_name),
            resource: Some(resource),
            schemas,
            databases: None,
            built_rules: &[],
            props,
        };
        let rules = self.build_rules(RuleScope::Database, configs, &base);

        rules
            .map(RuleMetaData::new)
            .map_err(|failures| Error::BuildRules {
                scope: format!("database {database_name}"),
                failures,
            })
    }

    pub fn build_global_rules(
        &self,
        configs: &[RuleConfiguration],
        databases: &HashMap<String, DatabaseRef>,
        props: &GlobalProperties,
    ) -> Result<RuleMetaData> {
        let base = RuleBuildContext {
            database_name: None,
            resource: None,
            schemas: None,
            databases: Some(databases),
            built_rules: &[],
            props,
        };
        let rules = self.build_rules(RuleScope::Global, configs, &base);

        rules
            .map(RuleMetaData::new)
            .map_err(|failures| Error::BuildRules {
                scope: "global".to_string(),
                failures,
            })
    }

    /// Build every configuration, collecting all failures instead of
    /// stopping at the first one. Any failure fails the whole set.
    fn build_rules(
        &self,
        scope: RuleScope,
        configs: &[RuleConfiguration],
        base: &RuleBuildContext<'_>,
    ) -> std::result::Result<Vec<RuleRef>, Vec<String>> {
        let mut rules: Vec<RuleRef> = Vec::with_capacity(configs.len());
        let mut failures = Vec::new();
        let ordered = configs.iter().sorted_by_key(|config| config.kind());
        for config in ordered {
            let kind = config.kind();
            if kind.scope() != scope {
                failures.push(format!("{kind} is not a {scope:?} rule"));
                continue;
            }
            let Some(builder) = self.builders.get(&kind) else {
                failures.push(format!("no rule builder registered for {kind}"));
                continue;
            };

            let ctx = RuleBuildContext {
                database_name: base.database_name,
                resource: base.resource,
                schemas: base.schemas,
                databases: base.databases,
                built_rules: &rules,
                props: base.props,
            };
            let built = builder.build(config, &ctx);
            match built {
                Ok(rule) => {
                    debug!(kind = %kind, "Rule built");
                    rules.push(rule);
                }
                Err(e) => failures.push(format!("{kind}: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(rules)
        } else {
            Err(failures)
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::rule::{
        ReadwriteSplittingDataSourceRuleConfiguration, ReadwriteSplittingRuleConfiguration,
        ShardingRuleConfiguration, ShardingTableRuleConfiguration, SingleRuleConfiguration,
        SqlFederationRuleConfiguration, TransactionRuleConfiguration,
    };

    fn sharding(tables: &[&str]) -> RuleConfiguration {
        RuleConfiguration::Sharding(ShardingRuleConfiguration {
            tables: tables
                .iter()
                .map(|t| ShardingTableRuleConfiguration {
                    logic_table: t.to_string(),
                    actual_data_nodes: format!("ds_${{0..1}}.{t}_${{0..1}}"),
                })
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_build_database_rules_in_kind_order() {
        let registry = RuleBuilderRegistry::with_builtin();
        let configs = vec![
            RuleConfiguration::Single(SingleRuleConfiguration::default()),
            sharding(&["t_order"]),
        ];
        let rules = registry
            .build_database_rules(
                "sharding_db",
                &configs,
                &ResourceMetaData::default(),
                None,
                &GlobalProperties::default(),
            )
            .unwrap();

        let kinds: Vec<_> = rules.rules().iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![RuleKind::Sharding, RuleKind::Single]);
        assert!(!rules.is_single_table("T_ORDER"));
        assert!(rules.is_single_table("t_user"));
        assert!(rules.mutable_data_node_rule().is_some());
    }

    #[test]
    fn test_aggregate_failures() {
        let registry = RuleBuilderRegistry::with_builtin();
        let configs = vec![
            // Global rule in database scope.
            RuleConfiguration::SqlFederation(SqlFederationRuleConfiguration::default()),
            // References unknown data sources.
            RuleConfiguration::ReadwriteSplitting(ReadwriteSplittingRuleConfiguration {
                data_sources: vec![ReadwriteSplittingDataSourceRuleConfiguration {
                    name: "readwrite_ds".to_string(),
                    write_data_source_name: "write_ds".to_string(),
                    read_data_source_names: vec!["read_ds_0".to_string()],
                    load_balancer_name: None,
                }],
                ..Default::default()
            }),
            sharding(&["t_order"]),
        ];
        let err = registry
            .build_database_rules(
                "sharding_db",
                &configs,
                &ResourceMetaData::default(),
                None,
                &GlobalProperties::default(),
            )
            .unwrap_err();

        match err {
            Error::BuildRules { scope, failures } => {
                assert_eq!(scope, "database sharding_db");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_builder() {
        let registry = RuleBuilderRegistry::default();
        let configs = vec![RuleConfiguration::Transaction(
            TransactionRuleConfiguration {
                default_type: "LOCAL".to_string(),
                ..Default::default()
            },
        )];
        let err = registry
            .build_global_rules(&configs, &HashMap::new(), &GlobalProperties::default())
            .unwrap_err();
        assert!(err.to_string().contains("no rule builder registered for TRANSACTION"));
    }

    #[test]
    fn test_build_global_rules() {
        let registry = RuleBuilderRegistry::with_builtin();
        let configs = vec![
            RuleConfiguration::SqlFederation(SqlFederationRuleConfiguration {
                sql_federation_enabled: true,
            }),
            RuleConfiguration::Transaction(TransactionRuleConfiguration {
                default_type: "XA".to_string(),
                provider_type: Some("Atomikos".to_string()),
                ..Default::default()
            }),
        ];
        let rules = registry
            .build_global_rules(&configs, &HashMap::new(), &GlobalProperties::default())
            .unwrap();
        assert_eq!(rules.rules().len(), 2);
        assert_eq!(rules.configurations().len(), 2);
        assert!(rules.find(RuleKind::Transaction).is_some());
    }
}
