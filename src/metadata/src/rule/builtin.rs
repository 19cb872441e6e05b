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

//! Rules shipped with the proxy and their builders.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use anyhow::anyhow;

use super::{
    MutableDataNodeRule, Rule, RuleBuildContext, RuleBuilder, RuleBuilderRef, RuleConfiguration,
    RuleKind, RuleRef, RuleReloadContext, ShardingRuleConfiguration, SingleRuleConfiguration,
    TableContainedRule,
};
use crate::{
    database_type::DatabaseType, ensure, resource::ResourceMetaData, schema::SchemaRef, Result,
};

pub(super) fn builders() -> Vec<RuleBuilderRef> {
    vec![
        Arc::new(ShardingRuleBuilder),
        Arc::new(SingleRuleBuilder),
        Arc::new(ConfiguredRuleBuilder {
            kind: RuleKind::Encrypt,
            validate: validate_encrypt,
        }),
        Arc::new(ConfiguredRuleBuilder {
            kind: RuleKind::ReadwriteSplitting,
            validate: validate_readwrite_splitting,
        }),
        Arc::new(ConfiguredRuleBuilder {
            kind: RuleKind::Transaction,
            validate: validate_transaction,
        }),
        Arc::new(ConfiguredRuleBuilder {
            kind: RuleKind::SqlFederation,
            validate: |_, _| Ok(()),
        }),
        Arc::new(ConfiguredRuleBuilder {
            kind: RuleKind::SqlTranslator,
            validate: validate_sql_translator,
        }),
    ]
}

fn mismatched(expected: RuleKind, config: &RuleConfiguration) -> crate::Error {
    anyhow!(
        "builder of {expected} received a {} configuration",
        config.kind()
    )
    .into()
}

/// Distributes logic tables over several data nodes.
#[derive(Debug)]
pub struct ShardingRule {
    config: RuleConfiguration,
    distributed_tables: BTreeSet<String>,
}

impl Rule for ShardingRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Sharding
    }

    fn configuration(&self) -> &RuleConfiguration {
        &self.config
    }

    fn as_table_contained(&self) -> Option<&dyn TableContainedRule> {
        Some(self)
    }
}

impl TableContainedRule for ShardingRule {
    fn distributed_tables(&self) -> &BTreeSet<String> {
        &self.distributed_tables
    }
}

struct ShardingRuleBuilder;

impl ShardingRuleBuilder {
    fn distributed_tables(config: &ShardingRuleConfiguration) -> Result<BTreeSet<String>> {
        let mut tables = BTreeSet::new();
        for table in &config.tables {
            ensure!(!table.logic_table.is_empty(), "empty logic table name");
            ensure!(
                tables.insert(table.logic_table.to_lowercase()),
                "duplicate logic table {}",
                table.logic_table
            );
        }
        for (name, algorithm) in &config.sharding_algorithms {
            ensure!(
                !algorithm.type_name.is_empty(),
                "sharding algorithm {name} has no type"
            );
        }
        tables.extend(config.broadcast_tables.iter().map(|t| t.to_lowercase()));

        Ok(tables)
    }
}

impl RuleBuilder for ShardingRuleBuilder {
    fn kind(&self) -> RuleKind {
        RuleKind::Sharding
    }

    fn build(&self, config: &RuleConfiguration, _ctx: &RuleBuildContext<'_>) -> Result<RuleRef> {
        let RuleConfiguration::Sharding(sharding) = config else {
            return Err(mismatched(RuleKind::Sharding, config));
        };

        Ok(Arc::new(ShardingRule {
            distributed_tables: Self::distributed_tables(sharding)?,
            config: config.clone(),
        }))
    }
}

/// schema -> table -> data source, all lower-cased.
type SingleTables = BTreeMap<String, BTreeMap<String, String>>;

/// Routes tables that are not distributed by any other rule to exactly one
/// data source.
#[derive(Clone, Debug)]
pub struct SingleRule {
    config: RuleConfiguration,
    single: SingleRuleConfiguration,
    tables: SingleTables,
}

impl SingleRule {
    pub fn tables(&self) -> &SingleTables {
        &self.tables
    }

    fn load(
        config: &SingleRuleConfiguration,
        database_name: &str,
        resource: Option<&ResourceMetaData>,
        schemas: Option<&HashMap<String, SchemaRef>>,
        rules: &[RuleRef],
    ) -> Result<SingleTables> {
        let mut tables = SingleTables::new();
        for entry in &config.tables {
            let parts: Vec<_> = entry.split('.').collect();
            let (data_source, schema, table) = match parts.as_slice() {
                [ds, table] => {
                    let storage_type = resource
                        .and_then(|r| r.unit(ds))
                        .map(|unit| unit.storage_type())
                        .unwrap_or_default();
                    (*ds, storage_type.default_schema_name(database_name), *table)
                }
                [ds, schema, table] => (*ds, schema.to_lowercase(), *table),
                _ => return Err(anyhow!("invalid single table {entry}").into()),
            };
            if let Some(resource) = resource {
                ensure!(
                    resource.contains(data_source),
                    "single table {entry} references unknown data source"
                );
            }
            tables
                .entry(schema)
                .or_default()
                .insert(table.to_lowercase(), data_source.to_string());
        }

        if let Some(resource) = resource {
            if let Some(ds) = &config.default_data_source {
                ensure!(
                    resource.contains(ds),
                    "default data source {ds} does not exist"
                );
            }
        }

        let Some(schemas) = schemas else {
            return Ok(tables);
        };
        let fallback = config
            .default_data_source
            .clone()
            .or_else(|| resource.and_then(|r| r.units().keys().next().cloned()));
        let Some(fallback) = fallback else {
            return Ok(tables);
        };
        for (schema_name, schema) in schemas {
            for table_name in schema.tables().keys().chain(schema.views().keys()) {
                let distributed = rules.iter().any(|rule| {
                    rule.as_table_contained()
                        .is_some_and(|r| r.contains_distributed_table(table_name))
                });
                if distributed {
                    continue;
                }
                tables
                    .entry(schema_name.clone())
                    .or_default()
                    .entry(table_name.clone())
                    .or_insert_with(|| fallback.clone());
            }
        }

        Ok(tables)
    }
}

impl Rule for SingleRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Single
    }

    fn configuration(&self) -> &RuleConfiguration {
        &self.config
    }

    fn as_mutable_data_node(&self) -> Option<&dyn MutableDataNodeRule> {
        Some(self)
    }
}

impl MutableDataNodeRule for SingleRule {
    fn find_single_table(&self, schema_name: &str, table_name: &str) -> Option<String> {
        self.tables
            .get(&schema_name.to_lowercase())
            .and_then(|tables| tables.get(&table_name.to_lowercase()))
            .cloned()
    }

    fn remove(&self, schema_name: &str, table_name: &str) -> RuleRef {
        let mut rule = self.clone();
        let schema_name = schema_name.to_lowercase();
        if let Some(tables) = rule.tables.get_mut(&schema_name) {
            tables.remove(&table_name.to_lowercase());
            if tables.is_empty() {
                rule.tables.remove(&schema_name);
            }
        }

        Arc::new(rule)
    }

    fn reload(&self, ctx: &RuleReloadContext<'_>) -> Result<RuleRef> {
        let tables = Self::load(
            &self.single,
            ctx.database_name,
            Some(ctx.resource),
            Some(ctx.schemas),
            ctx.rules,
        )?;

        Ok(Arc::new(SingleRule {
            config: self.config.clone(),
            single: self.single.clone(),
            tables,
        }))
    }
}

struct SingleRuleBuilder;

impl RuleBuilder for SingleRuleBuilder {
    fn kind(&self) -> RuleKind {
        RuleKind::Single
    }

    fn build(&self, config: &RuleConfiguration, ctx: &RuleBuildContext<'_>) -> Result<RuleRef> {
        let RuleConfiguration::Single(single) = config else {
            return Err(mismatched(RuleKind::Single, config));
        };
        let database_name = ctx.database_name.unwrap_or_default();
        let tables = SingleRule::load(
            single,
            database_name,
            ctx.resource,
            ctx.schemas,
            ctx.built_rules,
        )?;

        Ok(Arc::new(SingleRule {
            config: config.clone(),
            single: single.clone(),
            tables,
        }))
    }
}

/// A rule whose runtime form is its validated configuration.
#[derive(Debug)]
pub struct ConfiguredRule {
    config: RuleConfiguration,
}

impl ConfiguredRule {
    pub fn new(config: RuleConfiguration) -> Self {
        Self { config }
    }
}

impl Rule for ConfiguredRule {
    fn kind(&self) -> RuleKind {
        self.config.kind()
    }

    fn configuration(&self) -> &RuleConfiguration {
        &self.config
    }
}

type Validator = fn(&RuleConfiguration, &RuleBuildContext<'_>) -> Result<()>;

struct ConfiguredRuleBuilder {
    kind: RuleKind,
    validate: Validator,
}

impl RuleBuilder for ConfiguredRuleBuilder {
    fn kind(&self) -> RuleKind {
        self.kind
    }

    fn build(&self, config: &RuleConfiguration, ctx: &RuleBuildContext<'_>) -> Result<RuleRef> {
        if config.kind() != self.kind {
            return Err(mismatched(self.kind, config));
        }
        (self.validate)(config, ctx)?;

        Ok(Arc::new(ConfiguredRule::new(config.clone())))
    }
}

fn validate_encrypt(config: &RuleConfiguration, _ctx: &RuleBuildContext<'_>) -> Result<()> {
    let RuleConfiguration::Encrypt(encrypt) = config else {
        return Err(mismatched(RuleKind::Encrypt, config));
    };
    for table in &encrypt.tables {
        for column in &table.columns {
            ensure!(
                encrypt.encryptors.contains_key(&column.encryptor_name),
                "encryptor {} of column {}.{} is not declared",
                column.encryptor_name,
                table.name,
                column.name
            );
        }
    }

    Ok(())
}

fn validate_readwrite_splitting(
    config: &RuleConfiguration,
    ctx: &RuleBuildContext<'_>,
) -> Result<()> {
    let RuleConfiguration::ReadwriteSplitting(rws) = config else {
        return Err(mismatched(RuleKind::ReadwriteSplitting, config));
    };
    let exists = |name: &str| ctx.resource.is_some_and(|r| r.contains(name));
    for group in &rws.data_sources {
        ensure!(
            exists(&group.write_data_source_name),
            "write data source {} of {} does not exist",
            group.write_data_source_name,
            group.name
        );
        for read in &group.read_data_source_names {
            ensure!(
                exists(read),
                "read data source {read} of {} does not exist",
                group.name
            );
        }
        if let Some(balancer) = &group.load_balancer_name {
            ensure!(
                rws.load_balancers.contains_key(balancer),
                "load balancer {balancer} of {} is not declared",
                group.name
            );
        }
    }

    Ok(())
}

const TRANSACTION_TYPES: [&str; 3] = ["LOCAL", "XA", "BASE"];

fn validate_transaction(config: &RuleConfiguration, _ctx: &RuleBuildContext<'_>) -> Result<()> {
    let RuleConfiguration::Transaction(transaction) = config else {
        return Err(mismatched(RuleKind::Transaction, config));
    };
    let default_type = transaction.default_type.to_uppercase();
    ensure!(
        TRANSACTION_TYPES.contains(&default_type.as_str()),
        "unsupported transaction type {}",
        transaction.default_type
    );

    Ok(())
}

fn validate_sql_translator(config: &RuleConfiguration, _ctx: &RuleBuildContext<'_>) -> Result<()> {
    let RuleConfiguration::SqlTranslator(translator) = config else {
        return Err(mismatched(RuleKind::SqlTranslator, config));
    };
    ensure!(
        !translator.type_name.is_empty(),
        "sql translator type is required"
    );
    translator
        .type_name
        .parse::<DatabaseType>()
        .map_err(|e| anyhow!("invalid sql translator type: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        props::GlobalProperties,
        resource::{DataSource, DataSourceProperties, StorageUnit},
        rule::{
            AlgorithmConfiguration, EncryptColumnRuleConfiguration, EncryptRuleConfiguration,
            EncryptTableRuleConfiguration, ShardingTableRuleConfiguration,
            SqlTranslatorRuleConfiguration, TransactionRuleConfiguration,
        },
        schema::{Column, ColumnType, Schema, Table},
    };

    #[derive(Debug)]
    struct NoopDataSource(DatabaseType);

    #[async_trait::async_trait]
    impl DataSource for NoopDataSource {
        fn storage_type(&self) -> DatabaseType {
            self.0
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn resource(names: &[&str], storage_type: DatabaseType) -> ResourceMetaData {
        ResourceMetaData::new(
            names
                .iter()
                .map(|name| {
                    let unit = StorageUnit::new(
                        DataSourceProperties::new("HikariDataSource", BTreeMap::new()),
                        Arc::new(NoopDataSource(storage_type)),
                    );
                    (name.to_string(), unit)
                })
                .collect(),
        )
    }

    fn ctx<'a>(
        resource: &'a ResourceMetaData,
        schemas: Option<&'a HashMap<String, SchemaRef>>,
        rules: &'a [RuleRef],
        props: &'a GlobalProperties,
    ) -> RuleBuildContext<'a> {
        RuleBuildContext {
            database_name: Some("Sharding_DB"),
            resource: Some(resource),
            schemas,
            databases: None,
            built_rules: rules,
            props,
        }
    }

    fn schemas(tables: &[&str]) -> HashMap<String, SchemaRef> {
        let schema = Schema::new(
            tables
                .iter()
                .map(|t| Table::new(*t, vec![Column::new("id", ColumnType::BigInt)])),
            [],
        );
        HashMap::from([("sharding_db".to_string(), Arc::new(schema))])
    }

    #[test]
    fn test_sharding_rule_rejects_duplicate_tables() {
        let config = RuleConfiguration::Sharding(ShardingRuleConfiguration {
            tables: vec![
                ShardingTableRuleConfiguration {
                    logic_table: "t_order".to_string(),
                    ..Default::default()
                },
                ShardingTableRuleConfiguration {
                    logic_table: "T_ORDER".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let resource = resource(&["ds_0"], DatabaseType::MySQL);
        let props = GlobalProperties::default();
        let err = ShardingRuleBuilder
            .build(&config, &ctx(&resource, None, &[], &props))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate logic table T_ORDER"));
    }

    #[test]
    fn test_single_rule_skips_distributed_tables() {
        let sharding = ShardingRuleBuilder
            .build(
                &RuleConfiguration::Sharding(ShardingRuleConfiguration {
                    tables: vec![ShardingTableRuleConfiguration {
                        logic_table: "t_order".to_string(),
                        ..Default::default()
                    }],
                    broadcast_tables: vec!["t_dict".to_string()],
                    ..Default::default()
                }),
                &ctx(
                    &ResourceMetaData::default(),
                    None,
                    &[],
                    &GlobalProperties::default(),
                ),
            )
            .unwrap();
        let resource = resource(&["ds_1", "ds_0"], DatabaseType::MySQL);
        let schemas = schemas(&["t_order", "t_dict", "t_user"]);
        let rules = vec![sharding];
        let props = GlobalProperties::default();
        let config = RuleConfiguration::Single(SingleRuleConfiguration {
            tables: vec!["ds_1.t_config".to_string()],
            default_data_source: None,
        });

        let rule = SingleRuleBuilder
            .build(&config, &ctx(&resource, Some(&schemas), &rules, &props))
            .unwrap();
        let single = rule.as_mutable_data_node().unwrap();
        assert_eq!(
            single.find_single_table("sharding_db", "T_USER").as_deref(),
            Some("ds_0")
        );
        assert_eq!(
            single.find_single_table("sharding_db", "t_config").as_deref(),
            Some("ds_1")
        );
        assert!(single.find_single_table("sharding_db", "t_order").is_none());
        assert!(single.find_single_table("sharding_db", "t_dict").is_none());

        let removed = single.remove("sharding_db", "t_user");
        let removed = removed.as_mutable_data_node().unwrap();
        assert!(removed.find_single_table("sharding_db", "t_user").is_none());
        // The original rule is left untouched.
        assert!(single.find_single_table("sharding_db", "t_user").is_some());
    }

    #[test]
    fn test_single_rule_reload() {
        let resource = resource(&["ds_0"], DatabaseType::PostgreSQL);
        let props = GlobalProperties::default();
        let config = RuleConfiguration::Single(SingleRuleConfiguration {
            tables: vec!["ds_0.t_config".to_string()],
            default_data_source: Some("ds_0".to_string()),
        });
        let rule = SingleRuleBuilder
            .build(&config, &ctx(&resource, None, &[], &props))
            .unwrap();
        let single = rule.as_mutable_data_node().unwrap();
        assert_eq!(
            single.find_single_table("public", "t_config").as_deref(),
            Some("ds_0")
        );

        let mut schemas = schemas(&["t_user"]);
        schemas.insert("public".to_string(), Arc::new(Schema::default()));
        let reloaded = single
            .reload(&RuleReloadContext {
                database_name: "sharding_db",
                resource: &resource,
                schemas: &schemas,
                rules: &[],
            })
            .unwrap();
        let reloaded = reloaded.as_mutable_data_node().unwrap();
        assert_eq!(
            reloaded.find_single_table("sharding_db", "t_user").as_deref(),
            Some("ds_0")
        );
        assert!(reloaded.find_single_table("public", "t_config").is_some());
    }

    #[test]
    fn test_single_rule_unknown_data_source() {
        let resource = resource(&["ds_0"], DatabaseType::MySQL);
        let props = GlobalProperties::default();
        let config = RuleConfiguration::Single(SingleRuleConfiguration {
            tables: vec!["ds_9.t_config".to_string()],
            default_data_source: None,
        });
        assert!(SingleRuleBuilder
            .build(&config, &ctx(&resource, None, &[], &props))
            .is_err());

        let config = RuleConfiguration::Single(SingleRuleConfiguration {
            tables: vec!["t_config".to_string()],
            default_data_source: None,
        });
        assert!(SingleRuleBuilder
            .build(&config, &ctx(&resource, None, &[], &props))
            .is_err());
    }

    #[test]
    fn test_validate_configured_rules() {
        let resource = resource(&["ds_0"], DatabaseType::MySQL);
        let props = GlobalProperties::default();
        let ctx = ctx(&resource, None, &[], &props);

        let encrypt = |encryptor: &str| {
            RuleConfiguration::Encrypt(EncryptRuleConfiguration {
                tables: vec![EncryptTableRuleConfiguration {
                    name: "t_user".to_string(),
                    columns: vec![EncryptColumnRuleConfiguration {
                        name: "pwd".to_string(),
                        cipher_column: "pwd_cipher".to_string(),
                        encryptor_name: encryptor.to_string(),
                    }],
                }],
                encryptors: BTreeMap::from([(
                    "aes".to_string(),
                    AlgorithmConfiguration {
                        type_name: "AES".to_string(),
                        props: BTreeMap::new(),
                    },
                )]),
            })
        };
        assert!(validate_encrypt(&encrypt("aes"), &ctx).is_ok());
        assert!(validate_encrypt(&encrypt("md5"), &ctx).is_err());

        let transaction = |default_type: &str| {
            RuleConfiguration::Transaction(TransactionRuleConfiguration {
                default_type: default_type.to_string(),
                ..Default::default()
            })
        };
        assert!(validate_transaction(&transaction("base"), &ctx).is_ok());
        assert!(validate_transaction(&transaction("SAGA"), &ctx).is_err());

        let translator = |type_name: &str| {
            RuleConfiguration::SqlTranslator(SqlTranslatorRuleConfiguration {
                type_name: type_name.to_string(),
                use_original_sql_when_translating_failed: true,
            })
        };
        assert!(validate_sql_translator(&translator("PostgreSQL"), &ctx).is_ok());
        assert!(validate_sql_translator(&translator(""), &ctx).is_err());

        // Validators refuse configurations of another kind.
        assert!(validate_encrypt(&transaction("XA"), &ctx).is_err());
    }
}
