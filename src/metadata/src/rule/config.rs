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

//! Declarative rule configurations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RuleKind;

/// Declarative description of a rule, carried both per database and
/// globally. The constructed runtime form is a [`super::Rule`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfiguration {
    Sharding(ShardingRuleConfiguration),
    Encrypt(EncryptRuleConfiguration),
    ReadwriteSplitting(ReadwriteSplittingRuleConfiguration),
    Single(SingleRuleConfiguration),
    Transaction(TransactionRuleConfiguration),
    SqlFederation(SqlFederationRuleConfiguration),
    SqlTranslator(SqlTranslatorRuleConfiguration),
}

impl RuleConfiguration {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleConfiguration::Sharding(_) => RuleKind::Sharding,
            RuleConfiguration::Encrypt(_) => RuleKind::Encrypt,
            RuleConfiguration::ReadwriteSplitting(_) => RuleKind::ReadwriteSplitting,
            RuleConfiguration::Single(_) => RuleKind::Single,
            RuleConfiguration::Transaction(_) => RuleKind::Transaction,
            RuleConfiguration::SqlFederation(_) => RuleKind::SqlFederation,
            RuleConfiguration::SqlTranslator(_) => RuleKind::SqlTranslator,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfiguration {
    pub type_name: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingTableRuleConfiguration {
    pub logic_table: String,
    /// Inline expression of the physical nodes, e.g. `ds_${0..1}.t_order_${0..3}`.
    #[serde(default)]
    pub actual_data_nodes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingRuleConfiguration {
    pub tables: Vec<ShardingTableRuleConfiguration>,
    pub broadcast_tables: Vec<String>,
    pub default_sharding_column: Option<String>,
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptColumnRuleConfiguration {
    pub name: String,
    pub cipher_column: String,
    pub encryptor_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptTableRuleConfiguration {
    pub name: String,
    pub columns: Vec<EncryptColumnRuleConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptRuleConfiguration {
    pub tables: Vec<EncryptTableRuleConfiguration>,
    pub encryptors: BTreeMap<String, AlgorithmConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadwriteSplittingDataSourceRuleConfiguration {
    pub name: String,
    pub write_data_source_name: String,
    pub read_data_source_names: Vec<String>,
    #[serde(default)]
    pub load_balancer_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadwriteSplittingRuleConfiguration {
    pub data_sources: Vec<ReadwriteSplittingDataSourceRuleConfiguration>,
    pub load_balancers: BTreeMap<String, AlgorithmConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleRuleConfiguration {
    /// Explicitly loaded single tables, as `data_source.table` or
    /// `data_source.schema.table`.
    pub tables: Vec<String>,
    pub default_data_source: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRuleConfiguration {
    pub default_type: String,
    pub provider_type: Option<String>,
    pub props: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlFederationRuleConfiguration {
    pub sql_federation_enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlTranslatorRuleConfiguration {
    pub type_name: String,
    pub use_original_sql_when_translating_failed: bool,
}
