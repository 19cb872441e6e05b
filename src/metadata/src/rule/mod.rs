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

//! Rules: declarative configurations and their constructed runtime form.
//!
//! Callers never match on the concrete rule type. They ask a rule for the
//! capabilities it implements through the `as_*` accessors of [`Rule`].

mod builder;
mod builtin;
mod config;

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

pub use self::{
    builder::{RuleBuildContext, RuleBuilder, RuleBuilderRef, RuleBuilderRegistry},
    builtin::{ConfiguredRule, ShardingRule, SingleRule},
    config::*,
};
use crate::{resource::ResourceMetaData, schema::SchemaRef, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    Sharding,
    ReadwriteSplitting,
    Encrypt,
    Single,
    Transaction,
    SqlFederation,
    SqlTranslator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleScope {
    Database,
    Global,
}

impl RuleKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RuleKind::Sharding => "SHARDING",
            RuleKind::ReadwriteSplitting => "READWRITE_SPLITTING",
            RuleKind::Encrypt => "ENCRYPT",
            RuleKind::Single => "SINGLE",
            RuleKind::Transaction => "TRANSACTION",
            RuleKind::SqlFederation => "SQL_FEDERATION",
            RuleKind::SqlTranslator => "SQL_TRANSLATOR",
        }
    }

    pub fn scope(&self) -> RuleScope {
        match self {
            RuleKind::Sharding
            | RuleKind::ReadwriteSplitting
            | RuleKind::Encrypt
            | RuleKind::Single => RuleScope::Database,
            RuleKind::Transaction | RuleKind::SqlFederation | RuleKind::SqlTranslator => {
                RuleScope::Global
            }
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Constructed runtime form of a [`RuleConfiguration`].
pub trait Rule: fmt::Debug + Send + Sync {
    fn kind(&self) -> RuleKind;

    fn configuration(&self) -> &RuleConfiguration;

    fn as_resource_held(&self) -> Option<&dyn ResourceHeldRule> {
        None
    }

    fn as_table_contained(&self) -> Option<&dyn TableContainedRule> {
        None
    }

    fn as_mutable_data_node(&self) -> Option<&dyn MutableDataNodeRule> {
        None
    }
}

pub type RuleRef = Arc<dyn Rule>;

/// A rule holding resources (e.g. administrative connections) that must be
/// released when the rule is replaced.
pub trait ResourceHeldRule: Send + Sync {
    /// Close resources bound to `database_name`, or all of them if `None`.
    fn close_stale_resource(&self, database_name: Option<&str>) -> Result<()>;
}

/// A rule mapping logic tables onto several physical nodes.
pub trait TableContainedRule: Send + Sync {
    /// Lower-cased names of the distributed logic tables.
    fn distributed_tables(&self) -> &BTreeSet<String>;

    fn contains_distributed_table(&self, table_name: &str) -> bool {
        self.distributed_tables()
            .contains(&table_name.to_lowercase())
    }
}

/// Inputs for rebuilding a [`MutableDataNodeRule`].
pub struct RuleReloadContext<'a> {
    pub database_name: &'a str,
    pub resource: &'a ResourceMetaData,
    pub schemas: &'a HashMap<String, SchemaRef>,
    pub rules: &'a [RuleRef],
}

/// A rule whose set of tables changes at runtime with the schema.
///
/// Mutations return a new rule instead of changing `self`, because the rule
/// may be reachable from an installed snapshot.
pub trait MutableDataNodeRule: Send + Sync {
    /// Data source holding the single table, if the rule knows it.
    fn find_single_table(&self, schema_name: &str, table_name: &str) -> Option<String>;

    fn remove(&self, schema_name: &str, table_name: &str) -> RuleRef;

    /// Rebuild the internal table-name cache.
    fn reload(&self, ctx: &RuleReloadContext<'_>) -> Result<RuleRef>;
}

/// Ordered set of the rules of one scope.
#[derive(Clone, Debug, Default)]
pub struct RuleMetaData {
    rules: Vec<RuleRef>,
}

impl RuleMetaData {
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RuleRef] {
        &self.rules
    }

    pub fn configurations(&self) -> Vec<RuleConfiguration> {
        self.rules
            .iter()
            .map(|rule| rule.configuration().clone())
            .collect()
    }

    pub fn find(&self, kind: RuleKind) -> Option<&RuleRef> {
        self.rules.iter().find(|rule| rule.kind() == kind)
    }

    pub fn resource_held_rules(&self) -> impl Iterator<Item = &dyn ResourceHeldRule> {
        self.rules.iter().filter_map(|rule| rule.as_resource_held())
    }

    pub fn table_contained_rules(&self) -> impl Iterator<Item = &dyn TableContainedRule> {
        self.rules.iter().filter_map(|rule| rule.as_table_contained())
    }

    /// The first mutable data node rule with its position.
    pub fn mutable_data_node_rule(&self) -> Option<(usize, &dyn MutableDataNodeRule)> {
        self.rules
            .iter()
            .enumerate()
            .find_map(|(idx, rule)| rule.as_mutable_data_node().map(|r| (idx, r)))
    }

    /// A table is single when no rule distributes it.
    pub fn is_single_table(&self, table_name: &str) -> bool {
        self.table_contained_rules()
            .all(|rule| !rule.contains_distributed_table(table_name))
    }

    pub fn replaced(&self, idx: usize, rule: RuleRef) -> RuleMetaData {
        let mut rules = self.rules.clone();
        rules[idx] = rule;
        RuleMetaData { rules }
    }
}
