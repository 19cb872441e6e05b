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

//! Fixtures shared by the tests of this crate.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use metadata::{
    database_type::DatabaseType,
    resource::{DataSource, DataSourceProperties, DataSourceRef},
    rule::{
        ResourceHeldRule, Rule, RuleBuildContext, RuleBuilder, RuleConfiguration, RuleKind,
        RuleRef,
    },
    schema::{Schema, Table},
};

use crate::{
    discovery::{DiscoveryMaterial, SchemaDiscovery},
    switcher::DataSourceCreator,
    Result,
};

pub fn pool_props(url: &str) -> DataSourceProperties {
    DataSourceProperties::new(
        "HikariDataSource",
        BTreeMap::from([("url".to_string(), url.to_string())]),
    )
}

pub fn pool_props_with_type(url: &str, storage_type: DatabaseType) -> DataSourceProperties {
    let mut props = pool_props(url);
    props
        .props
        .insert("storage-type".to_string(), storage_type.name().to_string());
    props
}

#[derive(Debug)]
pub struct MockDataSource {
    name: String,
    storage_type: DatabaseType,
    closed: AtomicBool,
    close_log: Arc<Mutex<Vec<String>>>,
}

impl MockDataSource {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn storage_type(&self) -> DatabaseType {
        self.storage_type
    }

    async fn close(&self) -> metadata::Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_log.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockDataSourceCreator {
    close_log: Arc<Mutex<Vec<String>>>,
    failing: Mutex<BTreeSet<String>>,
    created: Mutex<Vec<Arc<MockDataSource>>>,
}

impl MockDataSourceCreator {
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Names of the closed pools, sorted.
    pub fn closed_names(&self) -> Vec<String> {
        let mut names = self.close_log.lock().unwrap().clone();
        names.sort();
        names
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn open_count(&self) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|ds| !ds.is_closed())
            .count()
    }
}

#[async_trait]
impl DataSourceCreator for MockDataSourceCreator {
    async fn create(&self, name: &str, props: &DataSourceProperties) -> Result<DataSourceRef> {
        if self.failing.lock().unwrap().contains(name) {
            return Err(anyhow!("cannot connect to {name}").into());
        }

        let storage_type = props
            .props
            .get("storage-type")
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();
        let data_source = Arc::new(MockDataSource {
            name: name.to_string(),
            storage_type,
            closed: AtomicBool::new(false),
            close_log: self.close_log.clone(),
        });
        self.created.lock().unwrap().push(data_source.clone());

        Ok(data_source)
    }
}

/// Discovery answering with the tables registered per schema.
#[derive(Default)]
pub struct MockDiscovery {
    schemas: Mutex<HashMap<String, Vec<Table>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    last_data_sources: Mutex<BTreeSet<String>>,
}

impl MockDiscovery {
    pub fn set_tables(&self, schema_name: &str, tables: Vec<Table>) {
        self.schemas
            .lock()
            .unwrap()
            .insert(schema_name.to_string(), tables);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    pub fn last_data_sources(&self) -> BTreeSet<String> {
        self.last_data_sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaDiscovery for MockDiscovery {
    async fn discover(
        &self,
        material: &DiscoveryMaterial<'_>,
        table_names: Option<&[String]>,
    ) -> Result<HashMap<String, Schema>> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        *self.last_data_sources.lock().unwrap() = material.resource.names();
        if self.failing.load(Ordering::Acquire) {
            let database = material.database_name;
            return Err(anyhow!("storage engine of {database} is unreachable").into());
        }

        let schemas = self.schemas.lock().unwrap();
        let discovered = schemas
            .iter()
            .map(|(name, tables)| {
                let tables = tables.iter().filter(|t| {
                    table_names.map_or(true, |names| {
                        names.iter().any(|n| n.eq_ignore_ascii_case(&t.name))
                    })
                });
                (name.clone(), Schema::new(tables.cloned(), []))
            })
            .collect();

        Ok(discovered)
    }
}

/// A rule holding resources, recording every close request.
#[derive(Debug)]
pub struct ResourceHeldFixtureRule {
    config: RuleConfiguration,
    closed: Arc<Mutex<Vec<Option<String>>>>,
}

impl Rule for ResourceHeldFixtureRule {
    fn kind(&self) -> RuleKind {
        self.config.kind()
    }

    fn configuration(&self) -> &RuleConfiguration {
        &self.config
    }

    fn as_resource_held(&self) -> Option<&dyn ResourceHeldRule> {
        Some(self)
    }
}

impl ResourceHeldRule for ResourceHeldFixtureRule {
    fn close_stale_resource(&self, database_name: Option<&str>) -> metadata::Result<()> {
        self.closed
            .lock()
            .unwrap()
            .push(database_name.map(str::to_string));
        Ok(())
    }
}

/// Builds [`ResourceHeldFixtureRule`]s of one kind, sharing a close log.
pub struct ResourceHeldFixtureBuilder {
    pub kind: RuleKind,
    pub closed: Arc<Mutex<Vec<Option<String>>>>,
}

impl ResourceHeldFixtureBuilder {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            closed: Arc::default(),
        }
    }

    pub fn closed(&self) -> Vec<Option<String>> {
        self.closed.lock().unwrap().clone()
    }
}

impl RuleBuilder for ResourceHeldFixtureBuilder {
    fn kind(&self) -> RuleKind {
        self.kind
    }

    fn build(
        &self,
        config: &RuleConfiguration,
        _ctx: &RuleBuildContext<'_>,
    ) -> metadata::Result<RuleRef> {
        Ok(Arc::new(ResourceHeldFixtureRule {
            config: config.clone(),
            closed: self.closed.clone(),
        }))
    }
}
