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
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::anyhow;
use async_trait::async_trait;
use metadata::{
    data::SchemaData,
    props::GlobalProperties,
    resource::DataSourceProperties,
    rule::RuleConfiguration,
    schema::{Schema, View},
};
use tokio::sync::RwLock;
use tracing::info;

use super::PersistService;
use crate::Result;

#[derive(Debug, Default)]
struct DatabaseNode {
    data_sources: BTreeMap<String, DataSourceProperties>,
    rules: Vec<RuleConfiguration>,
    schemas: BTreeMap<String, Schema>,
    schema_data: BTreeMap<String, SchemaData>,
}

#[derive(Debug, Default)]
struct Store {
    props: GlobalProperties,
    global_rules: Vec<RuleConfiguration>,
    databases: BTreeMap<String, DatabaseNode>,
}

/// Durable store kept in process memory, for standalone deployments and
/// tests.
#[derive(Debug)]
pub struct MemoryPersistService {
    store: RwLock<Store>,
    writable: AtomicBool,
    closed: AtomicBool,
}

impl Default for MemoryPersistService {
    fn default() -> Self {
        Self {
            store: RwLock::default(),
            writable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }
}

impl MemoryPersistService {
    pub async fn set_props(&self, props: GlobalProperties) {
        self.store.write().await.props = props;
    }

    pub async fn set_global_rules(&self, rules: Vec<RuleConfiguration>) {
        self.store.write().await.global_rules = rules;
    }

    pub async fn set_data_sources(
        &self,
        database: &str,
        data_sources: BTreeMap<String, DataSourceProperties>,
    ) {
        let mut store = self.store.write().await;
        store
            .databases
            .entry(database.to_lowercase())
            .or_default()
            .data_sources = data_sources;
    }

    pub async fn set_database_rules(&self, database: &str, rules: Vec<RuleConfiguration>) {
        let mut store = self.store.write().await;
        store
            .databases
            .entry(database.to_lowercase())
            .or_default()
            .rules = rules;
    }

    pub async fn schema_data(&self, database: &str, schema_name: &str) -> Option<SchemaData> {
        let store = self.store.read().await;
        store
            .databases
            .get(&database.to_lowercase())?
            .schema_data
            .get(&schema_name.to_lowercase())
            .cloned()
    }

    /// Make every write fail, simulating an unreachable backend.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(anyhow!("durable store is not writable").into())
        }
    }
}

#[async_trait]
impl PersistService for MemoryPersistService {
    async fn load_database_names(&self) -> Result<Vec<String>> {
        Ok(self.store.read().await.databases.keys().cloned().collect())
    }

    async fn load_data_sources(
        &self,
        database: &str,
    ) -> Result<BTreeMap<String, DataSourceProperties>> {
        let store = self.store.read().await;
        Ok(store
            .databases
            .get(&database.to_lowercase())
            .map(|node| node.data_sources.clone())
            .unwrap_or_default())
    }

    async fn load_database_rules(&self, database: &str) -> Result<Vec<RuleConfiguration>> {
        let store = self.store.read().await;
        Ok(store
            .databases
            .get(&database.to_lowercase())
            .map(|node| node.rules.clone())
            .unwrap_or_default())
    }

    async fn load_global_rules(&self) -> Result<Vec<RuleConfiguration>> {
        Ok(self.store.read().await.global_rules.clone())
    }

    async fn load_props(&self) -> Result<GlobalProperties> {
        Ok(self.store.read().await.props.clone())
    }

    async fn load_schemas(&self, database: &str) -> Result<HashMap<String, Schema>> {
        let store = self.store.read().await;
        Ok(store
            .databases
            .get(&database.to_lowercase())
            .map(|node| {
                node.schemas
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_schema(&self, database: &str, schema_name: &str) -> Result<Option<Schema>> {
        let store = self.store.read().await;
        Ok(store
            .databases
            .get(&database.to_lowercase())
            .and_then(|node| node.schemas.get(&schema_name.to_lowercase()))
            .cloned())
    }

    async fn load_views(&self, database: &str, schema_name: &str) -> Result<Vec<View>> {
        let schema = self.load_schema(database, schema_name).await?;
        Ok(schema
            .map(|schema| schema.views().values().map(|v| v.as_ref().clone()).collect())
            .unwrap_or_default())
    }

    async fn persist_schema(
        &self,
        database: &str,
        schema_name: &str,
        schema: &Schema,
    ) -> Result<()> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        let persisted = store
            .databases
            .entry(database.to_lowercase())
            .or_default()
            .schemas
            .entry(schema_name.to_lowercase())
            .or_default();
        for table in schema.tables().values() {
            persisted.put_table(table.clone());
        }
        for view in schema.views().values() {
            persisted.put_view(view.clone());
        }

        Ok(())
    }

    async fn delete_schema_objects(
        &self,
        database: &str,
        schema_name: &str,
        schema: &Schema,
    ) -> Result<()> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        let persisted = store
            .databases
            .get_mut(&database.to_lowercase())
            .and_then(|node| node.schemas.get_mut(&schema_name.to_lowercase()));
        if let Some(persisted) = persisted {
            for name in schema.tables().keys() {
                persisted.remove_table(name);
            }
            for name in schema.views().keys() {
                persisted.remove_view(name);
            }
        }

        Ok(())
    }

    async fn drop_schema(&self, database: &str, schema_name: &str) -> Result<()> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        if let Some(node) = store.databases.get_mut(&database.to_lowercase()) {
            node.schemas.remove(&schema_name.to_lowercase());
        }

        Ok(())
    }

    async fn load_schema_data(&self, database: &str) -> Result<HashMap<String, SchemaData>> {
        let store = self.store.read().await;
        Ok(store
            .databases
            .get(&database.to_lowercase())
            .map(|node| {
                node.schema_data
                    .iter()
                    .map(|(name, data)| (name.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn persist_schema_data(
        &self,
        database: &str,
        schema_name: &str,
        data: &SchemaData,
    ) -> Result<()> {
        self.check_writable()?;
        let mut store = self.store.write().await;
        store
            .databases
            .entry(database.to_lowercase())
            .or_default()
            .schema_data
            .insert(schema_name.to_lowercase(), data.clone());

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Memory persist service closed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use metadata::schema::{Column, ColumnType, Table};

    use super::*;

    fn table(name: &str, column_type: ColumnType) -> Table {
        Table::new(name, vec![Column::new("id", column_type)])
    }

    #[tokio::test]
    async fn test_compare_and_persist() {
        let store = MemoryPersistService::default();
        let schema = Schema::new(
            [
                table("t_order", ColumnType::Integer),
                table("t_user", ColumnType::Integer),
            ],
            [View::new("v_order", "SELECT * FROM t_order")],
        );
        store
            .compare_and_persist("db1", "public", &schema)
            .await
            .unwrap();
        assert_eq!(store.load_schema("db1", "public").await.unwrap(), Some(schema));

        let proposed = Schema::new(
            [table("t_order", ColumnType::BigInt)],
            [View::new("v_order", "SELECT * FROM t_order")],
        );
        store
            .compare_and_persist("DB1", "PUBLIC", &proposed)
            .await
            .unwrap();
        let persisted = store.load_schema("db1", "public").await.unwrap().unwrap();
        assert_eq!(persisted, proposed);
        assert_eq!(store.load_views("db1", "public").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_schema_data() {
        let store = MemoryPersistService::default();
        assert!(store.load_schema_data("db1").await.unwrap().is_empty());

        store
            .persist_schema_data("DB1", "PUBLIC", &SchemaData::default())
            .await
            .unwrap();
        let loaded = store.load_schema_data("db1").await.unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["public"]);
        assert!(store.load_schema_data("db2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_store() {
        let store = MemoryPersistService::default();
        store.set_writable(false);
        assert!(store
            .persist_schema("db1", "public", &Schema::default())
            .await
            .is_err());
        assert!(store.load_schemas("db1").await.unwrap().is_empty());

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_drop_schema() {
        let store = MemoryPersistService::default();
        store
            .persist_schema("db1", "archive", &Schema::default())
            .await
            .unwrap();
        assert_eq!(store.load_database_names().await.unwrap(), vec!["db1"]);
        store.drop_schema("db1", "archive").await.unwrap();
        assert!(store.load_schema("db1", "archive").await.unwrap().is_none());
    }
}
