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

//! Durable store holding configuration and schema outside process memory.

mod memory;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use metadata::{
    data::SchemaData,
    props::GlobalProperties,
    resource::DataSourceProperties,
    rule::RuleConfiguration,
    schema::{Schema, SchemaDelta, View},
};
use tracing::debug;

pub use self::memory::MemoryPersistService;
use crate::Result;

#[async_trait]
pub trait PersistService: fmt::Debug + Send + Sync {
    async fn load_database_names(&self) -> Result<Vec<String>>;

    async fn load_data_sources(
        &self,
        database: &str,
    ) -> Result<BTreeMap<String, DataSourceProperties>>;

    async fn load_database_rules(&self, database: &str) -> Result<Vec<RuleConfiguration>>;

    async fn load_global_rules(&self) -> Result<Vec<RuleConfiguration>>;

    async fn load_props(&self) -> Result<GlobalProperties>;

    /// Persisted schemas of a database, keyed by schema name.
    async fn load_schemas(&self, database: &str) -> Result<HashMap<String, Schema>>;

    async fn load_schema(&self, database: &str, schema_name: &str) -> Result<Option<Schema>>;

    async fn load_views(&self, database: &str, schema_name: &str) -> Result<Vec<View>>;

    /// Put every table and view of `schema`, creating the schema if needed.
    async fn persist_schema(&self, database: &str, schema_name: &str, schema: &Schema)
        -> Result<()>;

    /// Delete the tables and views listed in `schema`.
    async fn delete_schema_objects(
        &self,
        database: &str,
        schema_name: &str,
        schema: &Schema,
    ) -> Result<()>;

    async fn drop_schema(&self, database: &str, schema_name: &str) -> Result<()>;

    /// Persisted row data of a database, keyed by schema name.
    async fn load_schema_data(&self, database: &str) -> Result<HashMap<String, SchemaData>>;

    async fn persist_schema_data(
        &self,
        database: &str,
        schema_name: &str,
        data: &SchemaData,
    ) -> Result<()>;

    /// Release the connection to the store.
    async fn close(&self) -> Result<()>;

    /// Write only the tables and views that differ from the persisted ones.
    async fn compare_and_persist(
        &self,
        database: &str,
        schema_name: &str,
        schema: &Schema,
    ) -> Result<()> {
        let current = self
            .load_schema(database, schema_name)
            .await?
            .unwrap_or_default();
        let delta = SchemaDelta::between(schema, &current);
        debug!(
            database,
            schema = schema_name,
            added = delta.to_be_added.tables().len() + delta.to_be_added.views().len(),
            deleted = delta.to_be_deleted.tables().len() + delta.to_be_deleted.views().len(),
            "Compare and persist schema"
        );

        self.persist_schema(database, schema_name, &delta.to_be_added)
            .await?;
        if !delta.to_be_deleted.is_empty() {
            self.delete_schema_objects(database, schema_name, &delta.to_be_deleted)
                .await?;
        }

        Ok(())
    }
}

pub type PersistServiceRef = Arc<dyn PersistService>;
