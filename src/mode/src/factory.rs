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

//! Build logical databases from their configuration, either from the
//! durable store or by live discovery.

use std::{collections::HashMap, sync::Arc};

use metadata::{
    data::StatisticsData,
    database::{Database, DatabaseRef},
    database_type::DatabaseType,
    metadata::MetaData,
    props::GlobalProperties,
    resource::ResourceMetaData,
    rule::{RuleBuilderRegistry, RuleConfiguration, RuleMetaData},
    schema::{Schema, SchemaRef},
};
use tracing::info;

use crate::{
    contexts::MetaDataContexts,
    discovery::{normalize_schema_names, DiscoveryMaterial, SchemaDiscoveryRef},
    persist::PersistServiceRef,
    switcher::{close_units, ResourceSwitchManager},
    Result,
};

pub struct MetaDataFactory {
    discovery: SchemaDiscoveryRef,
    rule_builders: RuleBuilderRegistry,
}

impl MetaDataFactory {
    pub fn new(discovery: SchemaDiscoveryRef, rule_builders: RuleBuilderRegistry) -> Self {
        Self {
            discovery,
            rule_builders,
        }
    }

    pub fn discovery(&self) -> &SchemaDiscoveryRef {
        &self.discovery
    }

    /// Build a database from the schema persisted in the durable store,
    /// without touching the storage engines.
    pub async fn create_from_store(
        &self,
        name: &str,
        resource: ResourceMetaData,
        rule_configs: &[RuleConfiguration],
        props: &GlobalProperties,
        persist: &PersistServiceRef,
    ) -> Result<Database> {
        let protocol_type = DatabaseType::protocol_type(&resource.storage_types(), props)?;
        let mut schemas = normalize_schema_names(persist.load_schemas(name).await?);
        schemas
            .entry(protocol_type.default_schema_name(name))
            .or_default();
        let schemas = into_refs(schemas);

        let rules = self.rule_builders.build_database_rules(
            name,
            rule_configs,
            &resource,
            Some(&schemas),
            props,
        )?;

        Ok(Database::new(name, protocol_type, resource, rules, schemas))
    }

    /// Build a database by discovering its schema from the live pools.
    ///
    /// Discovery only reports tables, views are taken from the durable store.
    pub async fn create_external(
        &self,
        name: &str,
        resource: ResourceMetaData,
        rule_configs: &[RuleConfiguration],
        props: &GlobalProperties,
        persist: &PersistServiceRef,
    ) -> Result<Database> {
        let protocol_type = DatabaseType::protocol_type(&resource.storage_types(), props)?;
        let rules =
            self.rule_builders
                .build_database_rules(name, rule_configs, &resource, None, props)?;

        let default_schema_name = protocol_type.default_schema_name(name);
        let material = DiscoveryMaterial {
            database_name: name,
            protocol_type,
            resource: &resource,
            rules: rules.rules(),
            props,
            default_schema_name: default_schema_name.clone(),
        };
        let discovered = self.discovery.discover(&material, None).await?;
        let mut schemas = normalize_schema_names(discovered);
        schemas.entry(default_schema_name).or_default();

        for (schema_name, schema) in schemas.iter_mut() {
            for view in persist.load_views(name, schema_name).await? {
                schema.put_view(view);
            }
        }

        let database = Database::new(name, protocol_type, resource, rules, into_refs(schemas));
        Ok(database.reload_mutable_rules()?)
    }

    pub fn build_global_rules(
        &self,
        configs: &[RuleConfiguration],
        databases: &HashMap<String, DatabaseRef>,
        props: &GlobalProperties,
    ) -> Result<RuleMetaData> {
        Ok(self
            .rule_builders
            .build_global_rules(configs, databases, props)?)
    }

    /// Load the whole metadata from the durable store at process start.
    ///
    /// Pools created along the way are closed again if loading fails.
    pub async fn create_contexts_from_store(
        &self,
        persist: PersistServiceRef,
        switcher: &ResourceSwitchManager,
        initial_props: &GlobalProperties,
    ) -> Result<MetaDataContexts> {
        let props = initial_props.merged(&persist.load_props().await?);
        let mut databases = HashMap::new();
        let mut statistics = StatisticsData::default();
        let loaded = self
            .load_from_store(&persist, switcher, &props, &mut databases, &mut statistics)
            .await;

        match loaded {
            Ok(global_rules) => {
                let metadata = MetaData::new(databases, global_rules, props);
                Ok(MetaDataContexts::new(persist, metadata, statistics))
            }
            Err(e) => {
                for database in databases.values() {
                    close_units("loaded", database.resource().units()).await;
                }
                Err(e)
            }
        }
    }

    async fn load_from_store(
        &self,
        persist: &PersistServiceRef,
        switcher: &ResourceSwitchManager,
        props: &GlobalProperties,
        databases: &mut HashMap<String, DatabaseRef>,
        statistics: &mut StatisticsData,
    ) -> Result<RuleMetaData> {
        for name in persist.load_database_names().await? {
            let data_source_props = persist.load_data_sources(&name).await?;
            let switching = switcher
                .create(&ResourceMetaData::default(), &data_source_props)
                .await?;
            let resource = switching.switched_resource(&ResourceMetaData::default());
            let rule_configs = persist.load_database_rules(&name).await?;

            let created = self
                .create_from_store(&name, resource, &rule_configs, props, persist)
                .await;
            let database = match created {
                Ok(database) => database,
                Err(e) => {
                    switching.close_new_data_sources().await;
                    return Err(e);
                }
            };
            info!(
                database = %database.name(),
                data_sources = database.resource().units().len(),
                schemas = database.schemas().len(),
                "Database loaded from store"
            );
            databases.insert(database.name().to_string(), Arc::new(database));

            for (schema_name, data) in persist.load_schema_data(&name).await? {
                *statistics = statistics.with_schema_data(&name, &schema_name, data);
            }
        }

        self.build_global_rules(&persist.load_global_rules().await?, databases, props)
    }
}

fn into_refs(schemas: HashMap<String, Schema>) -> HashMap<String, SchemaRef> {
    schemas
        .into_iter()
        .map(|(name, schema)| (name, Arc::new(schema)))
        .collect()
}
