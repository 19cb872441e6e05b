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

//! The context manager: holds the current snapshot and applies every
//! configuration change to it.
//!
//! Readers load the snapshot pointer once per operation and never block.
//! Mutations are serialized by one lock and follow the same shape: build a
//! complete candidate from the current snapshot, persist what the durable
//! store needs, swap the candidate in, then release what it made stale. A
//! failure at any step before the swap leaves the current snapshot
//! installed and the durable store untouched by that step.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwap;
use metadata::{
    data::{RowData, RowDataPayload, StatisticsData},
    database::{Database, DatabaseRef},
    database_type::DatabaseType,
    metadata::MetaData,
    props::GlobalProperties,
    resource::{DataSourceProperties, DataSourceRef, ResourceMetaData},
    rule::{RuleBuilderRegistry, RuleConfiguration},
    schema::{DatabaseSchemaDelta, Schema, Table, View},
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    cluster_state::ClusterState,
    config::{Config, StaleResourceConfig},
    contexts::MetaDataContexts,
    discovery::{normalize_schema_names, DiscoveryMaterial, SchemaDiscoveryRef},
    executor::ExecutorEngine,
    factory::MetaDataFactory,
    instance::InstanceContext,
    persist::PersistServiceRef,
    switcher::{DataSourceCreatorRef, ResourceSwitchManager, SwitchingResource},
    Error, Result,
};

/// Tables and views to put into or remove from one schema.
#[derive(Clone, Debug, Default)]
pub struct AlterSchemaRequest {
    pub database: String,
    pub schema: String,
    pub to_be_changed_table: Option<Table>,
    pub to_be_changed_view: Option<View>,
    pub to_be_deleted_table: Option<String>,
    pub to_be_deleted_view: Option<String>,
}

impl AlterSchemaRequest {
    pub fn new(database: &str, schema: &str) -> Self {
        Self {
            database: database.to_string(),
            schema: schema.to_string(),
            ..Default::default()
        }
    }

    pub fn change_table(mut self, table: Table) -> Self {
        self.to_be_changed_table = Some(table);
        self
    }

    pub fn change_view(mut self, view: View) -> Self {
        self.to_be_changed_view = Some(view);
        self
    }

    pub fn delete_table(mut self, name: &str) -> Self {
        self.to_be_deleted_table = Some(name.to_string());
        self
    }

    pub fn delete_view(mut self, name: &str) -> Self {
        self.to_be_deleted_view = Some(name.to_string());
        self
    }

    fn is_empty(&self) -> bool {
        self.to_be_changed_table.is_none()
            && self.to_be_changed_view.is_none()
            && self.to_be_deleted_table.is_none()
            && self.to_be_deleted_view.is_none()
    }
}

pub struct ContextManager {
    contexts: ArcSwap<MetaDataContexts>,
    instance: InstanceContext,
    factory: MetaDataFactory,
    switcher: ResourceSwitchManager,
    executor: ExecutorEngine,
    stale_resource: StaleResourceConfig,
    mutation: Mutex<()>,
    closed: AtomicBool,
}

impl ContextManager {
    pub fn try_new(
        contexts: MetaDataContexts,
        instance: InstanceContext,
        factory: MetaDataFactory,
        switcher: ResourceSwitchManager,
        stale_resource: StaleResourceConfig,
    ) -> Result<Self> {
        let executor = ExecutorEngine::try_new(contexts.metadata().props())?;

        Ok(Self {
            contexts: ArcSwap::from_pointee(contexts),
            instance,
            factory,
            switcher,
            executor,
            stale_resource,
            mutation: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Load the snapshot from the durable store and start serving it.
    pub async fn bootstrap(
        config: &Config,
        persist: PersistServiceRef,
        discovery: SchemaDiscoveryRef,
        creator: DataSourceCreatorRef,
        rule_builders: RuleBuilderRegistry,
    ) -> Result<Self> {
        let factory = MetaDataFactory::new(discovery, rule_builders);
        let switcher = ResourceSwitchManager::new(creator);
        let contexts = factory
            .create_contexts_from_store(persist, &switcher, &config.props)
            .await?;
        let instance = InstanceContext::new(config.mode.mode_type);
        info!(
            instance = instance.id(),
            mode = ?instance.mode_type(),
            databases = contexts.metadata().databases().len(),
            "Context manager bootstrapped"
        );

        Self::try_new(
            contexts,
            instance,
            factory,
            switcher,
            config.stale_resource.clone(),
        )
    }

    /// The current snapshot. Callers keep the returned value for the whole
    /// operation instead of loading again.
    pub fn metadata_contexts(&self) -> Arc<MetaDataContexts> {
        self.contexts.load_full()
    }

    pub fn instance_context(&self) -> &InstanceContext {
        &self.instance
    }

    pub fn executor_engine(&self) -> &ExecutorEngine {
        &self.executor
    }

    pub fn data_source_map(&self, database: &str) -> Result<BTreeMap<String, DataSourceRef>> {
        let contexts = self.contexts.load();
        contexts
            .metadata()
            .database(database)
            .map(|db| db.resource().data_sources())
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))
    }

    pub async fn renew_metadata_contexts(&self, contexts: MetaDataContexts) {
        let _guard = self.mutation.lock().await;
        self.install(contexts);
    }

    pub async fn add_database(&self, database: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        if current.metadata().contains_database(database) {
            debug!(database, "Database already exists");
            return Ok(());
        }

        let protocol_type =
            DatabaseType::protocol_type(&BTreeMap::new(), current.metadata().props())
                .inspect_err(|e| error!(database, err = %e, "Add database failed"))?;
        let metadata = current
            .metadata()
            .with_database(Database::empty(database, protocol_type));
        self.install(current.with_metadata(metadata));
        info!(database, protocol = %protocol_type, "Database added");

        Ok(())
    }

    /// Remove a database, then release the resources its rules and pools
    /// hold.
    pub async fn drop_database(&self, database: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        let Some(dropped) = current.metadata().database(database).cloned() else {
            debug!(database, "Database does not exist");
            return Ok(());
        };

        self.install(current.with_metadata(current.metadata().without_database(database)));
        info!(database, "Database dropped");

        for rule in current.metadata().global_rule_metadata().resource_held_rules() {
            if let Err(e) = rule.close_stale_resource(Some(dropped.name())) {
                warn!(database, err = %e, "Failed to close resource of global rule");
            }
        }
        for rule in dropped.rule_metadata().resource_held_rules() {
            if let Err(e) = rule.close_stale_resource(None) {
                warn!(database, err = %e, "Failed to close resource of database rule");
            }
        }
        self.retire(SwitchingResource::retiring(dropped.resource().units().clone()))
            .await;

        Ok(())
    }

    pub async fn add_schema(&self, database: &str, schema: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        let Some(db) = current.metadata().database(database) else {
            error!(database, schema, "Add schema to unknown database");
            return Err(Error::DatabaseNotFound(database.to_string()));
        };
        if db.contains_schema(schema) {
            debug!(database, schema, "Schema already exists");
            return Ok(());
        }

        let db = db.with_schema(schema, Arc::new(Schema::default()));
        self.install(current.with_metadata(current.metadata().with_database(db)));
        info!(database, schema, "Schema added");

        Ok(())
    }

    pub async fn drop_schema(&self, database: &str, schema: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        let Some(db) = current.metadata().database(database) else {
            return Ok(());
        };
        if !db.contains_schema(schema) {
            return Ok(());
        }

        let db = db.without_schema(schema);
        self.install(current.with_metadata(current.metadata().with_database(db)));
        info!(database, schema, "Schema dropped");

        Ok(())
    }

    /// Put or remove one table and/or view of a schema.
    ///
    /// A changed table unknown to the mutable data node rule of the database
    /// makes the rule reload its table cache before the change is visible.
    pub async fn alter_schema(&self, request: AlterSchemaRequest) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.do_alter_schema(&request).inspect_err(|e| {
            error!(
                database = %request.database,
                schema = %request.schema,
                err = %e,
                "Alter schema failed"
            )
        })
    }

    fn do_alter_schema(&self, request: &AlterSchemaRequest) -> Result<()> {
        let current = self.contexts.load_full();
        let Some(db) = current.metadata().database(&request.database) else {
            return Ok(());
        };
        let Some(schema) = db.schema(&request.schema) else {
            return Ok(());
        };
        if request.is_empty() {
            return Ok(());
        }

        let mut schema = Schema::clone(schema);
        let mut db = Database::clone(db);
        if let Some(table) = &request.to_be_deleted_table {
            schema.remove_table(table);
            db = db.remove_mutable_table(&request.schema, table);
        }
        if let Some(view) = &request.to_be_deleted_view {
            schema.remove_view(view);
            db = db.remove_mutable_table(&request.schema, view);
        }
        if let Some(table) = &request.to_be_changed_table {
            schema.put_table(table.clone());
        }
        if let Some(view) = &request.to_be_changed_view {
            schema.put_view(view.clone());
        }

        let mut db = db.with_schema(&request.schema, Arc::new(schema));
        let unknown = request
            .to_be_changed_table
            .iter()
            .map(|table| &table.name)
            .chain(request.to_be_changed_view.iter().map(|view| &view.name))
            .any(|name| !knows_table(&db, &request.schema, name));
        if unknown {
            db = db.reload_mutable_rules()?;
        }

        self.install(current.with_metadata(current.metadata().with_database(db)));
        debug!(database = %request.database, schema = %request.schema, "Schema altered");

        Ok(())
    }

    /// Rebuild a database with new rules, rediscovering its schemas.
    pub async fn alter_rule_configuration(
        &self,
        database: &str,
        rule_configs: Vec<RuleConfiguration>,
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.do_alter_rule_configuration(database, &rule_configs)
            .await
            .inspect_err(|e| error!(database, err = %e, "Alter rule configuration failed"))
    }

    async fn do_alter_rule_configuration(
        &self,
        database: &str,
        rule_configs: &[RuleConfiguration],
    ) -> Result<()> {
        let current = self.contexts.load_full();
        let db = find_database(&current, database)?;
        let changed = self
            .factory
            .create_external(
                db.name(),
                db.resource().clone(),
                rule_configs,
                current.metadata().props(),
                current.persist(),
            )
            .await?;
        let (contexts, changed) = self.contexts_with_database(&current, changed)?;
        persist_schema_delta(&current, &changed, &db).await?;

        self.install(contexts);
        close_stale_resource_held_rules(&current, &db);
        info!(database, rules = rule_configs.len(), "Rule configuration altered");

        Ok(())
    }

    /// Replace the pool set of a database, rediscovering its schemas with
    /// the new pools. Pools absent from `data_sources` are retired.
    pub async fn alter_data_source_configuration(
        &self,
        database: &str,
        data_sources: BTreeMap<String, DataSourceProperties>,
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.do_alter_data_sources(database, &data_sources, None)
            .await
            .inspect_err(|e| {
                error!(database, err = %e, "Alter data source configuration failed")
            })
    }

    /// Add or change pools and replace the rules of a database at once.
    /// Pools absent from `data_sources` are kept.
    pub async fn alter_data_source_and_rule_configuration(
        &self,
        database: &str,
        data_sources: BTreeMap<String, DataSourceProperties>,
        rule_configs: Vec<RuleConfiguration>,
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.do_alter_data_sources(database, &data_sources, Some(&rule_configs))
            .await
            .inspect_err(|e| {
                error!(
                    database,
                    err = %e,
                    "Alter data source and rule configuration failed"
                )
            })
    }

    async fn do_alter_data_sources(
        &self,
        database: &str,
        data_sources: &BTreeMap<String, DataSourceProperties>,
        rule_configs: Option<&[RuleConfiguration]>,
    ) -> Result<()> {
        let current = self.contexts.load_full();
        let db = find_database(&current, database)?;
        let switching = match rule_configs {
            None => {
                self.switcher
                    .create_by_alter_data_source_props(db.resource(), data_sources)
                    .await?
            }
            Some(_) => self.switcher.create(db.resource(), data_sources).await?,
        };

        let built = self
            .build_switched(&current, &db, &switching, rule_configs)
            .await;
        let contexts = match built {
            Ok(contexts) => contexts,
            Err(e) => {
                switching.close_new_data_sources().await;
                return Err(e);
            }
        };

        self.install(contexts);
        close_stale_resource_held_rules(&current, &db);
        info!(
            database,
            created = switching.new_units().len(),
            stale = switching.stale_units().len(),
            "Data source configuration altered"
        );
        self.retire(switching).await;

        Ok(())
    }

    /// Candidate snapshot for a database running on the switched pools.
    async fn build_switched(
        &self,
        current: &MetaDataContexts,
        db: &DatabaseRef,
        switching: &SwitchingResource,
        rule_configs: Option<&[RuleConfiguration]>,
    ) -> Result<MetaDataContexts> {
        let resource = switching.switched_resource(db.resource());
        let kept_configs;
        let rule_configs = match rule_configs {
            Some(configs) => configs,
            None => {
                kept_configs = db.rule_metadata().configurations();
                &kept_configs
            }
        };

        let changed = self
            .factory
            .create_external(
                db.name(),
                resource,
                rule_configs,
                current.metadata().props(),
                current.persist(),
            )
            .await?;
        let (contexts, changed) = self.contexts_with_database(current, changed)?;
        persist_schema_delta(current, &changed, db).await?;
        if let Some(data) = current.statistics().database(db.name()) {
            for (schema_name, schema_data) in data.schemas() {
                current
                    .persist()
                    .persist_schema_data(db.name(), schema_name, schema_data)
                    .await?;
            }
        }

        Ok(contexts)
    }

    /// Replace the global rules. An empty list is ignored.
    pub async fn alter_global_rule_configuration(
        &self,
        rule_configs: Vec<RuleConfiguration>,
    ) -> Result<()> {
        if rule_configs.is_empty() {
            return Ok(());
        }

        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        let global_rules = self
            .factory
            .build_global_rules(
                &rule_configs,
                current.metadata().databases(),
                current.metadata().props(),
            )
            .inspect_err(|e| error!(err = %e, "Alter global rule configuration failed"))?;
        self.install(current.with_metadata(current.metadata().with_global_rules(global_rules)));
        for rule in current.metadata().global_rule_metadata().resource_held_rules() {
            if let Err(e) = rule.close_stale_resource(None) {
                warn!(err = %e, "Failed to close resource of global rule");
            }
        }
        info!(rules = rule_configs.len(), "Global rule configuration altered");

        Ok(())
    }

    /// Replace the global properties. Invalid values are rejected.
    pub async fn alter_properties(&self, props: BTreeMap<String, String>) -> Result<()> {
        let props = GlobalProperties::try_new(props)
            .inspect_err(|e| error!(err = %e, "Alter properties failed"))?;

        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        self.install(current.with_metadata(current.metadata().with_props(props)));
        info!("Properties altered");

        Ok(())
    }

    /// Rebuild a database from the configuration in the durable store.
    ///
    /// The properties are replaced by the stored ones. Schemas gone after the
    /// rebuild are dropped from the store as well.
    pub async fn reload_database_metadata(&self, database: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.do_reload_database_metadata(database)
            .await
            .inspect_err(|e| error!(database, err = %e, "Reload database metadata failed"))
    }

    async fn do_reload_database_metadata(&self, database: &str) -> Result<()> {
        let current = self.contexts.load_full();
        let db = find_database(&current, database)?;
        let persist = current.persist();
        let data_sources = persist.load_data_sources(db.name()).await?;
        let switching = self
            .switcher
            .create_by_alter_data_source_props(db.resource(), &data_sources)
            .await?;

        let built = self.build_reloaded(&current, &db, &switching).await;
        let contexts = match built {
            Ok(contexts) => contexts,
            Err(e) => {
                switching.close_new_data_sources().await;
                return Err(e);
            }
        };

        self.install(contexts);
        info!(database, "Database metadata reloaded");
        self.retire(switching).await;

        Ok(())
    }

    async fn build_reloaded(
        &self,
        current: &MetaDataContexts,
        db: &DatabaseRef,
        switching: &SwitchingResource,
    ) -> Result<MetaDataContexts> {
        let persist = current.persist();
        let props = persist.load_props().await?;
        let rule_configs = persist.load_database_rules(db.name()).await?;
        let global_configs = persist.load_global_rules().await?;

        let changed = self
            .factory
            .create_external(
                db.name(),
                switching.switched_resource(db.resource()),
                &rule_configs,
                &props,
                persist,
            )
            .await?;
        let changed: DatabaseRef = Arc::new(changed);
        let databases = current.metadata().databases_with(&changed);
        let global_rules = self
            .factory
            .build_global_rules(&global_configs, &databases, &props)?;

        let delta = DatabaseSchemaDelta::between(changed.schemas(), db.schemas());
        for schema_name in &delta.to_be_dropped_schemas {
            persist.drop_schema(db.name(), schema_name).await?;
        }
        for (schema_name, schema) in changed.schemas() {
            persist
                .compare_and_persist(db.name(), schema_name, schema)
                .await?;
        }

        Ok(current.with_metadata(MetaData::new(databases, global_rules, props)))
    }

    /// Rediscover one schema through one pool. A schema left without tables
    /// is dropped.
    pub async fn reload_schema(
        &self,
        database: &str,
        schema: &str,
        data_source: &str,
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.do_reload_schema(database, schema, data_source)
            .await
            .inspect_err(|e| {
                error!(database, schema, data_source, err = %e, "Reload schema failed")
            })
    }

    async fn do_reload_schema(
        &self,
        database: &str,
        schema: &str,
        data_source: &str,
    ) -> Result<()> {
        let current = self.contexts.load_full();
        let db = find_database(&current, database)?;
        let resource = subset_resource(&db, data_source)?;

        let mut reloaded = self
            .discover_schema(&current, &db, &resource, schema, None)
            .await?
            .unwrap_or_default();
        for view in current.persist().load_views(db.name(), schema).await? {
            reloaded.put_view(view);
        }

        let changed = if reloaded.tables().is_empty() {
            current.persist().drop_schema(db.name(), schema).await?;
            db.without_schema(schema)
        } else {
            current
                .persist()
                .compare_and_persist(db.name(), schema, &reloaded)
                .await?;
            db.with_schema(schema, Arc::new(reloaded))
        };
        let changed = changed.reload_mutable_rules()?;

        self.install(current.with_metadata(current.metadata().with_database(changed)));
        info!(database, schema, data_source, "Schema reloaded");

        Ok(())
    }

    /// Rediscover one table through every pool of the database.
    pub async fn reload_table(&self, database: &str, schema: &str, table: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        let reloaded = match find_database(&current, database) {
            Ok(db) => {
                let resource = db.resource().clone();
                self.do_reload_table(&current, &db, schema, table, &resource)
                    .await
            }
            Err(e) => Err(e),
        };

        reloaded
            .inspect_err(|e| error!(database, schema, table, err = %e, "Reload table failed"))
    }

    /// Rediscover one table through one pool.
    pub async fn reload_table_from_data_source(
        &self,
        database: &str,
        schema: &str,
        data_source: &str,
        table: &str,
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        let reloaded = match find_database(&current, database)
            .and_then(|db| subset_resource(&db, data_source).map(|resource| (db, resource)))
        {
            Ok((db, resource)) => {
                self.do_reload_table(&current, &db, schema, table, &resource)
                    .await
            }
            Err(e) => Err(e),
        };

        reloaded.inspect_err(|e| {
            error!(
                database,
                schema,
                data_source,
                table,
                err = %e,
                "Reload table failed"
            )
        })
    }

    async fn do_reload_table(
        &self,
        current: &MetaDataContexts,
        db: &DatabaseRef,
        schema_name: &str,
        table_name: &str,
        resource: &ResourceMetaData,
    ) -> Result<()> {
        let table_names = [table_name.to_string()];
        let discovered = self
            .discover_schema(current, db, resource, schema_name, Some(&table_names))
            .await?
            .and_then(|schema| schema.table(table_name).cloned());

        let mut schema = match db.schema(schema_name) {
            Some(schema) => Schema::clone(schema),
            None if discovered.is_none() => return Ok(()),
            None => Schema::default(),
        };
        let changed = match discovered {
            Some(table) => {
                schema.put_table(table);
                let changed = db.with_schema(schema_name, Arc::new(schema));
                if knows_table(&changed, schema_name, table_name) {
                    changed
                } else {
                    changed.reload_mutable_rules()?
                }
            }
            None => {
                debug!(
                    database = %db.name(),
                    schema = schema_name,
                    table = table_name,
                    "Reloaded table no longer exists"
                );
                schema.remove_table(table_name);
                db.with_schema(schema_name, Arc::new(schema))
                    .remove_mutable_table(schema_name, table_name)
            }
        };

        if let Some(schema) = changed.schema(schema_name) {
            current
                .persist()
                .compare_and_persist(changed.name(), schema_name, schema)
                .await?;
        }
        self.install(current.with_metadata(current.metadata().with_database(changed)));
        info!(
            database = %db.name(),
            schema = schema_name,
            table = table_name,
            "Table reloaded"
        );

        Ok(())
    }

    async fn discover_schema(
        &self,
        current: &MetaDataContexts,
        db: &Database,
        resource: &ResourceMetaData,
        schema_name: &str,
        table_names: Option<&[String]>,
    ) -> Result<Option<Schema>> {
        let material = DiscoveryMaterial {
            database_name: db.name(),
            protocol_type: db.protocol_type(),
            resource,
            rules: db.rule_metadata().rules(),
            props: current.metadata().props(),
            default_schema_name: schema_name.to_lowercase(),
        };
        let discovered = self
            .factory
            .discovery()
            .discover(&material, table_names)
            .await?;

        Ok(normalize_schema_names(discovered).remove(&schema_name.to_lowercase()))
    }

    pub async fn add_database_data(&self, database: &str) -> Result<()> {
        self.update_statistics(|data| data.add_database(database))
            .await
    }

    pub async fn drop_database_data(&self, database: &str) -> Result<()> {
        self.update_statistics(|data| data.drop_database(database))
            .await
    }

    pub async fn add_schema_data(&self, database: &str, schema: &str) -> Result<()> {
        self.update_statistics(|data| data.add_schema(database, schema))
            .await
    }

    pub async fn drop_schema_data(&self, database: &str, schema: &str) -> Result<()> {
        self.update_statistics(|data| data.drop_schema(database, schema))
            .await
    }

    pub async fn add_table_data(&self, database: &str, schema: &str, table: &str) -> Result<()> {
        self.update_statistics(|data| data.add_table(database, schema, table))
            .await
    }

    pub async fn drop_table_data(&self, database: &str, schema: &str, table: &str) -> Result<()> {
        self.update_statistics(|data| data.drop_table(database, schema, table))
            .await
    }

    /// Put a row into the row cache, typed after the columns of the table.
    /// Nothing happens unless the table exists both in the cache and in the
    /// schema.
    pub async fn alter_row_data(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        payload: RowDataPayload,
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        if current.statistics().table(database, schema, table).is_none() {
            return Ok(());
        }
        let Some(structure) = current
            .metadata()
            .database(database)
            .and_then(|db| db.schema(schema))
            .and_then(|s| s.table(table))
        else {
            return Ok(());
        };

        let row = RowData::convert(structure, &payload).inspect_err(|e| {
            error!(database, schema, table, err = %e, "Alter row data failed")
        })?;
        if let Some(data) = current.statistics().put_row(database, schema, table, row) {
            self.install(current.with_statistics(data));
        }

        Ok(())
    }

    pub async fn delete_row_data(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        unique_key: &str,
    ) -> Result<()> {
        self.update_statistics(|data| data.delete_row(database, schema, table, unique_key))
            .await
    }

    async fn update_statistics<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&StatisticsData) -> Option<StatisticsData>,
    {
        let _guard = self.mutation.lock().await;
        let current = self.contexts.load_full();
        if let Some(data) = update(current.statistics()) {
            self.install(current.with_statistics(data));
        }

        Ok(())
    }

    /// Switch the cluster state by name. Unknown names are ignored.
    pub fn update_cluster_state(&self, status: &str) {
        match status.parse::<ClusterState>() {
            Ok(state) => self.instance.cluster_state().switch_state(state),
            Err(e) => debug!(status, err = %e, "Ignore cluster state"),
        }
    }

    /// Stop the executor and release the durable store. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.executor.close();
        self.contexts.load_full().close().await?;
        info!(instance = self.instance.id(), "Context manager closed");

        Ok(())
    }

    fn install(&self, contexts: MetaDataContexts) {
        self.contexts.store(Arc::new(contexts));
    }

    /// The candidate snapshot with `database` put in, and the global rules
    /// rebuilt against the resulting databases.
    fn contexts_with_database(
        &self,
        current: &MetaDataContexts,
        database: Database,
    ) -> Result<(MetaDataContexts, DatabaseRef)> {
        let database: DatabaseRef = Arc::new(database);
        let metadata = current.metadata();
        let databases = metadata.databases_with(&database);
        let global_rules = self.factory.build_global_rules(
            &metadata.global_rule_metadata().configurations(),
            &databases,
            metadata.props(),
        )?;
        let metadata = MetaData::new(databases, global_rules, metadata.props().clone());

        Ok((current.with_metadata(metadata), database))
    }

    /// Close the pools retired by an installed switch, right away or after
    /// the configured grace period.
    async fn retire(&self, switching: SwitchingResource) {
        match self.stale_resource.close_delay() {
            None => switching.close_stale_data_sources().await,
            Some(delay) => {
                debug!(
                    stale = switching.stale_units().len(),
                    delay_ms = delay.as_millis() as u64,
                    "Defer closing stale data sources"
                );
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    switching.close_stale_data_sources().await;
                });
            }
        }
    }
}

fn find_database(contexts: &MetaDataContexts, database: &str) -> Result<DatabaseRef> {
    contexts
        .metadata()
        .database(database)
        .cloned()
        .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))
}

fn subset_resource(db: &Database, data_source: &str) -> Result<ResourceMetaData> {
    db.resource()
        .subset(data_source)
        .ok_or_else(|| Error::DataSourceNotFound {
            database: db.name().to_string(),
            data_source: data_source.to_string(),
        })
}

fn knows_table(db: &Database, schema: &str, table: &str) -> bool {
    db.rule_metadata()
        .mutable_data_node_rule()
        .map_or(true, |(_, rule)| rule.find_single_table(schema, table).is_some())
}

/// Rules replaced by a rebuild of `db` release what they hold for it.
fn close_stale_resource_held_rules(current: &MetaDataContexts, db: &Database) {
    let global = current.metadata().global_rule_metadata();
    for rule in db
        .rule_metadata()
        .resource_held_rules()
        .chain(global.resource_held_rules())
    {
        if let Err(e) = rule.close_stale_resource(Some(db.name())) {
            warn!(database = %db.name(), err = %e, "Failed to close stale resource of rule");
        }
    }
}

/// Write the schema objects that differ between the rebuilt and the current
/// version of a database, and drop the schemas the rebuild lost.
async fn persist_schema_delta(
    current: &MetaDataContexts,
    changed: &Database,
    previous: &Database,
) -> Result<()> {
    let persist = current.persist();
    let delta = DatabaseSchemaDelta::between(changed.schemas(), previous.schemas());
    for (schema_name, schema) in &delta.to_be_added {
        persist
            .persist_schema(changed.name(), schema_name, schema)
            .await?;
    }
    for (schema_name, schema) in &delta.to_be_deleted {
        persist
            .delete_schema_objects(changed.name(), schema_name, schema)
            .await?;
    }
    for schema_name in &delta.to_be_dropped_schemas {
        persist.drop_schema(changed.name(), schema_name).await?;
    }

    Ok(())
}
