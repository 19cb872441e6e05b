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

//! A logical database: pools, rules and schemas under one name.

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    database_type::DatabaseType,
    resource::ResourceMetaData,
    rule::{RuleMetaData, RuleReloadContext},
    schema::{Schema, SchemaRef},
    Result,
};

#[derive(Clone, Debug)]
pub struct Database {
    name: String,
    protocol_type: DatabaseType,
    resource: ResourceMetaData,
    rule_metadata: RuleMetaData,
    /// Keyed by lower-cased schema name.
    schemas: HashMap<String, SchemaRef>,
}

pub type DatabaseRef = Arc<Database>;

impl Database {
    pub fn new(
        name: &str,
        protocol_type: DatabaseType,
        resource: ResourceMetaData,
        rule_metadata: RuleMetaData,
        schemas: HashMap<String, SchemaRef>,
    ) -> Self {
        Self {
            name: name.to_lowercase(),
            protocol_type,
            resource,
            rule_metadata,
            schemas: schemas
                .into_iter()
                .map(|(name, schema)| (name.to_lowercase(), schema))
                .collect(),
        }
    }

    /// A database without pools or rules, holding only its default schema.
    pub fn empty(name: &str, protocol_type: DatabaseType) -> Self {
        let default_schema = protocol_type.default_schema_name(name);
        Self::new(
            name,
            protocol_type,
            ResourceMetaData::default(),
            RuleMetaData::default(),
            HashMap::from([(default_schema, Arc::new(Schema::default()))]),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol_type(&self) -> DatabaseType {
        self.protocol_type
    }

    pub fn resource(&self) -> &ResourceMetaData {
        &self.resource
    }

    pub fn rule_metadata(&self) -> &RuleMetaData {
        &self.rule_metadata
    }

    pub fn schemas(&self) -> &HashMap<String, SchemaRef> {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaRef> {
        self.schemas.get(&name.to_lowercase())
    }

    pub fn contains_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(&name.to_lowercase())
    }

    pub fn with_schema(&self, name: &str, schema: SchemaRef) -> Database {
        let mut database = self.clone();
        database.schemas.insert(name.to_lowercase(), schema);
        database
    }

    pub fn without_schema(&self, name: &str) -> Database {
        let mut database = self.clone();
        database.schemas.remove(&name.to_lowercase());
        database
    }

    pub fn with_resource(&self, resource: ResourceMetaData) -> Database {
        Database {
            resource,
            ..self.clone()
        }
    }

    pub fn with_rule_metadata(&self, rule_metadata: RuleMetaData) -> Database {
        Database {
            rule_metadata,
            ..self.clone()
        }
    }

    /// Rebuild the table cache of the mutable data node rule, if any, so
    /// that it agrees with the current schemas.
    pub fn reload_mutable_rules(&self) -> Result<Database> {
        let Some((idx, rule)) = self.rule_metadata.mutable_data_node_rule() else {
            return Ok(self.clone());
        };

        let reloaded = rule.reload(&RuleReloadContext {
            database_name: &self.name,
            resource: &self.resource,
            schemas: &self.schemas,
            rules: self.rule_metadata.rules(),
        })?;
        debug!(database = %self.name, "Mutable data node rule reloaded");

        Ok(self.with_rule_metadata(self.rule_metadata.replaced(idx, reloaded)))
    }

    /// Forget a table in the mutable data node rule, if any.
    pub fn remove_mutable_table(&self, schema_name: &str, table_name: &str) -> Database {
        match self.rule_metadata.mutable_data_node_rule() {
            Some((idx, rule)) => {
                let removed = rule.remove(schema_name, table_name);
                self.with_rule_metadata(self.rule_metadata.replaced(idx, removed))
            }
            None => self.clone(),
        }
    }
}
