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

//! Root of the metadata: every logical database plus the global slice.

use std::collections::HashMap;

use crate::{
    database::DatabaseRef,
    props::GlobalProperties,
    rule::RuleMetaData,
};

#[derive(Clone, Debug, Default)]
pub struct MetaData {
    /// Keyed by lower-cased database name.
    databases: HashMap<String, DatabaseRef>,
    global_rule_metadata: RuleMetaData,
    props: GlobalProperties,
}

impl MetaData {
    pub fn new(
        databases: HashMap<String, DatabaseRef>,
        global_rule_metadata: RuleMetaData,
        props: GlobalProperties,
    ) -> Self {
        Self {
            databases: databases
                .into_iter()
                .map(|(name, database)| (name.to_lowercase(), database))
                .collect(),
            global_rule_metadata,
            props,
        }
    }

    pub fn databases(&self) -> &HashMap<String, DatabaseRef> {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseRef> {
        self.databases.get(&name.to_lowercase())
    }

    pub fn contains_database(&self, name: &str) -> bool {
        self.databases.contains_key(&name.to_lowercase())
    }

    pub fn global_rule_metadata(&self) -> &RuleMetaData {
        &self.global_rule_metadata
    }

    pub fn props(&self) -> &GlobalProperties {
        &self.props
    }

    pub fn with_database(&self, database: impl Into<DatabaseRef>) -> MetaData {
        let database: DatabaseRef = database.into();
        let mut metadata = self.clone();
        metadata
            .databases
            .insert(database.name().to_string(), database);
        metadata
    }

    pub fn without_database(&self, name: &str) -> MetaData {
        let mut metadata = self.clone();
        metadata.databases.remove(&name.to_lowercase());
        metadata
    }

    /// Databases as they would be after putting `database`, without
    /// building a whole new root.
    pub fn databases_with(&self, database: &DatabaseRef) -> HashMap<String, DatabaseRef> {
        let mut databases = self.databases.clone();
        databases.insert(database.name().to_string(), database.clone());
        databases
    }

    pub fn with_global_rules(&self, global_rule_metadata: RuleMetaData) -> MetaData {
        MetaData {
            global_rule_metadata,
            ..self.clone()
        }
    }

    pub fn with_props(&self, props: GlobalProperties) -> MetaData {
        MetaData {
            props,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{database::Database, database_type::DatabaseType};

    #[test]
    fn test_database_lookup_is_case_insensitive() {
        let metadata = MetaData::default()
            .with_database(Database::empty("Sharding_DB", DatabaseType::MySQL));
        assert!(metadata.contains_database("SHARDING_DB"));
        assert_eq!(metadata.database("sharding_db").unwrap().name(), "sharding_db");

        let dropped = metadata.without_database("Sharding_db");
        assert!(dropped.databases().is_empty());
        // The original root is left untouched.
        assert_eq!(metadata.databases().len(), 1);
    }

    #[test]
    fn test_databases_with() {
        let metadata =
            MetaData::default().with_database(Database::empty("db1", DatabaseType::MySQL));
        let db2: DatabaseRef = Arc::new(Database::empty("db2", DatabaseType::H2));
        let databases = metadata.databases_with(&db2);
        assert_eq!(databases.len(), 2);
        assert_eq!(metadata.databases().len(), 1);
    }
}
