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

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use metadata::{
    database_type::DatabaseType, props::GlobalProperties, resource::ResourceMetaData,
    rule::RuleRef, schema::Schema,
};

use crate::Result;

/// What discovery needs to introspect the storage engines of one database.
pub struct DiscoveryMaterial<'a> {
    pub database_name: &'a str,
    pub protocol_type: DatabaseType,
    /// Pools to introspect, possibly a subset of the database's pools.
    pub resource: &'a ResourceMetaData,
    pub rules: &'a [RuleRef],
    pub props: &'a GlobalProperties,
    /// Schema that un-schemaed storage engines report their tables under.
    pub default_schema_name: String,
}

/// Live introspection of storage engines.
#[async_trait]
pub trait SchemaDiscovery: Send + Sync {
    /// Discover schemas keyed by schema name. Only the given tables are
    /// introspected when `table_names` is set.
    async fn discover(
        &self,
        material: &DiscoveryMaterial<'_>,
        table_names: Option<&[String]>,
    ) -> Result<HashMap<String, Schema>>;
}

pub type SchemaDiscoveryRef = Arc<dyn SchemaDiscovery>;

/// Lower-case the schema names reported by discovery, merging the schemas
/// whose names only differ in case.
pub(crate) fn normalize_schema_names(
    discovered: HashMap<String, Schema>,
) -> HashMap<String, Schema> {
    let mut schemas: HashMap<String, Schema> = HashMap::with_capacity(discovered.len());
    for (name, schema) in discovered {
        let merged = schemas.entry(name.to_lowercase()).or_default();
        for table in schema.tables().values() {
            merged.put_table(table.clone());
        }
        for view in schema.views().values() {
            merged.put_view(view.clone());
        }
    }
    schemas
}

#[cfg(test)]
mod tests {
    use metadata::schema::{Column, ColumnType, Table};
    use test_log::test;

    use super::*;

    fn table(name: &str) -> Table {
        Table::new(name, vec![Column::new("id", ColumnType::BigInt).primary_key()])
    }

    #[test]
    fn test_normalize_merges_schemas_differing_in_case() {
        let mut discovered = HashMap::new();
        discovered.insert("FOO_DB".to_string(), Schema::new([table("t_order")], []));
        discovered.insert("foo_db".to_string(), Schema::new([table("t_user")], []));
        discovered.insert("Bar".to_string(), Schema::default());

        let schemas = normalize_schema_names(discovered);

        let mut names: Vec<_> = schemas.keys().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["bar", "foo_db"]);
        let foo = &schemas["foo_db"];
        assert!(foo.contains_table("t_order"));
        assert!(foo.contains_table("t_user"));
        assert!(schemas["bar"].is_empty());
    }
}
