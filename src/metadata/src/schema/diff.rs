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

//! Compute what changed between two versions of a schema, so that the
//! durable store only has to touch the differing tables and views.

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::Arc,
};

use super::{Schema, SchemaRef};

/// Delta between a proposed and the current version of one schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaDelta {
    /// Tables and views absent from, or different in, the current schema.
    pub to_be_added: Schema,
    /// Tables and views absent from the proposed schema.
    pub to_be_deleted: Schema,
}

impl SchemaDelta {
    pub fn between(proposed: &Schema, current: &Schema) -> SchemaDelta {
        let mut to_be_added = Schema::default();
        for table in changed_entries(&proposed.tables, &current.tables) {
            to_be_added.put_table(table);
        }
        for view in changed_entries(&proposed.views, &current.views) {
            to_be_added.put_view(view);
        }

        let mut to_be_deleted = Schema::default();
        for table in missing_entries(&proposed.tables, &current.tables) {
            to_be_deleted.put_table(table);
        }
        for view in missing_entries(&proposed.views, &current.views) {
            to_be_deleted.put_view(view);
        }

        SchemaDelta {
            to_be_added,
            to_be_deleted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_be_added.is_empty() && self.to_be_deleted.is_empty()
    }
}

/// Delta between the schema maps of two versions of one database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseSchemaDelta {
    /// Per schema, the tables and views to write. Schemas missing from the
    /// current version show up here with all their objects.
    pub to_be_added: BTreeMap<String, Schema>,
    /// Per schema present in both versions, the objects to delete.
    pub to_be_deleted: BTreeMap<String, Schema>,
    /// Schemas present in the current version only.
    pub to_be_dropped_schemas: Vec<String>,
}

impl DatabaseSchemaDelta {
    pub fn between(
        proposed: &HashMap<String, SchemaRef>,
        current: &HashMap<String, SchemaRef>,
    ) -> DatabaseSchemaDelta {
        let empty = Schema::default();
        let mut delta = DatabaseSchemaDelta::default();
        for (name, proposed_schema) in proposed {
            let current_schema = current.get(name).map(Arc::as_ref).unwrap_or(&empty);
            let SchemaDelta {
                to_be_added,
                to_be_deleted,
            } = SchemaDelta::between(proposed_schema, current_schema);
            if !to_be_added.is_empty() {
                delta.to_be_added.insert(name.clone(), to_be_added);
            }
            if !to_be_deleted.is_empty() {
                delta.to_be_deleted.insert(name.clone(), to_be_deleted);
            }
        }

        delta.to_be_dropped_schemas = current
            .keys()
            .filter(|name| !proposed.contains_key(*name))
            .cloned()
            .collect();
        delta.to_be_dropped_schemas.sort();

        delta
    }

    pub fn is_empty(&self) -> bool {
        self.to_be_added.is_empty()
            && self.to_be_deleted.is_empty()
            && self.to_be_dropped_schemas.is_empty()
    }
}

fn changed_entries<'a, K, V>(
    proposed: &'a HashMap<K, Arc<V>>,
    current: &'a HashMap<K, Arc<V>>,
) -> impl Iterator<Item = Arc<V>> + 'a
where
    K: Eq + Hash,
    V: PartialEq,
{
    proposed
        .iter()
        .filter(move |(name, value)| current.get(*name) != Some(*value))
        .map(|(_, value)| value.clone())
}

fn missing_entries<'a, K, V>(
    proposed: &'a HashMap<K, Arc<V>>,
    current: &'a HashMap<K, Arc<V>>,
) -> impl Iterator<Item = Arc<V>> + 'a
where
    K: Eq + Hash,
{
    current
        .iter()
        .filter(move |(name, _)| !proposed.contains_key(*name))
        .map(|(_, value)| value.clone())
}
