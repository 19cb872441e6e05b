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

//! Structural description of tables and views.
//!
//! Tables and views are value objects: reloading a table replaces it
//! wholesale, it is never patched column by column.

mod diff;

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

pub use self::diff::{DatabaseSchemaDelta, SchemaDelta};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Char,
    Varchar,
    Text,
    Date,
    Time,
    Timestamp,
    Binary,
    Json,
}

impl ColumnType {
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, ColumnType::Float | ColumnType::Double)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub unsigned: bool,
}

fn default_visible() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            generated: false,
            case_sensitive: false,
            visible: true,
            unsigned: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub referenced_table_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_indexes(mut self, indexes: Vec<Index>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub view_definition: String,
}

impl View {
    pub fn new(name: impl Into<String>, view_definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            view_definition: view_definition.into(),
        }
    }
}

pub type TableRef = Arc<Table>;
pub type ViewRef = Arc<View>;

/// Tables and views of one schema, keyed by lower-cased name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    tables: HashMap<String, TableRef>,
    views: HashMap<String, ViewRef>,
}

pub type SchemaRef = Arc<Schema>;

impl Schema {
    pub fn new(
        tables: impl IntoIterator<Item = Table>,
        views: impl IntoIterator<Item = View>,
    ) -> Self {
        let mut schema = Schema::default();
        for table in tables {
            schema.put_table(table);
        }
        for view in views {
            schema.put_view(view);
        }

        schema
    }

    pub fn tables(&self) -> &HashMap<String, TableRef> {
        &self.tables
    }

    pub fn views(&self) -> &HashMap<String, ViewRef> {
        &self.views
    }

    pub fn table(&self, name: &str) -> Option<&TableRef> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn view(&self, name: &str) -> Option<&ViewRef> {
        self.views.get(&name.to_lowercase())
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    pub fn contains_view(&self, name: &str) -> bool {
        self.views.contains_key(&name.to_lowercase())
    }

    /// Put or replace a table.
    pub fn put_table(&mut self, table: impl Into<TableRef>) {
        let table = table.into();
        self.tables.insert(table.name.to_lowercase(), table);
    }

    pub fn remove_table(&mut self, name: &str) -> Option<TableRef> {
        self.tables.remove(&name.to_lowercase())
    }

    pub fn put_view(&mut self, view: impl Into<ViewRef>) {
        let view = view.into();
        self.views.insert(view.name.to_lowercase(), view);
    }

    pub fn remove_view(&mut self, name: &str) -> Option<ViewRef> {
        self.views.remove(&name.to_lowercase())
    }

    /// Neither tables nor views.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut schema = Schema::default();
        schema.put_table(Table::new(
            "T_Order",
            vec![Column::new("order_id", ColumnType::BigInt).primary_key()],
        ));
        schema.put_view(View::new("V_Order", "SELECT * FROM t_order"));

        assert!(schema.contains_table("t_order"));
        assert!(schema.contains_table("T_ORDER"));
        assert!(schema.contains_view("v_order"));
        assert_eq!(
            schema
                .table("t_order")
                .unwrap()
                .primary_key_columns()
                .count(),
            1
        );

        assert!(schema.remove_table("t_ORDER").is_some());
        assert!(!schema.contains_table("t_order"));
        assert!(!schema.is_empty());
    }

    #[test]
    fn test_put_replaces_table() {
        let mut schema = Schema::new(
            [Table::new("t_user", vec![Column::new("id", ColumnType::Integer)])],
            [],
        );
        schema.put_table(Table::new(
            "t_user",
            vec![
                Column::new("id", ColumnType::Integer),
                Column::new("name", ColumnType::Varchar),
            ],
        ));

        assert_eq!(schema.tables().len(), 1);
        assert!(schema.table("t_user").unwrap().column("NAME").is_some());
    }
}
