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

//! Row-level cache of materialized tables, shaped like the schema but kept
//! apart from it.
//!
//! Every mutation checks existence level by level (database, schema,
//! table) and reports a no-op as `None`, leaving the receiver unchanged.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    schema::{ColumnType, Table},
    Error, Result,
};

#[derive(Clone, Debug, PartialEq)]
pub enum RowValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RowValue {
    fn parse(data_type: ColumnType, raw: &str) -> Option<RowValue> {
        let value = if data_type == ColumnType::Boolean {
            match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => RowValue::Bool(true),
                "false" | "0" => RowValue::Bool(false),
                _ => return None,
            }
        } else if data_type.is_integral() {
            RowValue::Int(raw.parse().ok()?)
        } else if data_type.is_floating() {
            RowValue::Float(raw.parse().ok()?)
        } else {
            RowValue::Text(raw.to_string())
        };

        Some(value)
    }
}

/// Row as carried by change events: values rendered as text, in column order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDataPayload {
    pub unique_key: String,
    #[serde(default)]
    pub values: Vec<Option<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RowData {
    pub unique_key: String,
    pub values: Vec<RowValue>,
}

impl RowData {
    /// Type the payload values with the columns of `table`.
    pub fn convert(table: &Table, payload: &RowDataPayload) -> Result<RowData> {
        if payload.values.len() > table.columns.len() {
            return Err(anyhow::anyhow!(
                "row {} of table {} has {} values but only {} columns",
                payload.unique_key,
                table.name,
                payload.values.len(),
                table.columns.len()
            )
            .into());
        }

        let values = table
            .columns
            .iter()
            .zip(&payload.values)
            .map(|(column, raw)| match raw {
                None => Ok(RowValue::Null),
                Some(raw) => {
                    RowValue::parse(column.data_type, raw).ok_or_else(|| Error::ConvertRowValue {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        value: raw.clone(),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RowData {
            unique_key: payload.unique_key.clone(),
            values,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableData {
    name: String,
    rows: Vec<RowData>,
}

impl TableData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[RowData] {
        &self.rows
    }

    pub fn row(&self, unique_key: &str) -> Option<&RowData> {
        self.rows.iter().find(|row| row.unique_key == unique_key)
    }

    /// Put a row, replacing the one with the same unique key.
    fn with_row(&self, row: RowData) -> TableData {
        let mut table = self.clone();
        match table
            .rows
            .iter_mut()
            .find(|r| r.unique_key == row.unique_key)
        {
            Some(existing) => *existing = row,
            None => table.rows.push(row),
        }
        table
    }

    fn without_row(&self, unique_key: &str) -> TableData {
        let mut table = self.clone();
        table.rows.retain(|row| row.unique_key != unique_key);
        table
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaData {
    tables: HashMap<String, Arc<TableData>>,
}

impl SchemaData {
    pub fn tables(&self) -> &HashMap<String, Arc<TableData>> {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableData>> {
        self.tables.get(&name.to_lowercase())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatabaseData {
    schemas: HashMap<String, Arc<SchemaData>>,
}

impl DatabaseData {
    pub fn schemas(&self) -> &HashMap<String, Arc<SchemaData>> {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<&Arc<SchemaData>> {
        self.schemas.get(&name.to_lowercase())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatisticsData {
    databases: HashMap<String, Arc<DatabaseData>>,
}

impl StatisticsData {
    pub fn databases(&self) -> &HashMap<String, Arc<DatabaseData>> {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&Arc<DatabaseData>> {
        self.databases.get(&name.to_lowercase())
    }

    pub fn table(&self, database: &str, schema: &str, table: &str) -> Option<&Arc<TableData>> {
        self.database(database)?.schema(schema)?.table(table)
    }

    pub fn add_database(&self, database: &str) -> Option<StatisticsData> {
        let key = database.to_lowercase();
        if self.databases.contains_key(&key) {
            return None;
        }

        let mut data = self.clone();
        data.databases.insert(key, Arc::default());
        Some(data)
    }

    pub fn drop_database(&self, database: &str) -> Option<StatisticsData> {
        let key = database.to_lowercase();
        if !self.databases.contains_key(&key) {
            return None;
        }

        let mut data = self.clone();
        data.databases.remove(&key);
        Some(data)
    }

    pub fn add_schema(&self, database: &str, schema: &str) -> Option<StatisticsData> {
        self.update_database(database, |db| {
            let key = schema.to_lowercase();
            if db.schemas.contains_key(&key) {
                return None;
            }
            let mut db = db.clone();
            db.schemas.insert(key, Arc::default());
            Some(db)
        })
    }

    pub fn drop_schema(&self, database: &str, schema: &str) -> Option<StatisticsData> {
        self.update_database(database, |db| {
            let key = schema.to_lowercase();
            if !db.schemas.contains_key(&key) {
                return None;
            }
            let mut db = db.clone();
            db.schemas.remove(&key);
            Some(db)
        })
    }

    pub fn add_table(&self, database: &str, schema: &str, table: &str) -> Option<StatisticsData> {
        self.update_schema(database, schema, |schema| {
            let key = table.to_lowercase();
            if schema.tables.contains_key(&key) {
                return None;
            }
            let mut schema = schema.clone();
            schema.tables.insert(key, Arc::new(TableData::new(table)));
            Some(schema)
        })
    }

    pub fn drop_table(&self, database: &str, schema: &str, table: &str) -> Option<StatisticsData> {
        self.update_schema(database, schema, |schema| {
            let key = table.to_lowercase();
            if !schema.tables.contains_key(&key) {
                return None;
            }
            let mut schema = schema.clone();
            schema.tables.remove(&key);
            Some(schema)
        })
    }

    /// Put the whole data of one schema, creating its database if needed.
    pub fn with_schema_data(
        &self,
        database: &str,
        schema: &str,
        data: SchemaData,
    ) -> StatisticsData {
        let mut statistics = self.clone();
        let db = statistics
            .databases
            .entry(database.to_lowercase())
            .or_default();
        Arc::make_mut(db)
            .schemas
            .insert(schema.to_lowercase(), Arc::new(data));
        statistics
    }

    pub fn put_row(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        row: RowData,
    ) -> Option<StatisticsData> {
        self.update_table(database, schema, table, |table| Some(table.with_row(row)))
    }

    pub fn delete_row(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        unique_key: &str,
    ) -> Option<StatisticsData> {
        self.update_table(database, schema, table, |table| {
            table.row(unique_key)?;
            Some(table.without_row(unique_key))
        })
    }

    fn update_database<F>(&self, database: &str, f: F) -> Option<StatisticsData>
    where
        F: FnOnce(&DatabaseData) -> Option<DatabaseData>,
    {
        let key = database.to_lowercase();
        let updated = f(self.databases.get(&key)?)?;

        let mut data = self.clone();
        data.databases.insert(key, Arc::new(updated));
        Some(data)
    }

    fn update_schema<F>(&self, database: &str, schema: &str, f: F) -> Option<StatisticsData>
    where
        F: FnOnce(&SchemaData) -> Option<SchemaData>,
    {
        self.update_database(database, |db| {
            let key = schema.to_lowercase();
            let updated = f(db.schemas.get(&key)?)?;
            let mut db = db.clone();
            db.schemas.insert(key, Arc::new(updated));
            Some(db)
        })
    }

    fn update_table<F>(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        f: F,
    ) -> Option<StatisticsData>
    where
        F: FnOnce(&TableData) -> Option<TableData>,
    {
        self.update_schema(database, schema, |schema| {
            let key = table.to_lowercase();
            let updated = f(schema.tables.get(&key)?)?;
            let mut schema = schema.clone();
            schema.tables.insert(key, Arc::new(updated));
            Some(schema)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn orders() -> Table {
        Table::new(
            "t_order",
            vec![
                Column::new("order_id", ColumnType::BigInt).primary_key(),
                Column::new("paid", ColumnType::Boolean),
                Column::new("amount", ColumnType::Double),
                Column::new("remark", ColumnType::Varchar),
            ],
        )
    }

    fn payload(key: &str, values: &[Option<&str>]) -> RowDataPayload {
        RowDataPayload {
            unique_key: key.to_string(),
            values: values.iter().map(|v| v.map(str::to_string)).collect(),
        }
    }

    #[test]
    fn test_convert_row() {
        let row = RowData::convert(
            &orders(),
            &payload("1", &[Some("1"), Some("TRUE"), Some("9.5"), None]),
        )
        .unwrap();
        assert_eq!(
            row.values,
            vec![
                RowValue::Int(1),
                RowValue::Bool(true),
                RowValue::Float(9.5),
                RowValue::Null
            ]
        );

        let err = RowData::convert(&orders(), &payload("1", &[Some("one")])).unwrap_err();
        assert!(matches!(err, Error::ConvertRowValue { column, .. } if column == "order_id"));

        let too_wide = vec![Some("1"); 5];
        assert!(RowData::convert(&orders(), &payload("1", &too_wide)).is_err());
    }

    #[test]
    fn test_guards_at_every_level() {
        let data = StatisticsData::default();
        assert!(data.add_schema("db1", "public").is_none());
        assert!(data.drop_database("db1").is_none());

        let data = data.add_database("DB1").unwrap();
        assert!(data.add_database("db1").is_none());
        assert!(data.add_table("db1", "public", "t_order").is_none());

        let data = data.add_schema("db1", "public").unwrap();
        let data = data.add_table("db1", "public", "T_Order").unwrap();
        assert!(data.add_table("db1", "public", "t_order").is_none());
        assert!(data.table("db1", "public", "t_order").is_some());

        let dropped = data.drop_schema("db1", "public").unwrap();
        assert!(dropped.table("db1", "public", "t_order").is_none());
        assert!(data.table("db1", "public", "t_order").is_some());
    }

    #[test]
    fn test_put_and_delete_row() {
        let data = StatisticsData::default()
            .add_database("db1")
            .and_then(|d| d.add_schema("db1", "public"))
            .and_then(|d| d.add_table("db1", "public", "t_order"))
            .unwrap();
        let row = |amount: &str| {
            RowData::convert(&orders(), &payload("1", &[Some("1"), None, Some(amount)])).unwrap()
        };

        let data = data.put_row("db1", "public", "t_order", row("1.0")).unwrap();
        let data = data.put_row("db1", "public", "t_order", row("2.0")).unwrap();
        let table = data.table("db1", "public", "t_order").unwrap();
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.row("1").unwrap().values[2], RowValue::Float(2.0));

        assert!(data.delete_row("db1", "public", "t_order", "2").is_none());
        assert!(data.put_row("db1", "public", "t_user", row("1.0")).is_none());
        let data = data.delete_row("db1", "public", "t_order", "1").unwrap();
        assert!(data.table("db1", "public", "t_order").unwrap().rows().is_empty());
    }

    #[test]
    fn test_with_schema_data() {
        let data = StatisticsData::default()
            .add_database("db1")
            .and_then(|d| d.add_schema("db1", "public"))
            .and_then(|d| d.add_table("db1", "public", "t_order"))
            .unwrap();
        let row = RowData::convert(&orders(), &payload("1", &[Some("1"), None, None])).unwrap();
        let data = data.put_row("db1", "public", "t_order", row).unwrap();
        let schema_data = data.database("db1").unwrap().schema("public").unwrap();
        let schema_data = SchemaData::clone(schema_data);

        let restored = StatisticsData::default().with_schema_data("DB1", "Public", schema_data);
        assert_eq!(restored, data);

        let replaced = restored.with_schema_data("db1", "public", SchemaData::default());
        assert!(replaced.table("db1", "public", "t_order").is_none());
        assert!(restored.table("db1", "public", "t_order").unwrap().row("1").is_some());
    }
}
