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

//! Database dialects, used both as the frontend protocol tag of a logical
//! database and as the storage type of each pool.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{props::GlobalProperties, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    #[default]
    MySQL,
    PostgreSQL,
    #[serde(rename = "openGauss")]
    OpenGauss,
    Oracle,
    SQLServer,
    H2,
    SQL92,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 7] = [
        DatabaseType::MySQL,
        DatabaseType::PostgreSQL,
        DatabaseType::OpenGauss,
        DatabaseType::Oracle,
        DatabaseType::SQLServer,
        DatabaseType::H2,
        DatabaseType::SQL92,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatabaseType::MySQL => "MySQL",
            DatabaseType::PostgreSQL => "PostgreSQL",
            DatabaseType::OpenGauss => "openGauss",
            DatabaseType::Oracle => "Oracle",
            DatabaseType::SQLServer => "SQLServer",
            DatabaseType::H2 => "H2",
            DatabaseType::SQL92 => "SQL92",
        }
    }

    /// Dialects with a real schema layer expose a fixed default schema, the
    /// others treat the database itself as the only schema.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            DatabaseType::PostgreSQL | DatabaseType::OpenGauss => Some("public"),
            _ => None,
        }
    }

    pub fn default_schema_name(&self, database_name: &str) -> String {
        self.default_schema()
            .map(str::to_string)
            .unwrap_or_else(|| database_name.to_lowercase())
    }

    /// Resolve the protocol type of a database.
    ///
    /// The configured frontend protocol wins, then the storage type of the
    /// pool whose name sorts first, then MySQL.
    pub fn protocol_type(
        storage_types: &BTreeMap<String, DatabaseType>,
        props: &GlobalProperties,
    ) -> Result<DatabaseType> {
        if let Some(configured) = props.frontend_protocol_type()? {
            return Ok(configured);
        }

        Ok(storage_types.values().next().copied().unwrap_or_default())
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        DatabaseType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported database type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_database_type() {
        assert_eq!(
            "postgresql".parse::<DatabaseType>().unwrap(),
            DatabaseType::PostgreSQL
        );
        assert_eq!(
            "openGauss".parse::<DatabaseType>().unwrap(),
            DatabaseType::OpenGauss
        );
        assert!("db2".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_default_schema_name() {
        assert_eq!(DatabaseType::MySQL.default_schema_name("Sharding_DB"), "sharding_db");
        assert_eq!(DatabaseType::PostgreSQL.default_schema_name("sharding_db"), "public");
    }

    #[test]
    fn test_protocol_type() {
        let props = GlobalProperties::default();
        let mut storage_types = BTreeMap::new();
        assert_eq!(
            DatabaseType::protocol_type(&storage_types, &props).unwrap(),
            DatabaseType::MySQL
        );

        storage_types.insert("ds_0".to_string(), DatabaseType::PostgreSQL);
        assert_eq!(
            DatabaseType::protocol_type(&storage_types, &props).unwrap(),
            DatabaseType::PostgreSQL
        );

        storage_types.insert("ds_z".to_string(), DatabaseType::OpenGauss);
        storage_types.insert("backup".to_string(), DatabaseType::MySQL);
        assert_eq!(
            DatabaseType::protocol_type(&storage_types, &props).unwrap(),
            DatabaseType::MySQL
        );

        let props = GlobalProperties::try_new(
            [(
                "proxy-frontend-database-protocol-type".to_string(),
                "openGauss".to_string(),
            )]
            .into(),
        )
        .unwrap();
        assert_eq!(
            DatabaseType::protocol_type(&storage_types, &props).unwrap(),
            DatabaseType::OpenGauss
        );
    }
}
