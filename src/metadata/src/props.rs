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

//! Global properties shared by every database of a snapshot.

use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{database_type::DatabaseType, Error, Result};

/// Well-known property keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKey {
    /// Worker threads of the execution engine, `0` means twice the cpu
    /// count.
    KernelExecutorSize,
    /// Frontend protocol of the proxy, empty means derived from the storage.
    ProxyFrontendDatabaseProtocolType,
    SqlShow,
    CheckTableMetadataEnabled,
}

impl PropertyKey {
    pub const ALL: [PropertyKey; 4] = [
        PropertyKey::KernelExecutorSize,
        PropertyKey::ProxyFrontendDatabaseProtocolType,
        PropertyKey::SqlShow,
        PropertyKey::CheckTableMetadataEnabled,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            PropertyKey::KernelExecutorSize => "kernel-executor-size",
            PropertyKey::ProxyFrontendDatabaseProtocolType => {
                "proxy-frontend-database-protocol-type"
            }
            PropertyKey::SqlShow => "sql-show",
            PropertyKey::CheckTableMetadataEnabled => "check-table-metadata-enabled",
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            PropertyKey::KernelExecutorSize => "0",
            PropertyKey::ProxyFrontendDatabaseProtocolType => "",
            PropertyKey::SqlShow | PropertyKey::CheckTableMetadataEnabled => "false",
        }
    }

    fn validate(&self, value: &str) -> std::result::Result<(), String> {
        match self {
            PropertyKey::KernelExecutorSize => {
                value.parse::<usize>().map(|_| ()).map_err(|e| e.to_string())
            }
            PropertyKey::ProxyFrontendDatabaseProtocolType => {
                if value.trim().is_empty() {
                    Ok(())
                } else {
                    value.parse::<DatabaseType>().map(|_| ())
                }
            }
            PropertyKey::SqlShow | PropertyKey::CheckTableMetadataEnabled => {
                value.parse::<bool>().map(|_| ()).map_err(|e| e.to_string())
            }
        }
    }

    fn find(key: &str) -> Option<PropertyKey> {
        PropertyKey::ALL.into_iter().find(|k| k.key() == key)
    }
}

/// Key/value properties, replaced wholesale on alteration.
///
/// Unknown keys are kept as-is so that other components can read them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct GlobalProperties {
    values: BTreeMap<String, String>,
}

impl TryFrom<BTreeMap<String, String>> for GlobalProperties {
    type Error = Error;

    fn try_from(values: BTreeMap<String, String>) -> Result<Self> {
        Self::try_new(values)
    }
}

impl From<GlobalProperties> for BTreeMap<String, String> {
    fn from(props: GlobalProperties) -> Self {
        props.values
    }
}

impl GlobalProperties {
    pub fn try_new(values: BTreeMap<String, String>) -> Result<Self> {
        for (key, value) in &values {
            if let Some(known) = PropertyKey::find(key) {
                known.validate(value).map_err(|msg| Error::InvalidProperty {
                    key: key.clone(),
                    value: value.clone(),
                    msg,
                })?;
            }
        }

        Ok(Self { values })
    }

    pub fn raw(&self, key: PropertyKey) -> &str {
        self.values
            .get(key.key())
            .map(String::as_str)
            .unwrap_or_else(|| key.default_value())
    }

    pub fn value<T>(&self, key: PropertyKey) -> Result<T>
    where
        T: FromStr,
        T::Err: ToString,
    {
        let raw = self.raw(key);
        raw.trim().parse::<T>().map_err(|e| Error::InvalidProperty {
            key: key.key().to_string(),
            value: raw.to_string(),
            msg: e.to_string(),
        })
    }

    pub fn kernel_executor_size(&self) -> Result<usize> {
        self.value(PropertyKey::KernelExecutorSize)
    }

    pub fn frontend_protocol_type(&self) -> Result<Option<DatabaseType>> {
        if self.raw(PropertyKey::ProxyFrontendDatabaseProtocolType)
            .trim()
            .is_empty()
        {
            return Ok(None);
        }

        self.value(PropertyKey::ProxyFrontendDatabaseProtocolType)
            .map(Some)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Overlay `other` on top of these properties.
    pub fn merged(&self, other: &GlobalProperties) -> GlobalProperties {
        let mut values = self.values.clone();
        values.extend(other.values.clone());
        GlobalProperties { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let props = GlobalProperties::default();
        assert_eq!(props.kernel_executor_size().unwrap(), 0);
        assert!(props.frontend_protocol_type().unwrap().is_none());
        assert!(!props.value::<bool>(PropertyKey::SqlShow).unwrap());
    }

    #[test]
    fn test_reject_invalid_value() {
        let values = BTreeMap::from([(
            "kernel-executor-size".to_string(),
            "many".to_string(),
        )]);
        let err = GlobalProperties::try_new(values).unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { .. }));

        let values = BTreeMap::from([("sql-show".to_string(), "yes".to_string())]);
        assert!(GlobalProperties::try_new(values).is_err());
    }

    #[test]
    fn test_keep_unknown_keys() {
        let values = BTreeMap::from([
            ("kernel-executor-size".to_string(), "8".to_string()),
            ("proxy-backend-query-fetch-size".to_string(), "-1".to_string()),
        ]);
        let props = GlobalProperties::try_new(values).unwrap();
        assert_eq!(props.kernel_executor_size().unwrap(), 8);
        assert_eq!(props.get("proxy-backend-query-fetch-size"), Some("-1"));
    }

    #[test]
    fn test_deserialize_rejects_invalid_value() {
        let res: std::result::Result<GlobalProperties, _> =
            toml::from_str(r#""check-table-metadata-enabled" = "maybe""#);
        assert!(res.is_err());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let props: GlobalProperties = toml::from_str(
            r#"
"kernel-executor-size" = "4"
"proxy-frontend-database-protocol-type" = "PostgreSQL"
"#,
        )
        .unwrap();
        assert_eq!(props.kernel_executor_size().unwrap(), 4);
        assert_eq!(
            props.frontend_protocol_type().unwrap(),
            Some(DatabaseType::PostgreSQL)
        );
    }
}
