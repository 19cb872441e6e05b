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

use std::time::Duration;

use metadata::props::GlobalProperties;
use serde::{Deserialize, Serialize};

use crate::{instance::ModeType, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mode: ModeConfig,
    pub stale_resource: StaleResourceConfig,
    /// Initial global properties, overridden by the durable store.
    pub props: GlobalProperties,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| anyhow::anyhow!("invalid config: {e}").into())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModeConfig {
    #[serde(rename = "type")]
    pub mode_type: ModeType,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaleResourceConfig {
    /// Delay between installing a new snapshot and closing the pools it
    /// made stale. Zero closes them right after the cutover.
    pub close_delay_ms: u64,
}

impl StaleResourceConfig {
    pub fn close_delay(&self) -> Option<Duration> {
        (self.close_delay_ms > 0).then(|| Duration::from_millis(self.close_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use metadata::props::PropertyKey;

    use super::*;

    #[test]
    fn test_parse_config() {
        let config = Config::from_toml(
            r#"
[mode]
type = "cluster"

[stale_resource]
close_delay_ms = 3000

[props]
kernel-executor-size = "4"
"#,
        )
        .unwrap();

        assert_eq!(config.mode.mode_type, ModeType::Cluster);
        assert_eq!(config.stale_resource.close_delay(), Some(Duration::from_secs(3)));
        assert_eq!(config.props.raw(PropertyKey::KernelExecutorSize), "4");
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.mode.mode_type, ModeType::Standalone);
        assert!(config.stale_resource.close_delay().is_none());
    }

    #[test]
    fn test_reject_unknown_fields() {
        assert!(Config::from_toml("[stale_resource]\ndelay = 1").is_err());
        assert!(Config::from_toml("[props]\nkernel-executor-size = \"many\"").is_err());
    }
}
