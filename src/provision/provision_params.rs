/*
 Prod
 Copyright 2021 Peter Pearson.
 Licensed under the Apache License, Version 2.0 (the "License");
 You may not use this file except in compliance with the License.
 You may obtain a copy of the License at
 http://www.apache.org/licenses/LICENSE-2.0
 Unless required by applicable law or agreed to in writing, software
 distributed under the License is distributed on an "AS IS" BASIS,
 WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 See the License for the specific language governing permissions and
 limitations under the License.
 ---------
*/

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::warn;

use super::provision_common::{ProvisionError, Result};
use super::region::Region;

pub const ENV_USERNAME: &str = "RACKSPACE_USERNAME";
pub const ENV_API_KEY: &str = "RACKSPACE_API_KEY";
pub const ENV_REGION: &str = "RACKSPACE_REGION";

/// Account details needed to talk to Rackspace, plus any other `key: value`
/// pairs found in a config file (e.g. node name, image, flavor).
#[derive(Clone, Debug)]
pub struct RackspaceConfig {
    pub username:   String,
    pub api_key:    String,
    pub region:     Region,
    pub values:     BTreeMap<String, String>
}

impl fmt::Display for RackspaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the api key
        writeln!(f, "Username: {}, Region: {}", self.username, self.region)?;
        writeln!(f, " params ({}): {{", self.values.len())?;
        for (param, value) in &self.values {
            writeln!(f, "  {}: {}", param, value)?
        }
        writeln!(f, " }}")
    }
}

impl RackspaceConfig {
    pub fn new(username: &str, api_key: &str, region: Region) -> RackspaceConfig {
        RackspaceConfig { username: username.to_string(), api_key: api_key.to_string(), region, values: BTreeMap::new() }
    }

    pub fn from_env() -> Result<RackspaceConfig> {
        RackspaceConfig::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars<F: Fn(&str) -> Option<String>>(get_var: F) -> Result<RackspaceConfig> {
        let username = get_var(ENV_USERNAME).map(|v| v.trim().to_string()).unwrap_or_default();
        if username.is_empty() {
            return Err(ProvisionError::Configuration(format!("${} not set", ENV_USERNAME)));
        }

        let api_key = get_var(ENV_API_KEY).map(|v| v.trim().to_string()).unwrap_or_default();
        if api_key.is_empty() {
            return Err(ProvisionError::Configuration(format!("${} not set", ENV_API_KEY)));
        }

        let region = match get_var(ENV_REGION) {
            Some(region_str) => region_str.parse::<Region>()?,
            None => Region::Dfw
        };

        Ok(RackspaceConfig::new(&username, &api_key, region))
    }

    pub fn from_file(path: &str) -> Result<RackspaceConfig> {
        let extension = Path::new(path).extension().and_then(|e| e.to_str());
        let mut extension_lower = extension.unwrap_or("").to_string();
        extension_lower.make_ascii_lowercase();

        if extension_lower != "txt" {
            return Err(ProvisionError::Configuration(format!("Unknown file type: '{}'.", path)));
        }

        let raw_contents = std::fs::read(path)?;
        let contents = std::str::from_utf8(&raw_contents)
            .map_err(|e| ProvisionError::Configuration(format!("config file '{}' is not UTF-8: {}", path, e)))?;

        RackspaceConfig::from_txt_str(contents)
    }

    fn from_txt_str(contents: &str) -> Result<RackspaceConfig> {
        let mut username = String::new();
        let mut api_key = String::new();
        let mut region = Region::Dfw;
        let mut values = BTreeMap::new();

        for line in contents.lines() {
            let line = line.trim();

            // ignore empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, val)) = line.split_once(':') else {
                warn!("Unexpected line in .txt config file: '{}'", line);
                continue;
            };

            let key = key.trim();
            let val = val.trim();

            match key {
                "username" => username = val.to_string(),
                "api_key" => api_key = val.to_string(),
                "region" => region = val.parse::<Region>()?,
                _ => {
                    values.insert(key.to_string(), val.to_string());
                }
            }
        }

        if username.is_empty() || api_key.is_empty() {
            return Err(ProvisionError::Configuration("config file needs both 'username' and 'api_key'".to_string()));
        }

        Ok(RackspaceConfig { username, api_key, region, values })
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_value(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(str_val) => str_val.to_string(),
            _ => default.to_string()
        }
    }
}
