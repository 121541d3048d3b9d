/*
 Prod
 Copyright 2021-2024 Peter Pearson.
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

use std::fmt;
use std::str::FromStr;

use super::provision_common::ProvisionError;

#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(Copy)]
pub enum Region {
    Dfw,
    Ord,
}

/// Identity a compute driver is registered under. Each Rackspace region has its
/// own, as each has its own API endpoint.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[derive(Copy)]
pub enum ProviderIdentity {
    RackspaceNovaDfw,
    RackspaceNovaOrd,
}

impl Region {
    pub fn provider_identity(&self) -> ProviderIdentity {
        match self {
            Region::Dfw => ProviderIdentity::RackspaceNovaDfw,
            Region::Ord => ProviderIdentity::RackspaceNovaOrd,
        }
    }

    // region code as it appears in the Rackspace service catalog
    pub fn catalog_code(&self) -> &'static str {
        match self {
            Region::Dfw => "DFW",
            Region::Ord => "ORD",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Dfw => write!(f, "dfw"),
            Region::Ord => write!(f, "ord"),
        }
    }
}

impl FromStr for Region {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut region_lower = s.trim().to_string();
        region_lower.make_ascii_lowercase();

        match region_lower.as_str() {
            "dfw" => Ok(Region::Dfw),
            "ord" => Ok(Region::Ord),
            _ => Err(ProvisionError::Configuration(format!("unrecognised region: '{}'", s)))
        }
    }
}

impl ProviderIdentity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderIdentity::RackspaceNovaDfw => "rackspacenovadfw",
            ProviderIdentity::RackspaceNovaOrd => "rackspacenovaord",
        }
    }

    pub fn region(&self) -> Region {
        match self {
            ProviderIdentity::RackspaceNovaDfw => Region::Dfw,
            ProviderIdentity::RackspaceNovaOrd => Region::Ord,
        }
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
