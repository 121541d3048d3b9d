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

use tracing::debug;

use super::compute_driver::ComputeDriver;
use super::provision_common::{ProvisionError, Result};
use super::region::{ProviderIdentity, Region};

use super::providers::provider_rackspace_nova::ProviderRackspaceNova;

/// Builds a driver from (username, api_key).
pub type DriverConstructor = Box<dyn Fn(&str, &str) -> Box<dyn ComputeDriver>>;

pub trait DriverLookup {
    fn get_driver(&self, identity: ProviderIdentity) -> Result<DriverConstructor>;
}

/// The drivers shipped with this crate: one Rackspace Nova driver per region.
pub struct NovaDriverLookup {
    registered_identities: Vec<ProviderIdentity>,
}

impl NovaDriverLookup {
    pub fn new() -> NovaDriverLookup {
        NovaDriverLookup { registered_identities: vec![ProviderIdentity::RackspaceNovaDfw,
                                                       ProviderIdentity::RackspaceNovaOrd] }
    }
}

impl Default for NovaDriverLookup {
    fn default() -> Self {
        NovaDriverLookup::new()
    }
}

impl DriverLookup for NovaDriverLookup {
    fn get_driver(&self, identity: ProviderIdentity) -> Result<DriverConstructor> {
        if !self.registered_identities.contains(&identity) {
            return Err(ProvisionError::UnknownProvider(identity.to_string()));
        }

        let region = identity.region();
        Ok(Box::new(move |username: &str, api_key: &str| -> Box<dyn ComputeDriver> {
            Box::new(ProviderRackspaceNova::new(username, api_key, region))
        }))
    }
}

pub fn build_client(username: &str, api_key: &str, region: Region) -> Result<Box<dyn ComputeDriver>> {
    build_client_with_lookup(&NovaDriverLookup::new(), username, api_key, region)
}

// lookup errors are passed back as-is
pub fn build_client_with_lookup(lookup: &dyn DriverLookup, username: &str, api_key: &str,
                                region: Region) -> Result<Box<dyn ComputeDriver>> {
    let identity = region.provider_identity();
    debug!(%identity, %region, "building compute driver");

    let constructor = lookup.get_driver(identity)?;
    Ok(constructor(username, api_key))
}

/// Same as `build_client()`, but with the region given by name (e.g. from a config file).
pub fn build_client_for_region_name(username: &str, api_key: &str, region: &str) -> Result<Box<dyn ComputeDriver>> {
    let region = region.parse::<Region>()?;
    build_client(username, api_key, region)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::provision::provision_common::{Node, NodeCreationRequest, NodeImage};

    struct NullDriver;

    impl ComputeDriver for NullDriver {
        fn list_images(&self) -> Result<Vec<NodeImage>> {
            Ok(Vec::new())
        }

        fn create_node(&self, _request: &NodeCreationRequest) -> Result<Node> {
            Err(ProvisionError::Transport("not connected".to_string()))
        }

        fn get_node_details(&self, _node_id: &str) -> Result<Node> {
            Err(ProvisionError::Transport("not connected".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingLookup {
        identities:  RefCell<Vec<ProviderIdentity>>,
        credentials: Rc<RefCell<Vec<(String, String)>>>,
    }

    impl DriverLookup for RecordingLookup {
        fn get_driver(&self, identity: ProviderIdentity) -> Result<DriverConstructor> {
            self.identities.borrow_mut().push(identity);
            let credentials = self.credentials.clone();
            Ok(Box::new(move |username: &str, api_key: &str| -> Box<dyn ComputeDriver> {
                credentials.borrow_mut().push((username.to_string(), api_key.to_string()));
                Box::new(NullDriver)
            }))
        }
    }

    struct FailingLookup;

    impl DriverLookup for FailingLookup {
        fn get_driver(&self, identity: ProviderIdentity) -> Result<DriverConstructor> {
            Err(ProvisionError::UnknownProvider(identity.to_string()))
        }
    }

    #[test]
    fn dfw_region_builds_dfw_driver_with_given_credentials() {
        let lookup = RecordingLookup::default();
        build_client_with_lookup(&lookup, "username", "deadbeef", Region::Dfw).unwrap();

        assert_eq!(*lookup.identities.borrow(), vec![ProviderIdentity::RackspaceNovaDfw]);
        assert_eq!(*lookup.credentials.borrow(), vec![("username".to_string(), "deadbeef".to_string())]);
    }

    #[test]
    fn ord_region_builds_ord_driver() {
        let lookup = RecordingLookup::default();
        build_client_with_lookup(&lookup, "username", "deadbeef", Region::Ord).unwrap();

        assert_eq!(*lookup.identities.borrow(), vec![ProviderIdentity::RackspaceNovaOrd]);
    }

    #[test]
    fn lookup_failures_are_propagated_unchanged() {
        let res = build_client_with_lookup(&FailingLookup, "username", "deadbeef", Region::Ord);
        match res {
            Err(ProvisionError::UnknownProvider(name)) => assert_eq!(name, "rackspacenovaord"),
            _ => panic!("expected lookup error"),
        }
    }

    #[test]
    fn unknown_region_name_is_a_configuration_error() {
        let res = build_client_for_region_name("username", "deadbeef", "syd");
        assert!(matches!(res, Err(ProvisionError::Configuration(_))));
    }

    #[test]
    fn default_lookup_builds_nova_driver_without_network_access() {
        let driver = build_client("username", "deadbeef", Region::Dfw).unwrap();
        assert_eq!(driver.name(), "rackspacenovadfw");
    }
}
