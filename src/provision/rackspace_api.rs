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

use std::collections::BTreeMap;
use std::io::Read;

use tracing::{debug, info};

use super::compute_driver::ComputeDriver;
use super::driver_registry::build_client;
use super::poll::{PollPolicy, Sleeper, ThreadSleeper};
use super::progress::{NullProgress, ProgressSink};
use super::provision_common::{FlavorDescriptor, HostRecord, ImageDescriptor, Node, NodeCreationRequest,
                              NodeImageRef, NodeSizeRef, ProvisionError, Result, AUTHORIZED_KEYS_PATH};
use super::provision_params::RackspaceConfig;
use super::region::Region;

/// Creates Rackspace nodes and hands back what's needed to log into them.
pub struct RackspaceApi {
    driver:      Box<dyn ComputeDriver>,
    sleeper:     Box<dyn Sleeper>,
    poll_policy: PollPolicy,
}

impl RackspaceApi {
    pub fn new(username: &str, api_key: &str, region: Region) -> Result<RackspaceApi> {
        let driver = build_client(username, api_key, region)?;
        Ok(RackspaceApi::with_driver(driver))
    }

    pub fn from_config(config: &RackspaceConfig) -> Result<RackspaceApi> {
        RackspaceApi::new(&config.username, &config.api_key, config.region)
    }

    pub fn with_driver(driver: Box<dyn ComputeDriver>) -> RackspaceApi {
        RackspaceApi { driver, sleeper: Box::new(ThreadSleeper), poll_policy: PollPolicy::default() }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> RackspaceApi {
        self.sleeper = sleeper;
        self
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> RackspaceApi {
        self.poll_policy = poll_policy;
        self
    }

    fn driver(&self) -> &dyn ComputeDriver {
        self.driver.as_ref()
    }

    pub fn list_images(&self) -> Result<Vec<ImageDescriptor>> {
        let images = self.driver().list_images()?;

        Ok(images.into_iter().map(|image| ImageDescriptor { id: image.id, name: image.name }).collect())
    }

    pub fn list_flavors(&self) -> Result<Vec<FlavorDescriptor>> {
        let sizes = self.driver().list_sizes()?;

        Ok(sizes.into_iter()
            .map(|s| FlavorDescriptor { id: s.id, name: s.name, ram_mb: s.ram_mb, disk_gb: s.disk_gb, vcpus: s.vcpus })
            .collect())
    }

    pub fn create_node<R: Read>(&self, node_name: &str, image_id: &str, flavor_id: &str,
                                public_key_io: R) -> Result<HostRecord> {
        self.create_node_with_progress(node_name, image_id, flavor_id, public_key_io, &mut NullProgress)
    }

    pub fn create_node_with_progress<R: Read>(&self, node_name: &str, image_id: &str, flavor_id: &str,
                                              mut public_key_io: R, progress: &mut dyn ProgressSink) -> Result<HostRecord> {
        progress.emit(&format!("Creating node {} (image: {}, flavor: {})...\n", node_name, image_id, flavor_id));

        let mut public_key = String::new();
        public_key_io.read_to_string(&mut public_key)?;

        let mut files = BTreeMap::new();
        files.insert(AUTHORIZED_KEYS_PATH.to_string(), public_key);

        let request = NodeCreationRequest { name: node_name.to_string(),
                                            image: NodeImageRef { id: image_id.to_string() },
                                            size: NodeSizeRef { id: flavor_id.to_string() },
                                            files };

        let mut node = self.driver().create_node(&request)?;

        // only the creation response carries the password, later lookups don't
        let creation_password = node.password().unwrap_or("").to_string();
        progress.emit(&format!("Created node {} (id: {}, password: {})\n", node_name, node.id, creation_password));

        progress.emit("Waiting for node to become active");
        // finish the waiting line whether or not the node made it
        let wait_result = self.wait_for_active(node, progress);
        progress.emit("\n");
        node = wait_result?;

        let host_string = select_host_address(&node)?;
        progress.emit(&format!("Node active! (host: {})\n", host_string));

        let password = if creation_password.is_empty() {
            node.password().unwrap_or("").to_string()
        }
        else {
            creation_password
        };

        info!(node_id = %node.id, host = %host_string, "node is active");

        Ok(HostRecord { name: node_name.to_string(), host_string, password })
    }

    pub fn delete_node(&self, node_id: &str) -> Result<()> {
        self.driver().destroy_node(node_id)
    }

    fn wait_for_active(&self, mut node: Node, progress: &mut dyn ProgressSink) -> Result<Node> {
        let mut attempts = 0;

        while !node.state.is_active() {
            if attempts >= self.poll_policy.max_attempts {
                return Err(ProvisionError::Timeout { node_id: node.id, attempts });
            }

            self.sleeper.sleep(self.poll_policy.interval);
            attempts += 1;

            node = self.driver().get_node_details(&node.id)?;
            debug!(node_id = %node.id, state = %node.state, attempts, "polled node state");

            progress.emit(".");
        }

        Ok(node)
    }
}

// Anything with a ':' in it is taken to be IPv6.
pub fn select_host_address(node: &Node) -> Result<String> {
    node.public_ips.iter()
        .find(|ip| !ip.contains(':'))
        .cloned()
        .ok_or_else(|| ProvisionError::NoAddress { node_id: node.id.clone() })
}
