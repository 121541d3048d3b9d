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

use super::provision_common::{Node, NodeCreationRequest, NodeImage, NodeSize, ProvisionError, Result};

/// Blocking client for a cloud compute API.
///
/// Implementations are expected to be lazy: constructing one must not touch the
/// network, authentication happens on the first call that needs it.
pub trait ComputeDriver {

    fn name(&self) -> String {
        "".to_string()
    }

    fn list_images(&self) -> Result<Vec<NodeImage>>;

    fn list_sizes(&self) -> Result<Vec<NodeSize>> {
        Err(ProvisionError::Configuration(format!("driver '{}' cannot list sizes", self.name())))
    }

    fn create_node(&self, request: &NodeCreationRequest) -> Result<Node>;

    fn get_node_details(&self, node_id: &str) -> Result<Node>;

    fn destroy_node(&self, _node_id: &str) -> Result<()> {
        Err(ProvisionError::Configuration(format!("driver '{}' cannot delete nodes", self.name())))
    }
}
