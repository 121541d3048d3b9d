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

//! Provisioning of Rackspace cloud servers for configuration-management tools:
//! create a node with an SSH key installed, wait for it to come up, and get back
//! the host address and root password to connect with.

pub mod provision;

pub use provision::compute_driver::ComputeDriver;
pub use provision::driver_registry::{build_client, build_client_with_lookup, DriverConstructor, DriverLookup, NovaDriverLookup};
pub use provision::poll::{PollPolicy, Sleeper, ThreadSleeper};
pub use provision::progress::{NullProgress, ProgressSink, WriterProgress};
pub use provision::provision_common::{FlavorDescriptor, HostRecord, ImageDescriptor, Node, NodeState, ProvisionError, Result};
pub use provision::provision_params::RackspaceConfig;
pub use provision::rackspace_api::RackspaceApi;
pub use provision::region::{ProviderIdentity, Region};
