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
use std::fmt;
use std::io;

use thiserror::Error;

pub const AUTHORIZED_KEYS_PATH: &str = "/root/.ssh/authorized_keys";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no compute driver registered for provider: '{0}'")]
    UnknownProvider(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("API error (code: {code}): {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("node {node_id} has no public IPv4 address")]
    NoAddress { node_id: String },

    #[error("node {node_id} did not become active after {attempts} status checks")]
    Timeout { node_id: String, attempts: u32 },
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Other(String),
}

impl NodeState {
    // Nova server status strings
    pub fn from_status(status: &str) -> NodeState {
        match status {
            "ACTIVE" => NodeState::Running,
            "BUILD" | "REBUILD" | "REBOOT" | "HARD_REBOOT" | "RESIZE" | "PASSWORD" => NodeState::Pending,
            _ => NodeState::Other(status.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        *self == NodeState::Running
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Pending  => write!(f, "pending"),
            NodeState::Running  => write!(f, "running"),
            NodeState::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id:          String,
    pub name:        String,
    pub state:       NodeState,
    pub public_ips:  Vec<String>,
    pub private_ips: Vec<String>,
    pub extra:       BTreeMap<String, String>,
}

impl Node {
    pub fn new(id: &str, name: &str, state: NodeState) -> Node {
        Node { id: id.to_string(), name: name.to_string(), state, public_ips: Vec::new(),
               private_ips: Vec::new(), extra: BTreeMap::new() }
    }

    pub fn password(&self) -> Option<&str> {
        self.extra.get("password").map(|p| p.as_str())
    }
}

/// Image as the driver reports it, with whatever extra detail the provider returns.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeImage {
    pub id:     String,
    pub name:   String,
    pub extra:  BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeSize {
    pub id:      String,
    pub name:    String,
    pub ram_mb:  u32,
    pub disk_gb: u32,
    pub vcpus:   u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeImageRef {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeSizeRef {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeCreationRequest {
    pub name:   String,
    pub image:  NodeImageRef,
    pub size:   NodeSizeRef,
    // remote path -> file contents, written into the node at boot
    pub files:  BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub id:   String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlavorDescriptor {
    pub id:      String,
    pub name:    String,
    pub ram_mb:  u32,
    pub disk_gb: u32,
    pub vcpus:   u32,
}

/// What a configuration-management tool needs to reach a freshly-created node.
#[derive(Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub name:        String,
    pub host_string: String,
    pub password:    String,
}

// keep the root password out of logs and panic messages
impl fmt::Debug for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRecord")
            .field("name", &self.name)
            .field("host_string", &self.host_string)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nova_status_strings_map_to_node_state() {
        assert_eq!(NodeState::from_status("ACTIVE"), NodeState::Running);
        assert_eq!(NodeState::from_status("BUILD"), NodeState::Pending);
        assert_eq!(NodeState::from_status("ERROR"), NodeState::Other("ERROR".to_string()));
        assert!(!NodeState::from_status("ERROR").is_active());
    }

    #[test]
    fn host_record_debug_hides_password() {
        let host = HostRecord { name: "web-1".to_string(), host_string: "50.51.52.53".to_string(),
                                password: "abcDEFghiJKL".to_string() };
        let text = format!("{:?}", host);

        assert!(text.contains("50.51.52.53"));
        assert!(!text.contains("abcDEFghiJKL"));
    }
}
