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

use ureq;
use ureq::Error;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info, warn};

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::provision::compute_driver::ComputeDriver;
use crate::provision::provision_common::{Node, NodeCreationRequest, NodeImage, NodeSize, NodeState,
                                         ProvisionError, Result};
use crate::provision::region::Region;

pub const RACKSPACE_IDENTITY_URI: &str = "https://identity.api.rackspacecloud.com/v2.0/tokens";

const COMPUTE_SERVICE_TYPE: &str = "compute";
const COMPUTE_SERVICE_NAME: &str = "cloudServersOpenStack";

#[derive(Serialize, Deserialize)]
struct AuthToken {
    id: String,
}

#[derive(Serialize, Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    region: Option<String>,

    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Serialize, Deserialize)]
struct CatalogEntry {
    name: String,

    #[serde(rename = "type")]
    ttype: String,

    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Serialize, Deserialize)]
struct AuthAccess {
    token: AuthToken,

    #[serde(rename = "serviceCatalog")]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Serialize, Deserialize)]
struct AuthResponse {
    access: AuthAccess,
}

impl AuthResponse {
    fn get_compute_endpoint(&self, region: Region) -> Option<String> {
        for entry in &self.access.service_catalog {
            if entry.ttype != COMPUTE_SERVICE_TYPE || entry.name != COMPUTE_SERVICE_NAME {
                continue;
            }

            for endpoint in &entry.endpoints {
                if endpoint.region.as_deref() == Some(region.catalog_code()) {
                    return Some(endpoint.public_url.trim_end_matches('/').to_string());
                }
            }
        }

        None
    }
}

#[derive(Serialize, Deserialize)]
struct ImageResultItem {
    id:     String,
    name:   String,

    #[serde(default)]
    status: Option<String>,

    #[serde(rename = "minDisk", default)]
    min_disk: Option<u32>,

    #[serde(rename = "minRam", default)]
    min_ram: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct ImageListResults {
    images: Vec<ImageResultItem>
}

#[derive(Serialize, Deserialize)]
struct FlavorResultItem {
    id:     String,
    name:   String,
    ram:    u32,
    disk:   u32,
    vcpus:  u32,
}

#[derive(Serialize, Deserialize)]
struct FlavorListResults {
    flavors: Vec<FlavorResultItem>
}

#[derive(Serialize, Deserialize)]
struct ServerCreated {
    id: String,

    #[serde(rename = "adminPass", default)]
    admin_pass: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ServerCreateResponse {
    server: ServerCreated,
}

#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
struct ServerAddress {
    addr: String,
}

#[derive(Serialize, Deserialize)]
struct ServerDetailsInner {
    id:      String,
    name:    String,
    status:  String,

    #[serde(default)]
    addresses: BTreeMap<String, Vec<ServerAddress>>,
}

#[derive(Serialize, Deserialize)]
struct ServerDetails {
    server: ServerDetailsInner,
}

impl ServerDetails {
    fn get_addresses(&self, network: &str) -> Vec<String> {
        match self.server.addresses.get(network) {
            Some(addresses) => addresses.iter().map(|a| a.addr.clone()).collect(),
            None => Vec::new()
        }
    }

    fn into_node(self) -> Node {
        let public_ips = self.get_addresses("public");
        let private_ips = self.get_addresses("private");

        let mut node = Node::new(&self.server.id, &self.server.name, NodeState::from_status(&self.server.status));
        node.public_ips = public_ips;
        node.private_ips = private_ips;
        node.extra.insert("status".to_string(), self.server.status);
        node
    }
}

#[derive(Clone)]
struct AuthSession {
    token:            String,
    compute_endpoint: String,
}

/// Compute driver for Rackspace's OpenStack "Nova" cloud servers API, for one region.
pub struct ProviderRackspaceNova {
    username:     String,
    api_key:      String,
    region:       Region,
    identity_uri: String,

    session:      RefCell<Option<AuthSession>>,
}

impl ProviderRackspaceNova {
    pub fn new(username: &str, api_key: &str, region: Region) -> ProviderRackspaceNova {
        ProviderRackspaceNova { username: username.to_string(), api_key: api_key.to_string(), region,
                                identity_uri: RACKSPACE_IDENTITY_URI.to_string(), session: RefCell::new(None) }
    }

    pub fn with_identity_uri(mut self, identity_uri: &str) -> ProviderRackspaceNova {
        self.identity_uri = identity_uri.to_string();
        self
    }
}

impl ComputeDriver for ProviderRackspaceNova {
    fn name(&self) -> String {
        self.region.provider_identity().to_string()
    }

    fn list_images(&self) -> Result<Vec<NodeImage>> {
        let resp_string = self.authenticated_get("/images/detail")?;
        let results: ImageListResults = parse_json("image list", &resp_string)?;

        let images = results.images.into_iter().map(|image| {
            let mut extra = BTreeMap::new();
            if let Some(status) = image.status {
                extra.insert("status".to_string(), status);
            }
            if let Some(min_disk) = image.min_disk {
                extra.insert("minDisk".to_string(), min_disk.to_string());
            }
            if let Some(min_ram) = image.min_ram {
                extra.insert("minRam".to_string(), min_ram.to_string());
            }
            NodeImage { id: image.id, name: image.name, extra }
        }).collect();

        Ok(images)
    }

    fn list_sizes(&self) -> Result<Vec<NodeSize>> {
        let resp_string = self.authenticated_get("/flavors/detail")?;
        let results: FlavorListResults = parse_json("flavor list", &resp_string)?;

        Ok(results.flavors.into_iter()
            .map(|f| NodeSize { id: f.id, name: f.name, ram_mb: f.ram, disk_gb: f.disk, vcpus: f.vcpus })
            .collect())
    }

    fn create_node(&self, request: &NodeCreationRequest) -> Result<Node> {
        let body = build_create_server_body(request);

        let session = self.session()?;
        let resp = ureq::post(&format!("{}/servers", session.compute_endpoint))
            .set("X-Auth-Token", &session.token)
            .set("Accept", "application/json")
            .send_json(body);

        let resp_string = self.read_response("create server", resp)?;
        let created: ServerCreateResponse = parse_json("create server", &resp_string)?;

        info!(node_id = %created.server.id, name = %request.name, "Rackspace server created");

        Ok(node_from_created(created, &request.name))
    }

    fn get_node_details(&self, node_id: &str) -> Result<Node> {
        let resp_string = self.authenticated_get(&format!("/servers/{}", node_id))?;
        let details: ServerDetails = parse_json("server details", &resp_string)?;

        debug!(node_id, status = %details.server.status, "fetched server details");

        Ok(details.into_node())
    }

    fn destroy_node(&self, node_id: &str) -> Result<()> {
        let session = self.session()?;
        let resp = ureq::delete(&format!("{}/servers/{}", session.compute_endpoint, node_id))
            .set("X-Auth-Token", &session.token)
            .call();

        // response should be empty (204)...
        let _resp_string = self.read_response("delete server", resp)?;

        info!(node_id, "Rackspace server deleted");
        Ok(())
    }
}

impl ProviderRackspaceNova {
    fn session(&self) -> Result<AuthSession> {
        if let Some(session) = self.session.borrow().as_ref() {
            return Ok(session.clone());
        }

        let session = self.authenticate()?;
        *self.session.borrow_mut() = Some(session.clone());
        Ok(session)
    }

    fn authenticate(&self) -> Result<AuthSession> {
        debug!(username = %self.username, region = %self.region, "authenticating with Rackspace identity API");

        let resp = ureq::post(&self.identity_uri)
            .set("Accept", "application/json")
            .send_json(ureq::json!({
                "auth": {
                    "RAX-KSKEY:apiKeyCredentials": {
                        "username": self.username,
                        "apiKey": self.api_key,
                    }
                }
            }));

        let resp_string = match resp {
            Ok(response) => response.into_string().map_err(|e| ProvisionError::Transport(e.to_string()))?,
            Err(e) => return Err(map_request_error("authenticate", e)),
        };

        let auth: AuthResponse = parse_json("authentication", &resp_string)?;

        let compute_endpoint = auth.get_compute_endpoint(self.region).ok_or_else(|| {
            ProvisionError::Authentication(format!("no compute endpoint for region {} in service catalog",
                                                   self.region.catalog_code()))
        })?;

        Ok(AuthSession { token: auth.access.token.id, compute_endpoint })
    }

    fn authenticated_get(&self, path: &str) -> Result<String> {
        let session = self.session()?;
        let resp = ureq::get(&format!("{}{}", session.compute_endpoint, path))
            .set("X-Auth-Token", &session.token)
            .set("Accept", "application/json")
            .call();

        self.read_response(path, resp)
    }

    fn read_response(&self, context: &str, resp: std::result::Result<ureq::Response, Error>) -> Result<String> {
        match resp {
            Ok(response) => response.into_string().map_err(|e| ProvisionError::Transport(e.to_string())),
            Err(e) => {
                let err = map_request_error(context, e);
                if let ProvisionError::Authentication(_) = err {
                    // token may have expired, so re-authenticate next time round
                    self.session.borrow_mut().take();
                }
                Err(err)
            }
        }
    }
}

fn map_request_error(context: &str, error: Error) -> ProvisionError {
    match error {
        Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            warn!(code, context, "Rackspace API returned an error: {}", body);
            match code {
                401 | 403 => ProvisionError::Authentication(format!("{}: {}", context, body)),
                _ => ProvisionError::Api { code, message: body }
            }
        },
        Error::Transport(transport) => {
            ProvisionError::Transport(format!("{}: {}", context, transport))
        }
    }
}

fn parse_json<T: DeserializeOwned>(context: &str, resp_string: &str) -> Result<T> {
    serde_json::from_str(resp_string).map_err(|e| {
        ProvisionError::InvalidResponse(format!("{} response from Rackspace: {} ({})", context, e, resp_string))
    })
}

fn build_create_server_body(request: &NodeCreationRequest) -> serde_json::Value {
    let personality: Vec<serde_json::Value> = request.files.iter().map(|(path, contents)| {
        ureq::json!({
            "path": path,
            "contents": BASE64.encode(contents.as_bytes()),
        })
    }).collect();

    ureq::json!({
        "server": {
            "name": request.name,
            "imageRef": request.image.id,
            "flavorRef": request.size.id,
            "personality": personality,
        }
    })
}

// the create response only has the id and admin password, the server is still building
fn node_from_created(created: ServerCreateResponse, name: &str) -> Node {
    let mut node = Node::new(&created.server.id, name, NodeState::Pending);
    if let Some(password) = created.server.admin_pass {
        node.extra.insert("password".to_string(), password);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    use crate::provision::provision_common::{NodeImageRef, NodeSizeRef, AUTHORIZED_KEYS_PATH};

    const AUTH_RESPONSE: &str = r#"{
        "access": {
            "token": { "id": "token-abc", "expires": "2026-10-17T00:00:00Z" },
            "serviceCatalog": [
                { "name": "cloudFiles", "type": "object-store",
                  "endpoints": [ { "region": "DFW", "publicURL": "https://storage.dfw.example/v1" } ] },
                { "name": "cloudServersOpenStack", "type": "compute",
                  "endpoints": [
                    { "region": "DFW", "publicURL": "https://dfw.servers.api.rackspacecloud.com/v2/123456/" },
                    { "region": "ORD", "publicURL": "https://ord.servers.api.rackspacecloud.com/v2/123456" }
                  ] }
            ]
        }
    }"#;

    #[test]
    fn finds_compute_endpoint_for_region() {
        let auth: AuthResponse = parse_json("auth", AUTH_RESPONSE).unwrap();

        assert_eq!(auth.get_compute_endpoint(Region::Dfw).unwrap(), "https://dfw.servers.api.rackspacecloud.com/v2/123456");
        assert_eq!(auth.get_compute_endpoint(Region::Ord).unwrap(), "https://ord.servers.api.rackspacecloud.com/v2/123456");
        assert_eq!(auth.access.token.id, "token-abc");
    }

    #[test]
    fn missing_region_in_catalog_gives_no_endpoint() {
        let auth: AuthResponse = parse_json("auth", r#"{"access": {"token": {"id": "t"}, "serviceCatalog": []}}"#).unwrap();
        assert!(auth.get_compute_endpoint(Region::Dfw).is_none());
    }

    #[test]
    fn server_details_convert_to_node() {
        let details: ServerDetails = parse_json("details", r#"{
            "server": {
                "id": "52415800-8b69-11e0-9b19-734f565bc83b",
                "name": "new-node",
                "status": "ACTIVE",
                "addresses": {
                    "public": [
                        { "version": 6, "addr": "2001:4800:780e:510:be76:4eff:fe04:84a8" },
                        { "version": 4, "addr": "50.51.52.53" }
                    ],
                    "private": [ { "version": 4, "addr": "10.176.42.16" } ]
                }
            }
        }"#).unwrap();

        let node = details.into_node();
        assert_eq!(node.id, "52415800-8b69-11e0-9b19-734f565bc83b");
        assert_eq!(node.state, NodeState::Running);
        assert_eq!(node.public_ips, vec!["2001:4800:780e:510:be76:4eff:fe04:84a8".to_string(), "50.51.52.53".to_string()]);
        assert_eq!(node.private_ips, vec!["10.176.42.16".to_string()]);
        assert_eq!(node.password(), None);
    }

    #[test]
    fn building_server_without_addresses_is_pending() {
        let details: ServerDetails = parse_json("details",
            r#"{"server": {"id": "abc", "name": "n", "status": "BUILD"}}"#).unwrap();

        let node = details.into_node();
        assert_eq!(node.state, NodeState::Pending);
        assert!(node.public_ips.is_empty());
    }

    #[test]
    fn created_server_carries_admin_password() {
        let created: ServerCreateResponse = parse_json("create",
            r#"{"server": {"id": "abc", "adminPass": "abcDEFghiJKL", "links": []}}"#).unwrap();

        let node = node_from_created(created, "new node");
        assert_eq!(node.name, "new node");
        assert_eq!(node.state, NodeState::Pending);
        assert_eq!(node.password(), Some("abcDEFghiJKL"));
    }

    #[test]
    fn create_body_injects_files_as_base64_personality() {
        let mut files = BTreeMap::new();
        files.insert(AUTHORIZED_KEYS_PATH.to_string(), "ssh-rsa AAAA dave@isis".to_string());
        let request = NodeCreationRequest { name: "new-node".to_string(),
                                            image: NodeImageRef { id: "5cebb13a".to_string() },
                                            size: NodeSizeRef { id: "2".to_string() }, files };

        let body = build_create_server_body(&request);
        let server = &body["server"];
        assert_eq!(server["name"], "new-node");
        assert_eq!(server["imageRef"], "5cebb13a");
        assert_eq!(server["flavorRef"], "2");
        assert_eq!(server["personality"][0]["path"], "/root/.ssh/authorized_keys");
        assert_eq!(server["personality"][0]["contents"], BASE64.encode("ssh-rsa AAAA dave@isis"));
    }

    #[test]
    fn flavor_list_parses() {
        let results: FlavorListResults = parse_json("flavors", r#"{"flavors": [
            {"id": "2", "name": "512MB Standard Instance", "ram": 512, "disk": 20, "vcpus": 1, "swap": 512}
        ]}"#).unwrap();
        assert_eq!(results.flavors.len(), 1);
        assert_eq!(results.flavors[0].ram, 512);
    }

    #[test]
    fn bad_json_is_an_invalid_response() {
        let res: Result<ImageListResults> = parse_json("images", "<html>oops</html>");
        assert!(matches!(res, Err(ProvisionError::InvalidResponse(_))));
    }

    // Local HTTP endpoint answering one canned (status, body) per connection, in order.
    // Requests are logged as "METHOD path".
    fn serve(listener: TcpListener, responses: Vec<(u16, String)>) -> Arc<Mutex<Vec<String>>> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();

                let mut content_length = 0;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).unwrap();

                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or("");
                let path = parts.next().unwrap_or("");
                recorded.lock().unwrap().push(format!("{} {}", method, path));

                write!(stream, "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                       status, body.len(), body).unwrap();
                stream.flush().unwrap();
            }
        });

        requests
    }

    fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    fn auth_body(base: &str) -> String {
        serde_json::json!({
            "access": {
                "token": { "id": "token-abc" },
                "serviceCatalog": [
                    { "name": "cloudServersOpenStack", "type": "compute",
                      "endpoints": [ { "region": "DFW", "publicURL": format!("{}/v2/123456", base) } ] }
                ]
            }
        }).to_string()
    }

    fn driver_for(base: &str, region: Region) -> ProviderRackspaceNova {
        ProviderRackspaceNova::new("dave", "deadbeef", region).with_identity_uri(&format!("{}/v2.0/tokens", base))
    }

    const IMAGES_BODY: &str = r#"{"images": [{"id": "abc-def", "name": "Ubuntu 22.04", "status": "ACTIVE", "minDisk": 20}]}"#;

    #[test]
    fn authenticates_once_for_several_calls() {
        let (listener, base) = bind();
        let flavors = r#"{"flavors": [{"id": "2", "name": "512MB", "ram": 512, "disk": 20, "vcpus": 1}]}"#;
        let requests = serve(listener, vec![(200, auth_body(&base)), (200, IMAGES_BODY.to_string()),
                                            (200, flavors.to_string())]);

        let driver = driver_for(&base, Region::Dfw);
        let images = driver.list_images().unwrap();
        let sizes = driver.list_sizes().unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, "abc-def");
        assert_eq!(images[0].extra.get("minDisk").map(|s| s.as_str()), Some("20"));
        assert_eq!(sizes[0].ram_mb, 512);
        assert_eq!(*requests.lock().unwrap(), vec!["POST /v2.0/tokens".to_string(),
                                                   "GET /v2/123456/images/detail".to_string(),
                                                   "GET /v2/123456/flavors/detail".to_string()]);
    }

    #[test]
    fn expired_token_is_dropped_and_next_call_reauthenticates() {
        let (listener, base) = bind();
        let requests = serve(listener, vec![(200, auth_body(&base)), (401, "expired".to_string()),
                                            (200, auth_body(&base)), (200, IMAGES_BODY.to_string())]);

        let driver = driver_for(&base, Region::Dfw);
        let first = driver.list_images();
        let second = driver.list_images();

        assert!(matches!(first, Err(ProvisionError::Authentication(_))));
        assert_eq!(second.unwrap().len(), 1);
        assert_eq!(*requests.lock().unwrap(), vec!["POST /v2.0/tokens".to_string(),
                                                   "GET /v2/123456/images/detail".to_string(),
                                                   "POST /v2.0/tokens".to_string(),
                                                   "GET /v2/123456/images/detail".to_string()]);
    }

    #[test]
    fn rejected_credentials_are_an_authentication_error() {
        let (listener, base) = bind();
        serve(listener, vec![(401, r#"{"unauthorized": {"code": 401}}"#.to_string())]);

        let res = driver_for(&base, Region::Dfw).list_images();
        assert!(matches!(res, Err(ProvisionError::Authentication(_))));
    }

    #[test]
    fn forbidden_is_an_authentication_error() {
        let (listener, base) = bind();
        serve(listener, vec![(200, auth_body(&base)), (403, "forbidden".to_string())]);

        let res = driver_for(&base, Region::Dfw).get_node_details("abc");
        assert!(matches!(res, Err(ProvisionError::Authentication(_))));
    }

    #[test]
    fn other_statuses_are_api_errors() {
        let (listener, base) = bind();
        serve(listener, vec![(200, auth_body(&base)), (404, "no such server".to_string())]);

        let res = driver_for(&base, Region::Dfw).get_node_details("abc");
        match res {
            Err(ProvisionError::Api { code, message }) => {
                assert_eq!(code, 404);
                assert_eq!(message, "no such server");
            },
            _ => panic!("expected API error"),
        }
    }

    #[test]
    fn region_missing_from_catalog_is_an_authentication_error() {
        let (listener, base) = bind();
        let requests = serve(listener, vec![(200, auth_body(&base))]);

        let res = driver_for(&base, Region::Ord).list_images();
        assert!(matches!(res, Err(ProvisionError::Authentication(_))));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn creates_and_deletes_server_over_http() {
        let (listener, base) = bind();
        let created = r#"{"server": {"id": "abc", "adminPass": "abcDEFghiJKL"}}"#;
        let requests = serve(listener, vec![(200, auth_body(&base)), (202, created.to_string()),
                                            (204, String::new())]);

        let mut files = BTreeMap::new();
        files.insert(AUTHORIZED_KEYS_PATH.to_string(), "ssh-rsa AAAA dave@isis".to_string());
        let request = NodeCreationRequest { name: "new-node".to_string(),
                                            image: NodeImageRef { id: "abc-def".to_string() },
                                            size: NodeSizeRef { id: "2".to_string() }, files };

        let driver = driver_for(&base, Region::Dfw);
        let node = driver.create_node(&request).unwrap();
        driver.destroy_node(&node.id).unwrap();

        assert_eq!(node.id, "abc");
        assert_eq!(node.password(), Some("abcDEFghiJKL"));
        assert_eq!(*requests.lock().unwrap(), vec!["POST /v2.0/tokens".to_string(),
                                                   "POST /v2/123456/servers".to_string(),
                                                   "DELETE /v2/123456/servers/abc".to_string()]);
    }
}
