//! LXD REST client over the local unix socket

use crate::error::{Result, SyncError};
use crate::platform::PlatformQuery;
use crate::topology::{Instance, Network};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1;
use hyper::{header, Method, Request};
use hyper_util::rt::TokioIo;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, instrument};
use url::form_urlencoded;

/// Default LXD socket of the snap package.
pub const DEFAULT_SOCKET_PATH: &str = "/var/snap/lxd/common/lxd/unix.socket";

/// Host header sent over the unix socket
const LXD_HOST: &str = "lxd";

const NOT_FOUND: u16 = 404;

/// Standard LXD response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_code: u16,
    metadata: Option<T>,
}

/// Decodes an LXD response body into its metadata.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    operation: &str,
    entity: &str,
    body: &[u8],
) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| SyncError::invalid_data(entity, format!("malformed response: {e}")))?;

    if envelope.kind == "error" || envelope.error_code >= 400 {
        if envelope.error_code == NOT_FOUND {
            return Err(SyncError::not_found(entity));
        }
        return Err(SyncError::api(operation, envelope.error_code, envelope.error));
    }

    envelope
        .metadata
        .ok_or_else(|| SyncError::invalid_data(entity, "response carries no metadata"))
}

fn transport_error(operation: &str, error: impl std::fmt::Display) -> SyncError {
    SyncError::transport(operation, error.to_string())
}

/// Characters escaped inside one path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Builds `/1.0/<collection>[/<name>]?project=<project>[&extra]`.
fn resource_path(
    collection: &str,
    name: Option<&str>,
    project: &str,
    extra: &[(&str, &str)],
) -> String {
    let mut path = format!("/1.0/{collection}");
    if let Some(name) = name {
        path.push('/');
        path.extend(utf8_percent_encode(name, PATH_SEGMENT));
    }

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("project", project);
    for (key, value) in extra {
        query.append_pair(key, value);
    }
    format!("{path}?{}", query.finish())
}

/// Extracts the project name from a `/1.0/projects/<name>` locator.
fn project_name(locator: &str) -> Option<String> {
    let raw = locator
        .split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())?;
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}

/// Client for the LXD REST API.
///
/// Every request opens its own connection, so a restarted LXD daemon is
/// picked up without any reconnect logic here.
#[derive(Debug, Clone)]
pub struct LxdClient {
    socket_path: PathBuf,
    request_timeout: Duration,
}

impl LxdClient {
    pub fn new(socket_path: impl Into<PathBuf>, request_timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            request_timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Checks that the API answers at all.
    pub async fn probe(&self) -> Result<()> {
        self.get::<serde_json::Value>("probe", "server", "/1.0".to_string())
            .await
            .map(|_| ())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &str,
        entity: &str,
        path: String,
    ) -> Result<T> {
        let body = tokio::time::timeout(self.request_timeout, self.fetch(operation, &path))
            .await
            .map_err(|_| SyncError::timeout(operation, self.request_timeout))??;
        decode_envelope(operation, entity, &body)
    }

    async fn fetch(&self, operation: &str, path: &str) -> Result<Bytes> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| transport_error(operation, e))?;
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| transport_error(operation, e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "LXD connection closed with error");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::HOST, LXD_HOST)
            .body(Empty::<Bytes>::new())
            .map_err(|e| transport_error(operation, e))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| transport_error(operation, e))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| transport_error(operation, e))?
            .to_bytes();
        debug!(path, status = status.as_u16(), bytes = body.len(), "LXD response");
        Ok(body)
    }
}

#[async_trait]
impl PlatformQuery for LxdClient {
    #[instrument(skip(self))]
    async fn get_network(&self, project: &str, name: &str) -> Result<Network> {
        self.get(
            "get_network",
            &format!("network {project}/{name}"),
            resource_path("networks", Some(name), project, &[]),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<String>> {
        let locators: Vec<String> = self
            .get("list_projects", "project list", "/1.0/projects".to_string())
            .await?;
        Ok(locators
            .iter()
            .filter_map(|locator| project_name(locator))
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_instances(&self, project: &str) -> Result<Vec<Instance>> {
        let mut instances: Vec<Instance> = self
            .get(
                "list_instances",
                &format!("instances of project {project}"),
                resource_path("instances", None, project, &[("recursion", "1")]),
            )
            .await?;
        for instance in &mut instances {
            if instance.project.is_empty() {
                instance.project = project.to_string();
            }
        }
        Ok(instances)
    }

    #[instrument(skip(self))]
    async fn get_instance(&self, project: &str, name: &str) -> Result<Instance> {
        let mut instance: Instance = self
            .get(
                "get_instance",
                &format!("instance {project}/{name}"),
                resource_path("instances", Some(name), project, &[]),
            )
            .await?;
        if instance.project.is_empty() {
            instance.project = project.to_string();
        }
        Ok(instance)
    }
}
