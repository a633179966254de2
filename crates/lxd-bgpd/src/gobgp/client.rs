//! gRPC client for the GoBGP API and the route publisher built on it

use super::api::{
    method, unicast_path, AddPathRequest, AddPathResponse, DeletePathRequest, TABLE_TYPE_GLOBAL,
};
use crate::error::{Result, SyncError};
use crate::publisher::{RouteHandle, RoutePublisher};
use async_trait::async_trait;
use lxd_bgp_types::{IpAddress, IpPrefix};
use std::time::Duration;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, instrument};

/// Default GoBGP gRPC endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:50051";

/// GoBGP's answer to DeletePath for a UUID it does not hold.
const PATH_NOT_FOUND: &str = "can't find a specified path";

/// Returns true if a withdraw failed only because the path is already gone.
fn is_path_gone(status: &Status) -> bool {
    status.code() == Code::NotFound || status.message().contains(PATH_NOT_FOUND)
}

/// Thin unary client for `apipb.GobgpApi`.
#[derive(Debug, Clone)]
pub struct GobgpClient {
    grpc: Grpc<Channel>,
    endpoint: String,
}

impl GobgpClient {
    /// Connects to the GoBGP daemon.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a malformed endpoint and `Speaker` if the
    /// daemon cannot be reached.
    pub async fn connect(
        endpoint: &str,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| SyncError::invalid_config("gobgp.endpoint", e.to_string()))?
            .connect_timeout(connect_timeout)
            .timeout(call_timeout)
            .connect()
            .await
            .map_err(|e| SyncError::speaker(format!("cannot connect to GoBGP at {endpoint}: {e}")))?;

        debug!(endpoint, "Connected to GoBGP");
        Ok(Self {
            grpc: Grpc::new(channel),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issues one unary call.
    pub(crate) async fn unary<Req, Resp>(
        &self,
        path: &'static str,
        request: Req,
    ) -> std::result::Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("GoBGP service not ready: {e}")))?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        grpc.unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await
        .map(tonic::Response::into_inner)
    }
}

/// Publishes routes into GoBGP's global RIB.
#[derive(Debug, Clone)]
pub struct GobgpPublisher {
    client: GobgpClient,
}

impl GobgpPublisher {
    pub fn new(client: GobgpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoutePublisher for GobgpPublisher {
    #[instrument(skip_all, fields(prefix = %prefix, nexthop = %nexthop))]
    async fn publish(&self, prefix: &IpPrefix, nexthop: &IpAddress) -> Result<RouteHandle> {
        let request = AddPathRequest {
            table_type: TABLE_TYPE_GLOBAL,
            vrf_id: String::new(),
            path: Some(unicast_path(prefix, nexthop)),
        };

        let response: AddPathResponse = self
            .client
            .unary(method::ADD_PATH, request)
            .await
            .map_err(|status| SyncError::publisher("publish", status.message()))?;

        if response.uuid.is_empty() {
            return Err(SyncError::publisher("publish", "GoBGP returned no path UUID"));
        }
        Ok(RouteHandle::new(response.uuid))
    }

    #[instrument(skip_all, fields(handle = %handle))]
    async fn withdraw(&self, handle: &RouteHandle) -> Result<()> {
        let request = DeletePathRequest {
            table_type: TABLE_TYPE_GLOBAL,
            uuid: handle.as_bytes().to_vec(),
            ..Default::default()
        };

        match self.client.unary::<_, ()>(method::DELETE_PATH, request).await {
            Ok(()) => Ok(()),
            // An earlier, timed-out attempt may already have removed it.
            Err(status) if is_path_gone(&status) => {
                debug!("Path already absent from GoBGP");
                Ok(())
            }
            Err(status) => Err(SyncError::publisher("withdraw", status.message())),
        }
    }
}
