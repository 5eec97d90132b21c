//! Remote endpoint probing.
//!
//! An endpoint holds a prepared request to a peer's query surface. Probing
//! sends it through the node's transport and decodes the peer's report.
//! Transport failures, non-2xx answers and undecodable bodies all produce a
//! childless state named after the endpoint URI instead of an error.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri, Version};
use tracing::{debug, warn};

use crate::probe::{BoxFuture, Probe};
use crate::state::{HealthState, Status};
use crate::trail::Trail;
use crate::transport::Doer;

/// A peer node's query surface, reached through a [`Doer`].
pub struct Endpoint {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    client: Arc<dyn Doer>,
}

impl Endpoint {
    /// Capture `request` for repeated sending. Request extensions are dropped.
    pub fn new(request: Request<Bytes>, client: Arc<dyn Doer>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            client,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    fn request(&self, trail: &Trail) -> Request<Bytes> {
        let mut req = Request::new(self.body.clone());
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers.clone();
        trail.stamp(req.headers_mut());
        req
    }

    async fn check(&self, trail: &Trail) -> HealthState {
        let label = self.label();

        let resp = match self.client.send(self.request(trail)).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(endpoint = %label, error = %e, "endpoint unreachable");
                return HealthState::failed(label, Status::Unreachable, e.to_string());
            }
        };

        if !resp.status().is_success() {
            warn!(endpoint = %label, status = %resp.status(), "endpoint returned non-2xx");
            return HealthState::failed(
                label,
                Status::BadResponse,
                format!("peer returned {}", resp.status()),
            );
        }

        match serde_json::from_slice::<HealthState>(resp.body()) {
            Ok(state) => {
                debug!(endpoint = %label, peer = %state.name, "endpoint probed");
                state
            }
            Err(e) => {
                warn!(endpoint = %label, error = %e, "endpoint returned an invalid report");
                HealthState::failed(label, Status::BadResponse, format!("invalid health report: {e}"))
            }
        }
    }
}

impl Probe for Endpoint {
    fn label(&self) -> String {
        self.uri.to_string()
    }

    fn probe<'a>(&'a self, trail: &'a Trail) -> BoxFuture<'a, HealthState> {
        Box::pin(self.check(trail))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}
