//! Aggregation node.
//!
//! A `Detective` owns a name, a transport and the targets registered on it.
//! Querying probes every target on its own task and merges the results
//! under the node's name. Registration takes `&mut self` and querying takes
//! `&self`, so targets cannot change while a query is in flight.
//!
//! Each node also carries a random instance id. Query trails record ids,
//! not names, so distinct nodes may share a name on one query path.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Uri};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dependency::{push_dependency, Dependency};
use crate::endpoint::Endpoint;
use crate::error::{DetectiveError, DetectiveResult};
use crate::probe::{fan_out, Probe};
use crate::state::{HealthState, Status};
use crate::trail::Trail;
use crate::transport::{Doer, HttpDoer};

/// Default bound on how many nodes a single query may pass through.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Manages registered dependencies and endpoints and reports their health.
pub struct Detective {
    name: String,
    id: String,
    client: Arc<dyn Doer>,
    dependencies: Vec<Arc<Dependency>>,
    endpoints: Vec<Arc<Endpoint>>,
    max_depth: usize,
}

impl Detective {
    /// Create a node with a fresh instance id. The name is only used in
    /// reports and need not be unique.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4().simple().to_string(),
            client: Arc::new(HttpDoer::new()),
            dependencies: Vec::new(),
            endpoints: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the transport used for endpoints registered after this call.
    pub fn with_client(mut self, client: impl Doer + 'static) -> Self {
        self.client = Arc::new(client);
        self
    }

    /// Same as [`with_client`](Self::with_client) for an already shared transport.
    pub fn with_shared_client(mut self, client: Arc<dyn Doer>) -> Self {
        self.client = client;
        self
    }

    /// Bound how many nodes a query may pass through before this node
    /// answers `too_deep`. Values below 1 are raised to 1 so a direct query
    /// always fans out.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance id stamped into the query trail.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Add a local dependency and return it for further configuration.
    /// Duplicate names are allowed and show up as duplicate siblings.
    pub fn register(&mut self, name: impl Into<String>) -> &mut Dependency {
        let dependency = push_dependency(&mut self.dependencies, name);
        debug!(node = %self.name, dependency = %dependency.name(), "dependency registered");
        dependency
    }

    /// Add a peer endpoint probed with a plain GET.
    pub fn register_endpoint(&mut self, url: &str) -> DetectiveResult<()> {
        let uri: Uri = url.parse().map_err(|source| DetectiveError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(DetectiveError::RelativeUrl(url.to_string()));
        }

        let mut req = Request::new(Bytes::new());
        *req.method_mut() = Method::GET;
        *req.uri_mut() = uri;
        self.register_endpoint_request(req);
        Ok(())
    }

    /// Add a peer endpoint from a fully prepared request.
    pub fn register_endpoint_request(&mut self, request: Request<Bytes>) {
        let endpoint = Endpoint::new(request, Arc::clone(&self.client));
        debug!(node = %self.name, method = %endpoint.method(), uri = %endpoint.uri(), "endpoint registered");
        self.endpoints.push(Arc::new(endpoint));
    }

    /// Probe every registered target and merge the results.
    pub async fn query_state(&self) -> HealthState {
        self.query_with(&Trail::new()).await
    }

    /// Probe every registered target, continuing an inbound query trail.
    ///
    /// Returns a childless `loop_detected` state if this node is already on
    /// the trail, or `too_deep` once the trail reaches the max depth.
    pub async fn query_with(&self, trail: &Trail) -> HealthState {
        if trail.contains(&self.id) {
            warn!(node = %self.name, id = %self.id, trail = ?trail.nodes(), "query loop detected");
            return HealthState::failed(
                &self.name,
                Status::LoopDetected,
                format!("{} is already on the query path", self.name),
            );
        }
        if trail.depth() >= self.max_depth {
            warn!(node = %self.name, depth = trail.depth(), max = self.max_depth, "query too deep");
            return HealthState::failed(
                &self.name,
                Status::TooDeep,
                format!("query passed through {} nodes (max {})", trail.depth(), self.max_depth),
            );
        }

        let targets: Vec<Arc<dyn Probe>> = self
            .dependencies
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn Probe>)
            .chain(self.endpoints.iter().map(|e| Arc::clone(e) as Arc<dyn Probe>))
            .collect();
        let total = targets.len();

        let states = fan_out(targets, &trail.extend(&self.id)).await;
        let healthy = states.iter().filter(|s| s.is_healthy()).count();
        info!(node = %self.name, total, healthy, "health state assembled");

        HealthState::new(&self.name).with_dependencies(states)
    }
}

impl fmt::Debug for Detective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detective")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("endpoints", &self.endpoints)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
