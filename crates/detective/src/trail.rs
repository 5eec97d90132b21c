//! Query trail carried between nodes.
//!
//! Every node a query passes through appends its instance id. A peer
//! receives the trail as repeated `x-detective-trail` header values and
//! refuses to fan out again if its own id is already present, which breaks
//! cycles in the endpoint graph. Ids are per instance, so two nodes that
//! share a name are still told apart.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Header carrying one node id per value.
pub const TRAIL_HEADER: HeaderName = HeaderName::from_static("x-detective-trail");

/// Ordered list of node ids a query has already visited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trail {
    nodes: Vec<String>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes already visited.
    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n == id)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// A copy of this trail with `id` appended.
    pub fn extend(&self, id: &str) -> Trail {
        let mut nodes = self.nodes.clone();
        nodes.push(id.to_string());
        Trail { nodes }
    }

    /// Read the trail from inbound request headers.
    pub fn from_headers(headers: &HeaderMap) -> Trail {
        let nodes = headers
            .get_all(&TRAIL_HEADER)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        Trail { nodes }
    }

    /// Replace any trail headers in `headers` with this trail.
    pub fn stamp(&self, headers: &mut HeaderMap) {
        headers.remove(&TRAIL_HEADER);
        for id in &self.nodes {
            match HeaderValue::from_bytes(id.as_bytes()) {
                Ok(value) => {
                    headers.append(TRAIL_HEADER, value);
                }
                Err(_) => debug!(node = %id, "node id is not a valid header value, skipped from trail"),
            }
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Trail {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Trail {
            nodes: iter.into_iter().map(Into::into).collect(),
        }
    }
}
