//! detective: composable health-state aggregation.
//!
//! A node reports its own health plus the health of everything it depends
//! on: in-process dependencies and peer nodes reached over HTTP. Peers are
//! queried through the same surface this crate serves, so a deployment
//! forms a tree of recursive probes.
//!
//! # Architecture
//!
//! ```text
//! Detective (name, id, transport)
//!   ├── Dependency ── optional detector, nested Dependency …
//!   ├── Endpoint ──── Doer::send → peer /health → HealthState
//!   └── query_state()
//!         ├── one tokio task per target (Probe trait)
//!         ├── per-task result slots, joined
//!         └── HealthState { Name, Status, Error?, Dependencies }
//! ```
//!
//! # Failures
//!
//! Probes never fail. An unreachable peer, a non-2xx answer, an undecodable
//! report or a failing detector each become a child state with a non-`ok`
//! [`Status`], so every registered target appears in the report exactly once.
//!
//! Queries carry a trail of visited node instance ids (`x-detective-trail`).
//! A node that finds its own id on the trail answers `loop_detected` instead
//! of fanning out, and a trail longer than the node's max depth answers
//! `too_deep`. Names only label reports, so peers may share them.
//! There are no timeouts: a stalled peer stalls the query.

pub mod dependency;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod node;
pub mod probe;
pub mod state;
pub mod trail;
pub mod transport;

pub use dependency::Dependency;
pub use endpoint::Endpoint;
pub use error::{DetectiveError, DetectiveResult, TransportError};
pub use handler::{router, router_at};
pub use node::{Detective, DEFAULT_MAX_DEPTH};
pub use probe::{BoxFuture, Probe};
pub use state::{HealthState, Status};
pub use trail::{Trail, TRAIL_HEADER};
pub use transport::{Doer, HttpDoer};
