//! Local dependency probing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::probe::{fan_out, BoxFuture, Probe};
use crate::state::{HealthState, Status};
use crate::trail::Trail;

/// Async check attached to a dependency. `Err` carries the failure message.
pub type Detector = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// A named in-process component registered on a node.
///
/// A dependency with neither a detector nor nested dependencies is a healthy
/// leaf. Nested dependencies are probed concurrently, the same way a node
/// probes its own targets.
#[derive(Clone)]
pub struct Dependency {
    name: String,
    detector: Option<Detector>,
    dependencies: Vec<Arc<Dependency>>,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detector: None,
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a check run on every probe. Replaces any previous check.
    pub fn detect<F, Fut, E>(&mut self, check: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display,
    {
        self.detector = Some(Arc::new(move || -> BoxFuture<'static, Result<(), String>> {
            let fut = check();
            Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
        }));
        self
    }

    /// Nest a further dependency under this one and return it.
    pub fn register(&mut self, name: impl Into<String>) -> &mut Dependency {
        push_dependency(&mut self.dependencies, name)
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    async fn check(&self, trail: &Trail) -> HealthState {
        let mut state = HealthState::new(&self.name);

        if let Some(detector) = &self.detector {
            if let Err(e) = detector().await {
                warn!(dependency = %self.name, error = %e, "dependency check failed");
                state.status = Status::Unhealthy;
                state.error = Some(e);
            }
        }

        if !self.dependencies.is_empty() {
            let targets = self
                .dependencies
                .iter()
                .map(|d| Arc::clone(d) as Arc<dyn Probe>)
                .collect();
            state.dependencies = fan_out(targets, trail).await;
        }

        state
    }
}

impl Probe for Dependency {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn probe<'a>(&'a self, trail: &'a Trail) -> BoxFuture<'a, HealthState> {
        Box::pin(self.check(trail))
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("has_detector", &self.detector.is_some())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Append a new dependency and hand back a mutable reference to it.
///
/// The `Arc` is unshared at this point (registration needs `&mut`, queries
/// only hold clones while in flight), so `make_mut` does not copy.
pub(crate) fn push_dependency(
    dependencies: &mut Vec<Arc<Dependency>>,
    name: impl Into<String>,
) -> &mut Dependency {
    dependencies.push(Arc::new(Dependency::new(name)));
    let last = dependencies.len() - 1;
    Arc::make_mut(&mut dependencies[last])
}
