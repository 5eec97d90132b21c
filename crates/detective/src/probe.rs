//! Probe capability and concurrent fan-out.
//!
//! Local dependencies and remote endpoints both implement [`Probe`], so the
//! fan-out below never branches on the kind of target. Each target runs on
//! its own tokio task and reports into a per-task slot; slots are assembled
//! only after every task has joined.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::state::{HealthState, Status};
use crate::trail::Trail;

/// Boxed, sendable future used at the trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that can answer "what is your health state?".
pub trait Probe: Send + Sync + 'static {
    /// Name used when the probe cannot produce a state of its own.
    fn label(&self) -> String;

    /// Produce a health state. Never fails; failures are encoded in the state.
    fn probe<'a>(&'a self, trail: &'a Trail) -> BoxFuture<'a, HealthState>;
}

/// Probe every target concurrently and return one state per target, in
/// target order.
pub(crate) async fn fan_out(targets: Vec<Arc<dyn Probe>>, trail: &Trail) -> Vec<HealthState> {
    let mut slots: Vec<Option<HealthState>> = vec![None; targets.len()];
    let mut labels = Vec::with_capacity(targets.len());
    let mut tasks = JoinSet::new();

    for (idx, target) in targets.into_iter().enumerate() {
        labels.push(target.label());
        let trail = trail.clone();
        tasks.spawn(async move { (idx, target.probe(&trail).await) });
    }

    debug!(targets = labels.len(), "probes launched");

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, state)) => slots[idx] = Some(state),
            Err(e) => warn!(error = %e, "probe task did not complete"),
        }
    }

    slots
        .into_iter()
        .zip(labels)
        .map(|(slot, label)| {
            slot.unwrap_or_else(|| {
                HealthState::failed(label, Status::Unhealthy, "probe task did not complete")
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl Probe for Fixed {
        fn label(&self) -> String {
            self.0.to_string()
        }

        fn probe<'a>(&'a self, _trail: &'a Trail) -> BoxFuture<'a, HealthState> {
            Box::pin(async move { HealthState::new(self.0) })
        }
    }

    struct Panics;

    impl Probe for Panics {
        fn label(&self) -> String {
            "panics".to_string()
        }

        fn probe<'a>(&'a self, _trail: &'a Trail) -> BoxFuture<'a, HealthState> {
            Box::pin(async move { blow_up() })
        }
    }

    fn blow_up() -> HealthState {
        panic!("probe blew up")
    }

    #[tokio::test]
    async fn fan_out_empty_returns_empty() {
        assert!(fan_out(Vec::new(), &Trail::new()).await.is_empty());
    }

    #[tokio::test]
    async fn fan_out_keeps_target_order() {
        let targets: Vec<Arc<dyn Probe>> =
            vec![Arc::new(Fixed("a")), Arc::new(Fixed("b")), Arc::new(Fixed("c"))];
        let names: Vec<_> = fan_out(targets, &Trail::new())
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();

        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn panicking_probe_still_contributes_a_slot() {
        let targets: Vec<Arc<dyn Probe>> = vec![Arc::new(Fixed("a")), Arc::new(Panics)];
        let states = fan_out(targets, &Trail::new()).await;

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].status, Status::Ok);
        assert_eq!(states[1].name, "panics");
        assert_eq!(states[1].status, Status::Unhealthy);
    }
}
