//! Query surface: axum router that serves a node's health report.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Run a query and return the JSON report |
//!
//! The inbound `x-detective-trail` headers are honored so that peers
//! querying each other in a cycle terminate.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tracing::error;

use crate::node::Detective;
use crate::trail::Trail;

/// Path mounted by [`router`].
pub const DEFAULT_PATH: &str = "/health";

/// Build a router serving `detective` at [`DEFAULT_PATH`].
pub fn router(detective: Arc<Detective>) -> Router {
    router_at(DEFAULT_PATH, detective)
}

/// Build a router serving `detective` at `path` (must start with `/`).
pub fn router_at(path: &str, detective: Arc<Detective>) -> Router {
    Router::new()
        .route(path, get(query_state))
        .with_state(detective)
}

/// GET /health
pub async fn query_state(State(detective): State<Arc<Detective>>, headers: HeaderMap) -> Response {
    let trail = Trail::from_headers(&headers);
    let state = detective.query_with(&trail).await;
    render(&state)
}

/// Serialize `value` as a 200 JSON response, or an empty 500 on failure.
fn render<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => ([(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize health state");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::state::{HealthState, Status};
    use crate::trail::TRAIL_HEADER;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    fn node() -> Arc<Detective> {
        let mut detective = Detective::new("A");
        detective.register("db");
        Arc::new(detective)
    }

    async fn body_state(resp: Response) -> HealthState {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn serves_report_as_json() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = router(node()).oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");

        let state = body_state(resp).await;
        assert_eq!(state.name, "A");
        assert_eq!(state.dependencies, vec![HealthState::new("db")]);
    }

    #[tokio::test]
    async fn custom_path() {
        let app = router_at("/_detective", node());

        let req = Request::builder().uri("/_detective").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inbound_trail_is_honored() {
        let node = node();
        let req = Request::builder()
            .uri("/health")
            .header(TRAIL_HEADER, "B")
            .header(TRAIL_HEADER, node.id())
            .body(Body::empty())
            .unwrap();
        let resp = router(node).oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let state = body_state(resp).await;
        assert_eq!(state.status, Status::LoopDetected);
        assert!(state.dependencies.is_empty());
    }

    #[tokio::test]
    async fn serialization_failure_is_empty_500() {
        let resp = render(&Unserializable);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
}
