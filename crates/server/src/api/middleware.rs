//! Request accounting shared by every route.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};

use crate::metrics::{
    normalize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
};

/// Counts each request and times it, labelled by method, route and status.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let labels = RequestLabels::of(&request);
    let started = Instant::now();
    let _in_flight = InFlight::enter();

    let response = next.run(request).await;
    labels.record(response.status(), started.elapsed());
    response
}

/// Label values known before the handler runs.
struct RequestLabels {
    method: Method,
    route: String,
}

impl RequestLabels {
    fn of(request: &Request<Body>) -> Self {
        Self {
            method: request.method().clone(),
            route: normalize_path(request.uri().path()),
        }
    }

    fn record(&self, status: StatusCode, elapsed: Duration) {
        let status = status.as_u16().to_string();
        let values = [self.method.as_str(), self.route.as_str(), status.as_str()];
        HTTP_REQUEST_DURATION
            .with_label_values(&values)
            .observe(elapsed.as_secs_f64());
        HTTP_REQUESTS_TOTAL.with_label_values(&values).inc();
    }
}

/// Holds the in-flight gauge up until dropped, including when the client
/// goes away mid-request.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        HTTP_REQUESTS_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        HTTP_REQUESTS_IN_FLIGHT.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::post, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_requests_are_counted_by_route_and_status() {
        let app = Router::new()
            .route("/api/v1/environment", post(|| async { "ok" }))
            .layer(middleware::from_fn(metrics_middleware));
        let counter =
            HTTP_REQUESTS_TOTAL.with_label_values(&["POST", "/api/v1/environment", "200"]);
        let missing = HTTP_REQUESTS_TOTAL.with_label_values(&["POST", "/api/other", "404"]);
        let before = (counter.get(), missing.get());

        for uri in ["/api/v1/environment", "/api/v1/nope/42"] {
            let request = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }

        assert!(counter.get() >= before.0 + 1);
        assert!(missing.get() >= before.1 + 1);
        assert!(
            HTTP_REQUEST_DURATION
                .with_label_values(&["POST", "/api/v1/environment", "200"])
                .get_sample_count()
                >= 1
        );
    }
}
