//! Request latency metrics, exposed at `/metrics` in Prometheus text
//! format. Ambient observability, not an admission API feature.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::{routing, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn layer(router: Router) -> Router {
    let handle = install_recorder();
    router
        .route("/metrics", routing::get(move || std::future::ready(handle.render())))
        .layer(middleware::from_fn(track_http_metrics))
}

fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

async fn track_http_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().clone();

    let response = next.run(req).await;

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("scheduler_api_requests_total", &labels).increment(1);
    metrics::histogram!("scheduler_api_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}
