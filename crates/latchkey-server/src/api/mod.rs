//! HTTP API handlers

pub mod cache;
pub mod session;

use actix_web::{HttpResponse, get, web};
use metrics_exporter_prometheus::PrometheusHandle;

/// Prometheus scrape endpoint
#[get("/metrics")]
pub async fn render_metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

/// Session and cache routes
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(session::configure).configure(cache::configure);
}
