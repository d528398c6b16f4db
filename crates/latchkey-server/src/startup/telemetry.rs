//! Metrics recorder bootstrap

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and register metric descriptions.
///
/// Must be called once; the returned handle renders the `/metrics` page.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;
    latchkey_core::metrics::describe_metrics();
    tracing::info!("Metrics initialized");
    Ok(handle)
}
