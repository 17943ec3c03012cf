use actix_web::{Responder, get, web};
use metrics_exporter_prometheus::PrometheusHandle;

/// Renders the Prometheus metrics collected so far.
#[get("/metrics")]
pub(crate) async fn metrics(metrics_handle: web::ThinData<PrometheusHandle>) -> impl Responder {
    metrics_handle.render()
}
