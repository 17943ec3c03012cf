use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use parking_lot::{Mutex, const_mutex};
use std::time::Duration;
use tracing::trace;

/// Interval between two upkeep passes of the recorder.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

// Installing the recorder is fallible and may only happen once per process,
// while tests build many applications. A mutex guards the installed handle.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = const_mutex(None);

/// Installs the global Prometheus recorder, or returns the installed one.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE.lock();

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            trace!("running metrics upkeep");
            upkeep_handle.run_upkeep();
        }
    });

    Ok(handle)
}
