//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format, or an empty body without a recorder.
pub fn render(handle: Option<&PrometheusHandle>) -> String {
    handle.map(PrometheusHandle::render).unwrap_or_default()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// URL submissions total (counter, labels: outcome).
pub const SUBMISSIONS_TOTAL: &str = "submissions_total";
/// Shortcodes minted total (counter).
pub const SHORTCODES_CREATED_TOTAL: &str = "shortcodes_created_total";
/// Notifications recorded as pending (counter).
pub const NOTIFICATIONS_ENQUEUED_TOTAL: &str = "notifications_enqueued_total";
/// Channel writes attempted (counter).
pub const DELIVERY_ATTEMPTS_TOTAL: &str = "delivery_attempts_total";
/// Channel writes that failed (counter).
pub const DELIVERY_FAILURES_TOTAL: &str = "delivery_failures_total";
/// Retry sequences that ran out of attempts (counter).
pub const DELIVERY_EXHAUSTED_TOTAL: &str = "delivery_exhausted_total";
/// Deliveries parked because no channel was bound (counter).
pub const DELIVERY_DEFERRED_TOTAL: &str = "delivery_deferred_total";
/// Replays started on reconnect (counter).
pub const REPLAYS_TOTAL: &str = "replays_total";
/// Acknowledgements that cleared a pending notification (counter).
pub const ACKNOWLEDGEMENTS_TOTAL: &str = "acknowledgements_total";
/// Sessions removed by the idle sweep (counter).
pub const SESSIONS_EVICTED_TOTAL: &str = "sessions_evicted_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_recorder_is_empty() {
        assert!(render(None).is_empty());
    }

    #[test]
    fn render_local_recorder() {
        // Local recorder, no global install, to avoid test conflicts.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(REPLAYS_TOTAL).increment(2);
        });
        assert!(render(Some(&handle)).contains(REPLAYS_TOTAL));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            SUBMISSIONS_TOTAL,
            SHORTCODES_CREATED_TOTAL,
            NOTIFICATIONS_ENQUEUED_TOTAL,
            DELIVERY_ATTEMPTS_TOTAL,
            DELIVERY_FAILURES_TOTAL,
            DELIVERY_EXHAUSTED_TOTAL,
            DELIVERY_DEFERRED_TOTAL,
            REPLAYS_TOTAL,
            ACKNOWLEDGEMENTS_TOTAL,
            SESSIONS_EVICTED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
