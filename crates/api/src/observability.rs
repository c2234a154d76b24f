use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "palaver_api_http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "palaver_api_http_request_duration_seconds";
const WS_CONNECTIONS_TOTAL: &str = "palaver_api_ws_connections_total";
const WS_EVENTS_TOTAL: &str = "palaver_api_ws_events_total";
const ROOM_BROADCASTS_TOTAL: &str = "palaver_api_room_broadcasts_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_http_request(method: &str, route: &str, status: StatusCode, elapsed: Duration) {
    let status_code = status.as_u16().to_string();
    let result = if status.is_server_error() {
        "error"
    } else {
        "success"
    };

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone(),
        "result" => result
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code
    )
    .record(elapsed.as_secs_f64());
}

pub fn register_ws_connection(channel: &'static str) {
    counter!(WS_CONNECTIONS_TOTAL, "channel" => channel).increment(1);
}

pub fn register_ws_event(channel: &'static str, event: &'static str, outcome: &'static str) {
    counter!(
        WS_EVENTS_TOTAL,
        "channel" => channel,
        "event" => event,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn register_room_broadcast(room_kind: &'static str, event: &'static str, receivers: usize) {
    counter!(
        ROOM_BROADCASTS_TOTAL,
        "room" => room_kind,
        "event" => event
    )
    .increment(receivers as u64);
}
