use metrics::{counter, describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// 初始化 Prometheus metrics exporter
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    // 描述所有指标
    describe_metrics();

    tracing::info!("Metrics exporter started on http://{}/metrics", addr);
    Ok(())
}

/// 描述所有指标
fn describe_metrics() {
    // 接入
    describe_counter!(
        "flux_ingest_messages_total",
        "Total number of MQTT telemetry messages received"
    );
    describe_counter!(
        "flux_ingest_malformed_total",
        "Messages dropped because of a bad topic or payload"
    );
    describe_counter!(
        "flux_ingest_points_total",
        "Metrics handled successfully by the ingest pipeline"
    );
    describe_counter!(
        "flux_ingest_handler_failures_total",
        "Metrics the ingest pipeline failed to handle"
    );
    describe_counter!(
        "flux_ingest_connections_total",
        "MQTT sessions established, including reconnects"
    );
    describe_counter!(
        "flux_ingest_connection_errors_total",
        "MQTT connection errors"
    );

    // 写入与分发
    describe_counter!(
        "flux_pipeline_rejected_total",
        "Points rejected before the store write"
    );
    describe_counter!(
        "flux_pipeline_publish_failures_total",
        "Fan-out publishes that failed after a successful store write"
    );

    // 中继与订阅代理
    describe_counter!(
        "flux_relay_events_total",
        "Telemetry events received by the relay"
    );
    describe_counter!(
        "flux_relay_decode_errors_total",
        "Relay events that failed to decode"
    );
    describe_counter!(
        "flux_broker_dropped_total",
        "Points dropped because a subscriber queue was full"
    );
    describe_gauge!("flux_broker_subscribers", "Registered subscriber queues");

    // HTTP API
    describe_counter!("flux_http_requests_total", "Total number of HTTP requests");
}

/// 记录写入前被拒绝的数据点
pub fn record_point_rejected() {
    counter!("flux_pipeline_rejected_total", 1);
}

/// 记录分发失败
pub fn record_publish_failure() {
    counter!("flux_pipeline_publish_failures_total", 1);
}

/// 记录 HTTP 请求
pub fn record_http_request(route: &'static str) {
    counter!("flux_http_requests_total", 1, "route" => route);
}
