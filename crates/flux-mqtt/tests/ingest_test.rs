use async_trait::async_trait;
use flux_mqtt::{IngestClient, IngestError, TelemetryHandler, TelemetryPoint};
use flux_types::now_unix;
use std::sync::{Arc, Mutex};

/// 记录所有收到的数据点，可配置对某个指标返回错误
#[derive(Default)]
struct RecordingHandler {
    points: Mutex<Vec<TelemetryPoint>>,
    fail_metric: Option<String>,
}

impl RecordingHandler {
    fn failing_on(metric: &str) -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            fail_metric: Some(metric.to_string()),
        }
    }

    fn points(&self) -> Vec<TelemetryPoint> {
        self.points.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryHandler for RecordingHandler {
    async fn handle(&self, point: TelemetryPoint) -> anyhow::Result<()> {
        if self.fail_metric.as_deref() == Some(point.metric_name.as_str()) {
            anyhow::bail!("storage unavailable");
        }
        self.points.lock().unwrap().push(point);
        Ok(())
    }
}

fn client_with(handler: Arc<RecordingHandler>) -> IngestClient {
    IngestClient::builder()
        .shared_handler(handler)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_one_handler_call_per_metric() {
    let handler = Arc::new(RecordingHandler::default());
    let client = client_with(handler.clone());

    let before = now_unix();
    let payload = br#"{"metrics":[
        {"name":"temperature","value":21.5,"unit":"C"},
        {"name":"humidity","value":40,"unit":"%"}
    ]}"#;
    let handled = client
        .process_message("devices/sensor_001/telemetry", payload)
        .await;
    let after = now_unix();

    assert_eq!(handled, 2);
    let points = handler.points();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].metric_name, "temperature");
    assert_eq!(points[0].value, 21.5);
    assert_eq!(points[0].unit, "C");
    assert_eq!(points[1].metric_name, "humidity");
    assert_eq!(points[1].value, 40.0);

    for point in &points {
        assert_eq!(point.device_id, "sensor_001");
        assert!(point.timestamp >= before && point.timestamp <= after);
    }

    let stats = client.stats().snapshot();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.points_handled, 2);
}

#[tokio::test]
async fn test_payload_device_id_and_timestamp() {
    let handler = Arc::new(RecordingHandler::default());
    let client = client_with(handler.clone());

    let payload = br#"{"device_id":"meter_7b","timestamp":"2024-01-01T00:00:00Z",
        "metrics":[{"name":"voltage","value":3.3}]}"#;
    client
        .process_message("devices/meter_7/telemetry", payload)
        .await;

    let points = handler.points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].device_id, "meter_7b");
    assert_eq!(points[0].timestamp, 1_704_067_200);
    assert_eq!(points[0].unit, "");
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let handler = Arc::new(RecordingHandler::default());
    let client = client_with(handler.clone());

    assert_eq!(
        client
            .process_message("devices/sensor_001/telemetry", b"not json")
            .await,
        0
    );
    assert_eq!(
        client
            .process_message(
                "devices/sensor_001/status",
                br#"{"metrics":[{"name":"t","value":1}]}"#
            )
            .await,
        0
    );
    assert_eq!(
        client
            .process_message("devices//telemetry", br#"{"metrics":[]}"#)
            .await,
        0
    );

    assert!(handler.points().is_empty());
    let stats = client.stats().snapshot();
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.messages_malformed, 3);
}

#[tokio::test]
async fn test_handler_failure_does_not_stop_remaining_metrics() {
    let handler = Arc::new(RecordingHandler::failing_on("pressure"));
    let client = client_with(handler.clone());

    let payload = br#"{"metrics":[
        {"name":"temperature","value":20},
        {"name":"pressure","value":1013},
        {"name":"humidity","value":55}
    ]}"#;
    let handled = client
        .process_message("devices/sensor_002/telemetry", payload)
        .await;

    assert_eq!(handled, 2);
    let names: Vec<_> = handler
        .points()
        .into_iter()
        .map(|p| p.metric_name)
        .collect();
    assert_eq!(names, vec!["temperature", "humidity"]);
    assert_eq!(client.stats().snapshot().handler_failures, 1);

    // 后续消息照常处理
    client
        .process_message(
            "devices/sensor_002/telemetry",
            br#"{"metrics":[{"name":"temperature","value":21}]}"#,
        )
        .await;
    assert_eq!(handler.points().len(), 3);
}

#[tokio::test]
async fn test_closure_handler() {
    let seen = Arc::new(Mutex::new(0usize));
    let counter = seen.clone();

    let client = IngestClient::builder()
        .handler(move |_point: TelemetryPoint| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok::<(), anyhow::Error>(())
            }
        })
        .build()
        .unwrap();

    client
        .process_message(
            "devices/d1/telemetry",
            br#"{"metrics":[{"name":"a","value":1},{"name":"b","value":2}]}"#,
        )
        .await;
    assert_eq!(*seen.lock().unwrap(), 2);
}

#[test]
fn test_builder_without_handler_fails() {
    assert!(matches!(
        IngestClient::builder().build(),
        Err(IngestError::MissingHandler)
    ));
}
