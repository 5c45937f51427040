use crate::metrics;
use anyhow::{bail, Context};
use async_trait::async_trait;
use flux_mqtt::TelemetryHandler;
use flux_relay::SharedPublisher;
use flux_timeseries::SharedStore;
use flux_types::TelemetryPoint;
use tracing::{debug, warn};

/// 接入处理链：写入存储，成功后发布事件
///
/// 存储写入是持久化边界，发布失败只记录日志，不回滚写入。
pub struct TelemetryPipeline {
    store: SharedStore,
    publisher: SharedPublisher,
}

impl TelemetryPipeline {
    pub fn new(store: SharedStore, publisher: SharedPublisher) -> Self {
        Self { store, publisher }
    }
}

#[async_trait]
impl TelemetryHandler for TelemetryPipeline {
    async fn handle(&self, point: TelemetryPoint) -> anyhow::Result<()> {
        if let Err(e) = validate_point(&point) {
            metrics::record_point_rejected();
            return Err(e);
        }

        self.store.insert_telemetry(&point).await.with_context(|| {
            format!(
                "failed to store {}/{}",
                point.device_id, point.metric_name
            )
        })?;

        debug!(
            device_id = %point.device_id,
            metric = %point.metric_name,
            value = point.value,
            timestamp = point.timestamp,
            "Stored telemetry"
        );

        if let Err(e) = self.publisher.publish_telemetry(&point).await {
            metrics::record_publish_failure();
            warn!(
                device_id = %point.device_id,
                metric = %point.metric_name,
                error = %e,
                "Failed to publish telemetry event"
            );
        }

        Ok(())
    }
}

/// 存储层不校验，写入前在这里拦截
fn validate_point(point: &TelemetryPoint) -> anyhow::Result<()> {
    if point.device_id.is_empty() {
        bail!("device_id is empty");
    }
    if point.metric_name.is_empty() {
        bail!("metric name is empty for device {}", point.device_id);
    }
    if !point.value.is_finite() {
        bail!(
            "non-finite value {} for {}/{}",
            point.value,
            point.device_id,
            point.metric_name
        );
    }
    Ok(())
}
