use crate::error::{IngestError, Result};
use crate::topic::extract_device_id;
use chrono::DateTime;
use flux_types::TelemetryPoint;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// 设备上报的 JSON 负载
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryMessage {
    #[serde(default)]
    pub device_id: Option<String>,

    /// RFC3339 时间，缺失或无法解析时使用接收时间
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// 单个指标
#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// 解析一条 MQTT 消息，每个指标对应一个数据点
///
/// `received_at` 为接收时间（Unix 秒），用于替代缺失或非法的时间戳。
pub fn parse_message(topic: &str, payload: &[u8], received_at: i64) -> Result<Vec<TelemetryPoint>> {
    let topic_device_id =
        extract_device_id(topic).ok_or_else(|| IngestError::TopicMismatch(topic.to_string()))?;

    let message: TelemetryMessage = serde_json::from_slice(payload)?;

    let device_id = match message.device_id {
        Some(id) if !id.is_empty() => id,
        _ => topic_device_id.to_string(),
    };

    let timestamp = match message.timestamp.as_deref() {
        Some(ts) if !ts.is_empty() => match DateTime::parse_from_rfc3339(ts) {
            Ok(parsed) => parsed.timestamp(),
            Err(e) => {
                warn!(timestamp = %ts, error = %e, "Invalid timestamp format, using current time");
                received_at
            }
        },
        _ => received_at,
    };

    let points = message
        .metrics
        .into_iter()
        .map(|metric| TelemetryPoint {
            device_id: device_id.clone(),
            metric_name: metric.name,
            value: metric.value,
            unit: metric.unit.unwrap_or_default(),
            timestamp,
            metadata: metric.metadata.unwrap_or_default(),
        })
        .collect();

    Ok(points)
}
