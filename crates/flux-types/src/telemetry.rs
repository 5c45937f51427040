use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::time::{format_rfc3339, now_unix, parse_rfc3339_or};

/// 设备遥测数据点
///
/// 写入存储后不可变，本系统不会更新或删除已持久化的数据点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub device_id: String,
    pub metric_name: String,
    pub value: f64,
    /// 单位，可以为空字符串
    #[serde(default)]
    pub unit: String,
    /// Unix 时间（秒）
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl TelemetryPoint {
    pub fn new(device_id: impl Into<String>, metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            device_id: device_id.into(),
            metric_name: metric_name.into(),
            value,
            unit: String::new(),
            timestamp: now_unix(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 扇出事件，发布在 `{prefix}:{device_id}` 频道上
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub device_id: String,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    /// RFC3339 时间，缺失时按解析失败处理
    #[serde(default)]
    pub timestamp: String,
}

impl TelemetryEvent {
    pub fn from_point(point: &TelemetryPoint) -> Self {
        Self {
            device_id: point.device_id.clone(),
            metric_name: point.metric_name.clone(),
            value: point.value,
            unit: point.unit.clone(),
            timestamp: format_rfc3339(point.timestamp),
        }
    }

    /// 还原为数据点；时间解析失败时使用 `received_at`
    pub fn into_point(self, received_at: i64) -> TelemetryPoint {
        let timestamp = parse_rfc3339_or(&self.timestamp, received_at);
        TelemetryPoint {
            device_id: self.device_id,
            metric_name: self.metric_name,
            value: self.value,
            unit: self.unit,
            timestamp,
            metadata: HashMap::new(),
        }
    }
}
