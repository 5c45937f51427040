/// 遥测主题前缀
pub const TOPIC_PREFIX: &str = "devices";

/// 遥测主题后缀
pub const TOPIC_SUFFIX: &str = "telemetry";

/// 默认订阅的主题过滤器
pub const DEFAULT_TOPIC_FILTER: &str = "devices/+/telemetry";

/// 从主题中提取设备 ID
///
/// 只接受严格的 `devices/{device_id}/telemetry` 形式，设备 ID 不能为空。
pub fn extract_device_id(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(TOPIC_PREFIX), Some(device_id), Some(TOPIC_SUFFIX), None) if !device_id.is_empty() => {
            Some(device_id)
        }
        _ => None,
    }
}

/// 构建设备遥测主题
pub fn telemetry_topic(device_id: &str) -> String {
    format!("{}/{}/{}", TOPIC_PREFIX, device_id, TOPIC_SUFFIX)
}
