use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// 当前 Unix 时间（秒）
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// 时间戳能否表示为 chrono 的 UTC 时间
pub fn is_representable(timestamp: i64) -> bool {
    Utc.timestamp_opt(timestamp, 0).single().is_some()
}

/// 将 Unix 秒格式化为 RFC3339（UTC，`Z` 结尾）
///
/// 超出 chrono 可表示范围的时间戳退化为 Unix 纪元。
pub fn format_rfc3339(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 解析 RFC3339 时间为 Unix 秒，解析失败时返回 `fallback`
pub fn parse_rfc3339_or(value: &str, fallback: i64) -> i64 {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp())
        .unwrap_or(fallback)
}
