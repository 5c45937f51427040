use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// 默认返回条数
pub const DEFAULT_LIMIT: i64 = 1000;

/// 返回条数上限
pub const MAX_LIMIT: i64 = 10_000;

/// 规范化查询条数：0 或超出 [1, 10000] 时取默认值 1000
pub fn clamp_limit(limit: i64) -> i64 {
    if (1..=MAX_LIMIT).contains(&limit) {
        limit
    } else {
        DEFAULT_LIMIT
    }
}

/// 聚合时间窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationInterval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    SixHours,
    TwelveHours,
    OneDay,
    OneWeek,
}

impl AggregationInterval {
    pub const ALL: [AggregationInterval; 9] = [
        AggregationInterval::OneMinute,
        AggregationInterval::FiveMinutes,
        AggregationInterval::FifteenMinutes,
        AggregationInterval::ThirtyMinutes,
        AggregationInterval::OneHour,
        AggregationInterval::SixHours,
        AggregationInterval::TwelveHours,
        AggregationInterval::OneDay,
        AggregationInterval::OneWeek,
    ];

    /// 解析窗口字符串，例如 `"5 minutes"`
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_str() == value.trim())
    }

    /// 解析窗口字符串，不在允许集合内时退化为 1 小时
    pub fn resolve(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| {
            warn!(interval = %value, "Unsupported aggregation interval, falling back to 1 hour");
            AggregationInterval::OneHour
        })
    }

    /// TimescaleDB interval 字面量
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationInterval::OneMinute => "1 minute",
            AggregationInterval::FiveMinutes => "5 minutes",
            AggregationInterval::FifteenMinutes => "15 minutes",
            AggregationInterval::ThirtyMinutes => "30 minutes",
            AggregationInterval::OneHour => "1 hour",
            AggregationInterval::SixHours => "6 hours",
            AggregationInterval::TwelveHours => "12 hours",
            AggregationInterval::OneDay => "1 day",
            AggregationInterval::OneWeek => "1 week",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            AggregationInterval::OneMinute => 60,
            AggregationInterval::FiveMinutes => 5 * 60,
            AggregationInterval::FifteenMinutes => 15 * 60,
            AggregationInterval::ThirtyMinutes => 30 * 60,
            AggregationInterval::OneHour => 3600,
            AggregationInterval::SixHours => 6 * 3600,
            AggregationInterval::TwelveHours => 12 * 3600,
            AggregationInterval::OneDay => 86_400,
            AggregationInterval::OneWeek => 7 * 86_400,
        }
    }
}

impl Default for AggregationInterval {
    fn default() -> Self {
        AggregationInterval::OneHour
    }
}

impl fmt::Display for AggregationInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
