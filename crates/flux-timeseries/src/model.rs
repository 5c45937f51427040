use serde::{Deserialize, Serialize};

pub use flux_types::TelemetryPoint;

/// 聚合桶，每次查询时计算，不落库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryAggregationBucket {
    /// 桶起始时间（Unix 秒）
    pub bucket_start: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: i64,
}
