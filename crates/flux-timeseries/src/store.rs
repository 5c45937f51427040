use crate::error::Result;
use crate::model::{TelemetryAggregationBucket, TelemetryPoint};
use async_trait::async_trait;
use std::sync::Arc;

/// 时序数据存储 trait
///
/// 后端在构造时由配置决定（TimescaleDB 或内存实现），调用方只依赖此接口。
/// 重复或乱序的时间戳都不是错误，写入不做去重。
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// 写入单个数据点
    async fn insert_telemetry(&self, point: &TelemetryPoint) -> Result<()>;

    /// 在一个执行单元内批量写入，遇到第一个错误即中止并返回
    async fn insert_batch(&self, points: &[TelemetryPoint]) -> Result<()>;

    /// 查询 `from <= time <= to` 的数据点，按时间降序；`limit` 经 [`crate::clamp_limit`] 规范化
    async fn get_telemetry(
        &self,
        device_id: &str,
        metric_name: &str,
        from: i64,
        to: i64,
        limit: i64,
    ) -> Result<Vec<TelemetryPoint>>;

    /// 按窗口聚合；窗口不在允许集合内时按 1 小时处理
    async fn get_telemetry_aggregated(
        &self,
        device_id: &str,
        metric_name: &str,
        from: i64,
        to: i64,
        interval: &str,
    ) -> Result<Vec<TelemetryAggregationBucket>>;

    /// 最新值，优先走缓存表；从未记录过时返回 `StoreError::NotFound`
    async fn get_latest_metric(&self, device_id: &str, metric_name: &str) -> Result<TelemetryPoint>;

    /// 设备记录过的指标名，升序去重；没有数据时返回空列表
    async fn get_device_metrics(&self, device_id: &str) -> Result<Vec<String>>;

    /// 释放连接池等资源
    async fn close(&self) -> Result<()>;
}

pub type SharedStore = Arc<dyn TelemetryStore>;
