use crate::aggregate::bucketize;
use crate::error::{Result, StoreError};
use crate::model::{TelemetryAggregationBucket, TelemetryPoint};
use crate::query::{clamp_limit, AggregationInterval};
use crate::store::TelemetryStore;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

type SeriesKey = (String, String);

/// 内存时序存储（用于开发和测试）
pub struct MemoryStore {
    /// 序列 -> 按写入顺序保存的数据点
    series: RwLock<HashMap<SeriesKey, Vec<TelemetryPoint>>>,

    /// 最新值缓存
    latest: RwLock<HashMap<SeriesKey, TelemetryPoint>>,

    latest_cache_enabled: bool,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
            latest_cache_enabled: true,
            closed: AtomicBool::new(false),
        }
    }

    /// 不维护最新值缓存，`get_latest_metric` 总是走回退路径
    pub fn without_latest_cache() -> Self {
        Self {
            latest_cache_enabled: false,
            ..Self::new()
        }
    }

    /// 已保存的数据点总数
    pub async fn len(&self) -> usize {
        self.series.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn key(device_id: &str, metric_name: &str) -> SeriesKey {
        (device_id.to_string(), metric_name.to_string())
    }

    async fn range(&self, device_id: &str, metric_name: &str, from: i64, to: i64) -> Vec<TelemetryPoint> {
        let series = self.series.read().await;
        series
            .get(&Self::key(device_id, metric_name))
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= from && p.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn append(&self, point: &TelemetryPoint) {
        let key = Self::key(&point.device_id, &point.metric_name);

        if self.latest_cache_enabled {
            let mut latest = self.latest.write().await;
            let newer = latest
                .get(&key)
                .map_or(true, |current| point.timestamp >= current.timestamp);
            if newer {
                latest.insert(key.clone(), point.clone());
            }
        }

        self.series
            .write()
            .await
            .entry(key)
            .or_default()
            .push(point.clone());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn insert_telemetry(&self, point: &TelemetryPoint) -> Result<()> {
        self.ensure_open()?;
        self.append(point).await;
        Ok(())
    }

    async fn insert_batch(&self, points: &[TelemetryPoint]) -> Result<()> {
        self.ensure_open()?;
        for point in points {
            self.append(point).await;
        }
        debug!(count = points.len(), "Batch written to memory store");
        Ok(())
    }

    async fn get_telemetry(
        &self,
        device_id: &str,
        metric_name: &str,
        from: i64,
        to: i64,
        limit: i64,
    ) -> Result<Vec<TelemetryPoint>> {
        self.ensure_open()?;
        let mut points = self.range(device_id, metric_name, from, to).await;
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        points.truncate(clamp_limit(limit) as usize);
        Ok(points)
    }

    async fn get_telemetry_aggregated(
        &self,
        device_id: &str,
        metric_name: &str,
        from: i64,
        to: i64,
        interval: &str,
    ) -> Result<Vec<TelemetryAggregationBucket>> {
        self.ensure_open()?;
        let interval = AggregationInterval::resolve(interval);
        let points = self.range(device_id, metric_name, from, to).await;
        Ok(bucketize(&points, interval))
    }

    async fn get_latest_metric(&self, device_id: &str, metric_name: &str) -> Result<TelemetryPoint> {
        self.ensure_open()?;
        let key = Self::key(device_id, metric_name);

        if let Some(point) = self.latest.read().await.get(&key) {
            return Ok(point.clone());
        }

        debug!(device_id = %device_id, metric_name = %metric_name, "Latest cache miss");
        self.get_telemetry(device_id, metric_name, i64::MIN, i64::MAX, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(device_id, metric_name))
    }

    async fn get_device_metrics(&self, device_id: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let series = self.series.read().await;
        let names: BTreeSet<&String> = series
            .keys()
            .filter(|(device, _)| device == device_id)
            .map(|(_, metric)| metric)
            .collect();
        Ok(names.into_iter().cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
