use crate::model::{TelemetryAggregationBucket, TelemetryPoint};
use crate::query::AggregationInterval;
use std::collections::BTreeMap;

/// 桶对齐原点：2000-01-03T00:00:00Z（周一），与 TimescaleDB `time_bucket` 默认原点一致。
/// 对小于一周的窗口，这与按 Unix 纪元对齐的结果相同。
pub const BUCKET_ORIGIN: i64 = 946_857_600;

/// 计算时间戳所在桶的起始时间
///
/// 在 i128 中计算，靠近 `i64::MIN` 的时间戳落入起点为 `i64::MIN` 的桶。
pub fn bucket_start(timestamp: i64, interval: AggregationInterval) -> i64 {
    let width = i128::from(interval.seconds());
    let origin = i128::from(BUCKET_ORIGIN);
    let start = origin + (i128::from(timestamp) - origin).div_euclid(width) * width;
    i64::try_from(start).unwrap_or(i64::MIN)
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: i64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self {
            sum: value,
            min: value,
            max: value,
            count: 1,
        }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count += 1;
    }
}

/// 按固定宽度窗口分桶，返回按桶起始时间降序排列的 avg/min/max/count
pub fn bucketize<'a, I>(points: I, interval: AggregationInterval) -> Vec<TelemetryAggregationBucket>
where
    I: IntoIterator<Item = &'a TelemetryPoint>,
{
    let mut buckets: BTreeMap<i64, Accumulator> = BTreeMap::new();

    for point in points {
        let start = bucket_start(point.timestamp, interval);
        buckets
            .entry(start)
            .and_modify(|acc| acc.add(point.value))
            .or_insert_with(|| Accumulator::new(point.value));
    }

    buckets
        .into_iter()
        .rev()
        .map(|(bucket_start, acc)| TelemetryAggregationBucket {
            bucket_start,
            avg: acc.sum / acc.count as f64,
            min: acc.min,
            max: acc.max,
            count: acc.count,
        })
        .collect()
}
