use flux_timeseries::{
    AggregationInterval, MemoryStore, StoreError, TelemetryPoint, TelemetryStore, DEFAULT_LIMIT,
};
use std::collections::HashMap;

const BASE: i64 = 1_700_000_100 - 1_700_000_100 % 3600;

fn point(metric: &str, value: f64, ts: i64) -> TelemetryPoint {
    TelemetryPoint::new("dev-1", metric, value)
        .with_unit("C")
        .with_timestamp(ts)
}

/// 同一 5 分钟窗口内的三个点聚合为一个桶
#[tokio::test]
async fn test_aggregate_single_window() {
    let store = MemoryStore::new();
    store
        .insert_batch(&[
            point("temperature", 20.0, BASE + 10),
            point("temperature", 22.0, BASE + 70),
            point("temperature", 24.0, BASE + 130),
        ])
        .await
        .unwrap();

    let buckets = store
        .get_telemetry_aggregated("dev-1", "temperature", BASE, BASE + 3600, "5 minutes")
        .await
        .unwrap();

    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].bucket_start, BASE);
    assert_eq!(buckets[0].avg, 22.0);
    assert_eq!(buckets[0].min, 20.0);
    assert_eq!(buckets[0].max, 24.0);
    assert_eq!(buckets[0].count, 3);
}

/// 极端时间戳参与聚合不会溢出
#[tokio::test]
async fn test_aggregate_extreme_timestamps() {
    let store = MemoryStore::new();
    store
        .insert_batch(&[
            point("temperature", 1.0, i64::MIN),
            point("temperature", 2.0, BASE),
            point("temperature", 3.0, i64::MAX),
        ])
        .await
        .unwrap();

    let buckets = store
        .get_telemetry_aggregated("dev-1", "temperature", i64::MIN, i64::MAX, "1 week")
        .await
        .unwrap();

    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[2].bucket_start, i64::MIN);
    assert_eq!(buckets[2].count, 1);
    assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 3);
}

/// 不支持的窗口按 1 小时处理，而不是报错
#[tokio::test]
async fn test_invalid_interval_falls_back_to_one_hour() {
    let store = MemoryStore::new();
    for i in 0..6 {
        store
            .insert_telemetry(&point("temperature", i as f64, BASE + i * 1200))
            .await
            .unwrap();
    }

    let fallback = store
        .get_telemetry_aggregated("dev-1", "temperature", BASE, BASE + 7200, "3 minutes")
        .await
        .unwrap();
    let hourly = store
        .get_telemetry_aggregated(
            "dev-1",
            "temperature",
            BASE,
            BASE + 7200,
            AggregationInterval::OneHour.as_str(),
        )
        .await
        .unwrap();

    assert_eq!(fallback, hourly);
    assert_eq!(fallback.len(), 2);
    assert_eq!(fallback[0].bucket_start, BASE + 3600);
    assert_eq!(fallback[1].bucket_start, BASE);
    assert_eq!(fallback[1].count, 3);
}

#[tokio::test]
async fn test_latest_not_found() {
    let store = MemoryStore::new();
    let err = store
        .get_latest_metric("dev-1", "temperature")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_latest_prefers_newest_timestamp() {
    for store in [MemoryStore::new(), MemoryStore::without_latest_cache()] {
        store.insert_telemetry(&point("temperature", 1.0, BASE + 50)).await.unwrap();
        // 乱序写入的旧数据不会覆盖最新值
        store.insert_telemetry(&point("temperature", 2.0, BASE)).await.unwrap();

        let latest = store.get_latest_metric("dev-1", "temperature").await.unwrap();
        assert_eq!(latest.value, 1.0);
        assert_eq!(latest.timestamp, BASE + 50);
    }
}

#[tokio::test]
async fn test_duplicates_are_kept() {
    let store = MemoryStore::new();
    let p = point("temperature", 21.5, BASE);
    store.insert_telemetry(&p).await.unwrap();
    store.insert_telemetry(&p).await.unwrap();

    let points = store
        .get_telemetry("dev-1", "temperature", BASE, BASE, 10)
        .await
        .unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_range_is_inclusive_and_descending() {
    let store = MemoryStore::new();
    for ts in [BASE + 30, BASE, BASE + 60, BASE + 90] {
        store.insert_telemetry(&point("temperature", ts as f64, ts)).await.unwrap();
    }

    let points = store
        .get_telemetry("dev-1", "temperature", BASE, BASE + 60, 0)
        .await
        .unwrap();
    let times: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    assert_eq!(times, vec![BASE + 60, BASE + 30, BASE]);

    let limited = store
        .get_telemetry("dev-1", "temperature", BASE, BASE + 90, 2)
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].timestamp, BASE + 90);
}

#[tokio::test]
async fn test_out_of_range_limit_uses_default() {
    let store = MemoryStore::new();
    let points: Vec<TelemetryPoint> = (0..1200)
        .map(|i| point("temperature", i as f64, BASE + i))
        .collect();
    store.insert_batch(&points).await.unwrap();

    let result = store
        .get_telemetry("dev-1", "temperature", BASE, BASE + 2000, 50_000)
        .await
        .unwrap();
    assert_eq!(result.len() as i64, DEFAULT_LIMIT);
}

#[tokio::test]
async fn test_device_metrics_sorted_and_distinct() {
    let store = MemoryStore::new();
    assert!(store.get_device_metrics("dev-1").await.unwrap().is_empty());

    for metric in ["temperature", "humidity", "temperature", "battery"] {
        store.insert_telemetry(&point(metric, 1.0, BASE)).await.unwrap();
    }
    store
        .insert_telemetry(&TelemetryPoint::new("dev-2", "pressure", 1.0))
        .await
        .unwrap();

    let metrics = store.get_device_metrics("dev-1").await.unwrap();
    assert_eq!(metrics, vec!["battery", "humidity", "temperature"]);
}

#[tokio::test]
async fn test_metadata_is_preserved() {
    let store = MemoryStore::new();
    let mut metadata = HashMap::new();
    metadata.insert("location".to_string(), "roof".to_string());
    store
        .insert_telemetry(&point("temperature", 1.0, BASE).with_metadata(metadata.clone()))
        .await
        .unwrap();

    let points = store
        .get_telemetry("dev-1", "temperature", BASE, BASE, 1)
        .await
        .unwrap();
    assert_eq!(points[0].metadata, metadata);
}

#[tokio::test]
async fn test_closed_store_rejects_operations() {
    let store = MemoryStore::new();
    store.close().await.unwrap();

    let err = store
        .insert_telemetry(&point("temperature", 1.0, BASE))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Closed));
    assert!(!err.is_not_found());
}
