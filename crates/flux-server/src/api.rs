use crate::{metrics, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use flux_timeseries::{AggregationInterval, StoreError, TelemetryAggregationBucket, TelemetryPoint};
use flux_types::{format_rfc3339, is_representable, now_unix};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 未指定 `from` 时回看的时长
const DEFAULT_LOOKBACK_SECS: i64 = 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AggregatedQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub interval: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PointResponse {
    pub time: i64,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub device_id: String,
    pub metric_name: String,
    pub points: Vec<PointResponse>,
}

#[derive(Debug, Serialize)]
pub struct BucketResponse {
    /// RFC3339 桶起始时间
    pub bucket: String,
    pub bucket_start: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AggregatedResponse {
    pub device_id: String,
    pub metric_name: String,
    pub interval: &'static str,
    pub buckets: Vec<BucketResponse>,
}

impl From<TelemetryPoint> for PointResponse {
    fn from(point: TelemetryPoint) -> Self {
        Self {
            time: point.timestamp,
            value: point.value,
            unit: point.unit,
        }
    }
}

impl From<TelemetryAggregationBucket> for BucketResponse {
    fn from(bucket: TelemetryAggregationBucket) -> Self {
        Self {
            bucket: format_rfc3339(bucket.bucket_start),
            bucket_start: bucket.bucket_start,
            avg: bucket.avg,
            min: bucket.min,
            max: bucket.max,
            count: bucket.count,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/devices/:device_id/metrics", get(get_device_metrics))
        .route(
            "/api/v1/devices/:device_id/metrics/:metric/telemetry",
            get(get_telemetry),
        )
        .route(
            "/api/v1/devices/:device_id/metrics/:metric/aggregated",
            get(get_telemetry_aggregated),
        )
        .route(
            "/api/v1/devices/:device_id/metrics/:metric/latest",
            get(get_latest_metric),
        )
        .route("/api/v1/subscribers/:device_id", get(get_subscribers))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn store_error_response(e: StoreError) -> Response {
    if e.is_not_found() {
        return error_response(StatusCode::NOT_FOUND, e.to_string());
    }
    if e.is_invalid_input() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    tracing::error!(error = %e, "Telemetry store query failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// `to` 缺省为当前时间，`from` 缺省为 `to` 前 24 小时
fn resolve_range(from: Option<i64>, to: Option<i64>) -> Result<(i64, i64), Response> {
    let to = to.unwrap_or_else(now_unix);
    let from = from.unwrap_or_else(|| to.saturating_sub(DEFAULT_LOOKBACK_SECS));
    for (name, value) in [("from", from), ("to", to)] {
        if !is_representable(value) {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("{} ({}) is out of range", name, value),
            ));
        }
    }
    if from > to {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("from ({}) must not be after to ({})", from, to),
        ));
    }
    Ok((from, to))
}

async fn get_device_metrics(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Response {
    metrics::record_http_request("device_metrics");
    tracing::info!(device_id = %device_id, "Query device metrics");

    match state.store.get_device_metrics(&device_id).await {
        Ok(names) => {
            tracing::debug!(device_id = %device_id, count = names.len(), "Device metrics returned");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "device_id": device_id, "metrics": names })),
            )
                .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Path((device_id, metric)): Path<(String, String)>,
    Query(q): Query<RangeQuery>,
) -> Response {
    metrics::record_http_request("telemetry");
    let (from, to) = match resolve_range(q.from, q.to) {
        Ok(range) => range,
        Err(resp) => return resp,
    };
    let limit = q.limit.unwrap_or(0);

    tracing::info!(
        device_id = %device_id,
        metric = %metric,
        from,
        to,
        limit,
        "Query telemetry"
    );

    match state
        .store
        .get_telemetry(&device_id, &metric, from, to, limit)
        .await
    {
        Ok(points) => {
            tracing::debug!(device_id = %device_id, metric = %metric, count = points.len(), "Telemetry returned");
            Json(SeriesResponse {
                device_id,
                metric_name: metric,
                points: points.into_iter().map(PointResponse::from).collect(),
            })
            .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

async fn get_telemetry_aggregated(
    State(state): State<Arc<AppState>>,
    Path((device_id, metric)): Path<(String, String)>,
    Query(q): Query<AggregatedQuery>,
) -> Response {
    metrics::record_http_request("aggregated");
    let (from, to) = match resolve_range(q.from, q.to) {
        Ok(range) => range,
        Err(resp) => return resp,
    };
    let interval = q
        .interval
        .as_deref()
        .map(AggregationInterval::resolve)
        .unwrap_or_default();

    tracing::info!(
        device_id = %device_id,
        metric = %metric,
        interval = %interval,
        "Query aggregated telemetry"
    );

    match state
        .store
        .get_telemetry_aggregated(&device_id, &metric, from, to, interval.as_str())
        .await
    {
        Ok(buckets) => {
            tracing::debug!(device_id = %device_id, metric = %metric, count = buckets.len(), "Aggregations returned");
            Json(AggregatedResponse {
                device_id,
                metric_name: metric,
                interval: interval.as_str(),
                buckets: buckets.into_iter().map(BucketResponse::from).collect(),
            })
            .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

async fn get_latest_metric(
    State(state): State<Arc<AppState>>,
    Path((device_id, metric)): Path<(String, String)>,
) -> Response {
    metrics::record_http_request("latest");
    tracing::info!(device_id = %device_id, metric = %metric, "Query latest metric");

    match state.store.get_latest_metric(&device_id, &metric).await {
        Ok(point) => Json(PointResponse::from(point)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn get_subscribers(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Response {
    metrics::record_http_request("subscribers");

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "device_id": device_id,
            "subscribers": state.broker.subscriber_count(&device_id),
            "total_subscribers": state.broker.total_subscribers(),
            "dropped_total": state.broker.dropped_total(),
        })),
    )
        .into_response()
}
