use crate::error::{Result, StoreError};
use crate::model::{TelemetryAggregationBucket, TelemetryPoint};
use crate::query::{clamp_limit, AggregationInterval};
use crate::schema;
use crate::store::TelemetryStore;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单条 INSERT 语句携带的最大行数（PostgreSQL 参数上限为 65535）
const BATCH_CHUNK_ROWS: usize = 1000;

const INSERT_PREFIX: &str =
    "INSERT INTO device_telemetry (time, device_id, metric_name, value, unit, metadata) VALUES ";

/// 连接池配置
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// TimescaleDB 存储实现
pub struct TimescaleStore {
    db: DatabaseConnection,
    closed: AtomicBool,
}

impl TimescaleStore {
    /// 使用默认连接池配置连接
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, PoolOptions::default()).await
    }

    /// 创建连接池并验证连接
    pub async fn connect(database_url: &str, pool: PoolOptions) -> Result<Self> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .max_lifetime(pool.max_lifetime)
            .idle_timeout(pool.idle_timeout)
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        db.ping().await?;

        info!(
            max_connections = pool.max_connections,
            "Connected to TimescaleDB"
        );

        Ok(Self {
            db,
            closed: AtomicBool::new(false),
        })
    }

    /// 使用已有连接（测试或共享连接池）
    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self {
            db,
            closed: AtomicBool::new(false),
        }
    }

    /// 获取数据库连接
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 创建表、索引与最新值触发器
    ///
    /// 扩展或 hypertable 创建失败只记录警告，普通表依然可用。
    pub async fn migrate(&self) -> Result<()> {
        if let Err(e) = self.db.execute_unprepared(schema::CREATE_EXTENSION).await {
            warn!(error = %e, "TimescaleDB extension unavailable");
        }

        self.db
            .execute_unprepared(schema::CREATE_TELEMETRY_TABLE)
            .await?;

        if let Err(e) = self.db.execute_unprepared(schema::CREATE_HYPERTABLE).await {
            warn!(error = %e, "Failed to convert device_telemetry to hypertable");
        }

        for sql in schema::SERIES_OBJECTS {
            self.db.execute_unprepared(sql).await?;
        }

        info!("Telemetry schema ready");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn statement(sql: impl Into<String>, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DatabaseBackend::Postgres, sql, values)
    }

    fn insert_statement(points: &[TelemetryPoint]) -> Result<Statement> {
        let mut sql = String::from(INSERT_PREFIX);
        let mut values: Vec<Value> = Vec::with_capacity(points.len() * 6);

        for (row, point) in points.iter().enumerate() {
            if row > 0 {
                sql.push_str(", ");
            }
            let base = row * 6;
            sql.push_str(&format!(
                "(${}, ${}, ${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
                base + 6
            ));

            values.push(to_datetime(point.timestamp)?.into());
            values.push(point.device_id.clone().into());
            values.push(point.metric_name.clone().into());
            values.push(point.value.into());
            values.push(point.unit.clone().into());
            values.push(serde_json::to_value(&point.metadata)?.into());
        }

        Ok(Self::statement(sql, values))
    }

    /// 读取 `time, value, unit[, metadata]` 行
    fn point_from_row(
        row: &QueryResult,
        device_id: &str,
        metric_name: &str,
    ) -> Result<TelemetryPoint> {
        let time: DateTime<Utc> = row.try_get("", "time")?;
        let value: f64 = row.try_get("", "value")?;
        let unit: Option<String> = row.try_get("", "unit")?;
        let metadata = row
            .try_get::<Option<serde_json::Value>>("", "metadata")
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value::<HashMap<String, String>>(v).ok())
            .unwrap_or_default();

        Ok(TelemetryPoint {
            device_id: device_id.to_string(),
            metric_name: metric_name.to_string(),
            value,
            unit: unit.unwrap_or_default(),
            timestamp: time.timestamp(),
            metadata,
        })
    }
}

fn to_datetime(timestamp: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or(StoreError::InvalidTimestamp(timestamp))
}

#[async_trait]
impl TelemetryStore for TimescaleStore {
    async fn insert_telemetry(&self, point: &TelemetryPoint) -> Result<()> {
        self.ensure_open()?;
        let stmt = Self::insert_statement(std::slice::from_ref(point))?;
        self.db.execute(stmt).await?;

        debug!(
            device_id = %point.device_id,
            metric_name = %point.metric_name,
            "Telemetry written to TimescaleDB"
        );

        Ok(())
    }

    async fn insert_batch(&self, points: &[TelemetryPoint]) -> Result<()> {
        self.ensure_open()?;
        if points.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;
        for chunk in points.chunks(BATCH_CHUNK_ROWS) {
            let stmt = Self::insert_statement(chunk)?;
            // 出错时 txn 被 drop，事务回滚
            txn.execute(stmt).await?;
        }
        txn.commit().await?;

        debug!(count = points.len(), "Telemetry batch written to TimescaleDB");
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
        let limit = clamp_limit(limit);

        let stmt = Self::statement(
            r#"
            SELECT time, value, unit, metadata
            FROM device_telemetry
            WHERE device_id = $1
              AND metric_name = $2
              AND time >= $3
              AND time <= $4
            ORDER BY time DESC
            LIMIT $5
            "#,
            vec![
                device_id.into(),
                metric_name.into(),
                to_datetime(from)?.into(),
                to_datetime(to)?.into(),
                limit.into(),
            ],
        );

        let rows = self.db.query_all(stmt).await?;
        let points = rows
            .iter()
            .map(|row| Self::point_from_row(row, device_id, metric_name))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            device_id = %device_id,
            metric_name = %metric_name,
            count = points.len(),
            "Queried telemetry from TimescaleDB"
        );

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
        // 窗口只来自枚举的固定字面量，可以直接拼接
        let interval = AggregationInterval::resolve(interval);

        let sql = format!(
            r#"
            SELECT
                time_bucket('{}', time) AS bucket,
                AVG(value) AS avg_value,
                MIN(value) AS min_value,
                MAX(value) AS max_value,
                COUNT(*) AS sample_count
            FROM device_telemetry
            WHERE device_id = $1
              AND metric_name = $2
              AND time >= $3
              AND time <= $4
            GROUP BY bucket
            ORDER BY bucket DESC
            "#,
            interval.as_str()
        );

        let stmt = Self::statement(
            sql,
            vec![
                device_id.into(),
                metric_name.into(),
                to_datetime(from)?.into(),
                to_datetime(to)?.into(),
            ],
        );

        let rows = self.db.query_all(stmt).await?;
        let mut buckets = Vec::with_capacity(rows.len());
        for row in rows {
            let bucket: DateTime<Utc> = row.try_get("", "bucket")?;
            buckets.push(TelemetryAggregationBucket {
                bucket_start: bucket.timestamp(),
                avg: row.try_get("", "avg_value")?,
                min: row.try_get("", "min_value")?,
                max: row.try_get("", "max_value")?,
                count: row.try_get("", "sample_count")?,
            });
        }

        debug!(
            device_id = %device_id,
            metric_name = %metric_name,
            interval = %interval,
            count = buckets.len(),
            "Queried aggregated telemetry from TimescaleDB"
        );

        Ok(buckets)
    }

    async fn get_latest_metric(&self, device_id: &str, metric_name: &str) -> Result<TelemetryPoint> {
        self.ensure_open()?;

        let cached = self
            .db
            .query_one(Self::statement(
                r#"
                SELECT time, value, unit
                FROM device_telemetry_latest
                WHERE device_id = $1 AND metric_name = $2
                "#,
                vec![device_id.into(), metric_name.into()],
            ))
            .await?;

        let row = match cached {
            Some(row) => row,
            None => {
                debug!(device_id = %device_id, metric_name = %metric_name, "Latest cache miss");
                self.db
                    .query_one(Self::statement(
                        r#"
                        SELECT time, value, unit, metadata
                        FROM device_telemetry
                        WHERE device_id = $1 AND metric_name = $2
                        ORDER BY time DESC
                        LIMIT 1
                        "#,
                        vec![device_id.into(), metric_name.into()],
                    ))
                    .await?
                    .ok_or_else(|| StoreError::not_found(device_id, metric_name))?
            }
        };

        Self::point_from_row(&row, device_id, metric_name)
    }

    async fn get_device_metrics(&self, device_id: &str) -> Result<Vec<String>> {
        self.ensure_open()?;

        let rows = self
            .db
            .query_all(Self::statement(
                r#"
                SELECT DISTINCT metric_name
                FROM device_telemetry
                WHERE device_id = $1
                ORDER BY metric_name
                "#,
                vec![device_id.into()],
            ))
            .await?;

        let metrics = rows
            .iter()
            .map(|row| row.try_get::<String>("", "metric_name"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(metrics)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.db.clone().close().await?;
        info!("TimescaleDB connection pool closed");
        Ok(())
    }
}
