use crate::error::Result;
use async_trait::async_trait;
use flux_core::SharedBroker;
use flux_types::{TelemetryEvent, TelemetryPoint};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, info};

/// 默认频道前缀，完整频道为 `iot:telemetry:{device_id}`
pub const DEFAULT_CHANNEL_PREFIX: &str = "iot:telemetry";

/// 设备事件频道
pub fn channel_for(prefix: &str, device_id: &str) -> String {
    format!("{}:{}", prefix, device_id)
}

/// 覆盖全部设备频道的订阅模式
pub fn channel_pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}

/// 遥测事件发布者
///
/// 在存储写入成功之后调用。发布失败不会回滚写入，由调用方记录即可。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_telemetry(&self, point: &TelemetryPoint) -> Result<()>;
}

pub type SharedPublisher = Arc<dyn EventPublisher>;

/// 基于 Redis PUBLISH 的跨进程发布者
pub struct RedisEventPublisher {
    conn: MultiplexedConnection,
    channel_prefix: String,
}

impl RedisEventPublisher {
    pub async fn connect(redis_url: &str, channel_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let channel_prefix = channel_prefix.into();

        info!(prefix = %channel_prefix, "Connected telemetry event publisher to Redis");
        Ok(Self {
            conn,
            channel_prefix,
        })
    }

    pub fn channel_prefix(&self) -> &str {
        &self.channel_prefix
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish_telemetry(&self, point: &TelemetryPoint) -> Result<()> {
        let payload = serde_json::to_string(&TelemetryEvent::from_point(point))?;
        let channel = channel_for(&self.channel_prefix, &point.device_id);

        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(&channel, payload).await?;

        debug!(channel = %channel, receivers, "Published telemetry event");
        Ok(())
    }
}

/// 单进程模式：直接投递到本地订阅代理，不经过中继
///
/// 投递内容与经 Redis 中继后的结果一致（不携带 metadata）。
pub struct LocalEventPublisher {
    broker: SharedBroker,
}

impl LocalEventPublisher {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl EventPublisher for LocalEventPublisher {
    async fn publish_telemetry(&self, point: &TelemetryPoint) -> Result<()> {
        let event = TelemetryEvent::from_point(point);
        let delivered = self
            .broker
            .publish(&point.device_id, &event.into_point(point.timestamp));

        debug!(device_id = %point.device_id, delivered, "Published telemetry event locally");
        Ok(())
    }
}
