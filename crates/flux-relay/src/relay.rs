use crate::error::{RelayError, Result};
use crate::publisher::{channel_pattern, DEFAULT_CHANNEL_PREFIX};
use flux_core::{SharedBroker, ShutdownListener};
use flux_types::{now_unix, TelemetryEvent, TelemetryPoint};
use futures::StreamExt;
use metrics::counter;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// 中继配置
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub channel_prefix: String,
    /// 接收阶段与投递阶段之间的交接队列容量
    pub handoff_capacity: usize,
    pub reconnect_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            handoff_capacity: 1024,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// 解码一条中继事件；RFC3339 时间无法解析时使用 `received_at`
pub fn decode_event(payload: &[u8], received_at: i64) -> Result<TelemetryPoint> {
    let event: TelemetryEvent = serde_json::from_slice(payload)?;
    Ok(event.into_point(received_at))
}

/// 把交接队列中的数据点投递给本地订阅代理，队列关闭后返回投递总数
pub async fn forward_events(mut rx: mpsc::Receiver<TelemetryPoint>, broker: SharedBroker) -> u64 {
    let mut forwarded = 0u64;
    while let Some(point) = rx.recv().await {
        let delivered = broker.publish(&point.device_id, &point);
        forwarded += 1;
        debug!(
            device_id = %point.device_id,
            metric = %point.metric_name,
            delivered,
            "Relayed telemetry event"
        );
    }
    forwarded
}

/// Redis 模式订阅中继
///
/// 接收循环只负责解码并写入交接队列，由独立任务执行 [`forward_events`]。
/// 订阅失败时按 `reconnect_delay` 重新订阅；收到关闭信号后丢弃订阅连接并返回。
pub struct RedisRelay {
    client: redis::Client,
    config: RelayConfig,
    broker: SharedBroker,
}

impl RedisRelay {
    pub fn new(redis_url: &str, config: RelayConfig, broker: SharedBroker) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            config,
            broker,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        let (tx, rx) = mpsc::channel(self.config.handoff_capacity.max(1));
        let forwarder = tokio::spawn(forward_events(rx, self.broker.clone()));
        let pattern = channel_pattern(&self.config.channel_prefix);

        loop {
            match self.consume(&pattern, &tx, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    error!(pattern = %pattern, error = %e, "Relay subscription failed");
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = sleep(self.config.reconnect_delay) => {}
                    }
                    info!(pattern = %pattern, "Relay resubscribing");
                }
            }
        }

        drop(tx);
        match forwarder.await {
            Ok(forwarded) => info!(forwarded, "Relay stopped"),
            Err(e) => warn!(error = %e, "Relay forwarder task failed"),
        }
        Ok(())
    }

    /// 单次订阅会话，收到关闭信号时返回 Ok
    async fn consume(
        &self,
        pattern: &str,
        tx: &mpsc::Sender<TelemetryPoint>,
        shutdown: &mut ShutdownListener,
    ) -> Result<()> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.psubscribe(pattern).await?;
        info!(pattern = %pattern, "Relay subscribed to telemetry events");

        let mut messages = pubsub.on_message();
        loop {
            let msg = tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                msg = messages.next() => msg,
            };
            let Some(msg) = msg else {
                return Err(RelayError::Closed);
            };

            match decode_event(msg.get_payload_bytes(), now_unix()) {
                Ok(point) => {
                    counter!("flux_relay_events_total", 1);
                    if tx.send(point).await.is_err() {
                        return Err(RelayError::Closed);
                    }
                }
                Err(e) => {
                    counter!("flux_relay_decode_errors_total", 1);
                    warn!(
                        channel = %msg.get_channel_name(),
                        error = %e,
                        "Failed to decode relayed event"
                    );
                }
            }
        }
    }
}
