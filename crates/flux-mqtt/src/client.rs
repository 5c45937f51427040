use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::handler::TelemetryHandler;
use crate::payload::parse_message;
use crate::stats::IngestStats;
use flux_core::{Shutdown, ShutdownListener, ShutdownSignal};
use flux_types::now_unix;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// 断开连接时等待 DISCONNECT 报文发出的最长时间
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// MQTT 遥测接入客户端
///
/// 订阅 `devices/+/telemetry`，解析每条消息并为每个指标调用一次处理器。
/// 处理器在接收循环内被同步等待，存储变慢时会反压 MQTT 消费；
/// 消息在处理完成后才确认（QoS 1，手动 ack），因此投递语义为至少一次。
pub struct IngestClient {
    config: IngestConfig,
    handler: Arc<dyn TelemetryHandler>,
    client: Mutex<Option<AsyncClient>>,
    connected: AtomicBool,
    stop: Shutdown,
    stats: IngestStats,
}

impl IngestClient {
    pub fn builder() -> IngestClientBuilder {
        IngestClientBuilder::new()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn stats(&self) -> IngestStats {
        self.stats.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(self.config.keep_alive());
        options.set_clean_session(true);
        options.set_manual_acks(true);

        if let Some(username) = self.config.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(
                username,
                self.config.password.clone().unwrap_or_default(),
            );
        }

        options
    }

    /// 运行接收循环，直到收到关闭信号或调用 [`IngestClient::disconnect`]
    ///
    /// 连接断开时按 `reconnect_delay` 自动重连，并在每次 CONNACK 后重新订阅。
    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        let (client, mut eventloop) =
            AsyncClient::new(self.mqtt_options(), self.config.request_capacity);
        *self.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(client.clone());
        let mut stop = self.stop.listener();

        info!(
            broker = %self.config.broker_addr(),
            client_id = %self.config.client_id,
            topic = %self.config.topic,
            "Starting MQTT telemetry ingestion"
        );

        loop {
            let event = tokio::select! {
                signal = shutdown.recv() => {
                    info!(signal = ?signal, "Ingestion loop received shutdown signal");
                    break;
                }
                _ = stop.recv() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::Release);
                    self.stats.record_connection();
                    info!(broker = %self.config.broker_addr(), "MQTT connected");

                    // clean session 下订阅不会保留，每次连接后都要重新订阅
                    if let Err(e) = client.try_subscribe(self.config.topic.clone(), QoS::AtLeastOnce) {
                        error!(topic = %self.config.topic, error = %e, "Failed to subscribe");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    info!(topic = %self.config.topic, "Subscribed to telemetry topic");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.process_message(&publish.topic, &publish.payload).await;
                    if let Err(e) = client.try_ack(&publish) {
                        warn!(topic = %publish.topic, error = %e, "Failed to acknowledge message");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.connected.store(false, Ordering::Release);
                    warn!("MQTT broker closed the session");
                }
                Ok(_) => {}
                Err(e) => {
                    let was_connected = self.connected.swap(false, Ordering::AcqRel);
                    self.stats.record_connection_error();
                    if was_connected {
                        warn!(error = %e, "MQTT connection lost");
                    } else {
                        warn!(error = %e, "MQTT connection failed");
                    }

                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = stop.recv() => break,
                        _ = sleep(self.config.reconnect_delay()) => {}
                    }
                    info!("MQTT reconnecting...");
                }
            }
        }

        let was_connected = self.is_connected();
        self.disconnect();
        if was_connected {
            flush_disconnect(&mut eventloop).await;
        }

        info!("MQTT telemetry ingestion stopped");
        Ok(())
    }

    /// 处理一条消息，返回处理成功的数据点数
    ///
    /// 主题或负载非法时丢弃整条消息；单个处理器错误只记录日志。
    pub async fn process_message(&self, topic: &str, payload: &[u8]) -> usize {
        self.stats.record_message();

        let points = match parse_message(topic, payload, now_unix()) {
            Ok(points) => points,
            Err(e) => {
                self.stats.record_malformed();
                warn!(topic = %topic, error = %e, "Dropping telemetry message");
                return 0;
            }
        };

        debug!(topic = %topic, metrics = points.len(), "Received telemetry message");

        let mut handled = 0;
        for point in points {
            let device_id = point.device_id.clone();
            let metric_name = point.metric_name.clone();

            match self.handler.handle(point).await {
                Ok(()) => {
                    handled += 1;
                    self.stats.record_handled();
                    debug!(device_id = %device_id, metric = %metric_name, "Metric handled");
                }
                Err(e) => {
                    self.stats.record_handler_failure();
                    error!(
                        device_id = %device_id,
                        metric = %metric_name,
                        error = %e,
                        "Telemetry handler failed"
                    );
                }
            }
        }

        handled
    }

    /// 优雅断开：停止投递并释放会话，重复调用无副作用
    pub fn disconnect(&self) {
        self.stop.trigger(ShutdownSignal::Manual);

        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        if let (Some(client), true) = (client, was_connected) {
            match client.try_disconnect() {
                Ok(()) => info!("MQTT disconnected"),
                Err(e) => warn!(error = %e, "Failed to send MQTT disconnect"),
            }
        }
    }
}

/// 驱动事件循环直到 DISCONNECT 发出
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await.is_err() {
        debug!("Timed out flushing MQTT disconnect");
    }
}

/// 遥测接入客户端构建器
pub struct IngestClientBuilder {
    config: IngestConfig,
    handler: Option<Arc<dyn TelemetryHandler>>,
    stats: Option<IngestStats>,
}

impl IngestClientBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
            handler: None,
            stats: None,
        }
    }

    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: TelemetryHandler + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn TelemetryHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn stats(mut self, stats: IngestStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// 缺少处理器或配置无效时失败
    pub fn build(self) -> Result<IngestClient> {
        let handler = self.handler.ok_or(IngestError::MissingHandler)?;
        let config = self.config.normalized()?;

        Ok(IngestClient {
            config,
            handler,
            client: Mutex::new(None),
            connected: AtomicBool::new(false),
            stop: Shutdown::new(),
            stats: self.stats.unwrap_or_default(),
        })
    }
}

impl Default for IngestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_types::TelemetryPoint;

    fn noop_handler() -> impl TelemetryHandler {
        |_point: TelemetryPoint| async { Ok::<(), anyhow::Error>(()) }
    }

    #[test]
    fn test_build_requires_handler() {
        let result = IngestClient::builder().build();
        assert!(matches!(result, Err(IngestError::MissingHandler)));
    }

    #[test]
    fn test_mqtt_options() {
        let client = IngestClient::builder()
            .config(IngestConfig {
                username: Some("collector".to_string()),
                password: Some("secret".to_string()),
                ..Default::default()
            })
            .handler(noop_handler())
            .build()
            .unwrap();

        let options = client.mqtt_options();
        assert_eq!(options.client_id(), "data-collector");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.clean_session());
        assert_eq!(
            options.credentials(),
            Some(("collector".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let client = IngestClient::builder()
            .handler(noop_handler())
            .build()
            .unwrap();

        assert!(!client.is_connected());
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_run_exits_on_disconnect() {
        let client = Arc::new(
            IngestClient::builder()
                .config(IngestConfig {
                    // 不可达地址，循环停留在重连等待中
                    broker_host: "127.0.0.1".to_string(),
                    broker_port: 1,
                    reconnect_delay_secs: 60,
                    ..Default::default()
                })
                .handler(noop_handler())
                .build()
                .unwrap(),
        );
        let shutdown = Shutdown::new();

        let runner = client.clone();
        let listener = shutdown.listener();
        let handle = tokio::spawn(async move { runner.run(listener).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        client.disconnect();

        let result = timeout(Duration::from_secs(5), handle)
            .await
            .expect("ingestion loop did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
