use crate::config::AppConfig;
use crate::pipeline::TelemetryPipeline;
use crate::{api, build_publisher, build_store, AppState};
use anyhow::Result;
use flux_core::{Shutdown, ShutdownSignal, SubscriptionBroker};
use flux_mqtt::IngestClient;
use flux_relay::RedisRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// 每个后台任务退出的最长等待时间
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// 启动全部组件并阻塞到收到关闭信号
///
/// 关闭顺序：停止接入，停止中继，HTTP 排空，最后关闭存储。
pub async fn run(config: AppConfig) -> Result<()> {
    let shutdown = Shutdown::new();
    let broker = Arc::new(SubscriptionBroker::new(config.broker.queue_capacity));
    let store = build_store(&config.storage).await?;
    let publisher = build_publisher(&config.fanout, broker.clone()).await?;

    let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let ingest = if config.mqtt.enabled {
        let client = Arc::new(
            IngestClient::builder()
                .config(config.mqtt.to_ingest_config())
                .handler(TelemetryPipeline::new(store.clone(), publisher.clone()))
                .build()?,
        );
        let runner = client.clone();
        let listener = shutdown.listener();
        tasks.push((
            "ingest",
            tokio::spawn(async move {
                if let Err(e) = runner.run(listener).await {
                    error!(error = %e, "MQTT ingestion stopped with error");
                }
            }),
        ));
        Some(client)
    } else {
        info!("MQTT ingestion disabled");
        None
    };

    if config.relay_active() {
        let relay = RedisRelay::new(
            &config.fanout.redis_url,
            config.relay.to_relay_config(&config.fanout.channel_prefix),
            broker.clone(),
        )?;
        let listener = shutdown.listener();
        tasks.push((
            "relay",
            tokio::spawn(async move {
                if let Err(e) = relay.run(listener).await {
                    error!(error = %e, "Relay stopped with error");
                }
            }),
        ));
    } else {
        info!("Cross-process relay disabled");
    }

    let state = Arc::new(AppState {
        store: store.clone(),
        broker,
    });
    let app = api::create_router(state);
    let addr = config.http_addr()?;
    info!("HTTP query API listening on {}", addr);

    let mut http_shutdown = shutdown.listener();
    let server = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            http_shutdown.recv().await;
        });
    let mut http = tokio::spawn(server);

    // HTTP 服务提前退出（例如端口占用）同样触发关闭
    let early_exit = tokio::select! {
        signal = shutdown.wait_for_os_signal() => {
            match signal {
                Ok(signal) => info!(signal = ?signal, "Received shutdown signal"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for OS signals");
                    shutdown.trigger(ShutdownSignal::Manual);
                }
            }
            None
        }
        served = &mut http => {
            shutdown.trigger(ShutdownSignal::Manual);
            Some(served)
        }
    };

    // 接入循环收到关闭信号后自行发送 DISCONNECT
    for (name, handle) in tasks {
        match timeout(SHUTDOWN_TIMEOUT, handle).await {
            Ok(Ok(())) => debug!(task = name, "Task stopped"),
            Ok(Err(e)) => warn!(task = name, error = %e, "Task panicked"),
            Err(_) => warn!(task = name, "Timed out waiting for task to stop"),
        }
    }

    let served = match early_exit {
        Some(served) => served,
        None => match timeout(SHUTDOWN_TIMEOUT, http).await {
            Ok(served) => served,
            Err(_) => {
                warn!("Timed out draining HTTP server");
                Ok(Ok(()))
            }
        },
    };

    if let Some(client) = &ingest {
        let stats = client.stats().snapshot();
        info!(
            messages = stats.messages_received,
            points = stats.points_handled,
            malformed = stats.messages_malformed,
            handler_failures = stats.handler_failures,
            "Ingestion summary"
        );
    }

    if let Err(e) = store.close().await {
        warn!(error = %e, "Failed to close telemetry store");
    }

    info!("Shutdown complete");
    served??;
    Ok(())
}
