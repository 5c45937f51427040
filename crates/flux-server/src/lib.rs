pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod pipeline;

use anyhow::{Context, Result};
use crate::config::{FanoutBackend, FanoutConfig, StorageBackend, StorageConfig};
use flux_core::SharedBroker;
use flux_relay::{LocalEventPublisher, RedisEventPublisher, SharedPublisher};
use flux_timeseries::{MemoryStore, SharedStore, TimescaleStore};
use std::sync::Arc;

// 重新导出配置类型
pub use api::create_router;
pub use app::run;
pub use config::AppConfig;
pub use pipeline::TelemetryPipeline;

/// HTTP 查询接口共享的状态
pub struct AppState {
    pub store: SharedStore,
    pub broker: SharedBroker,
}

/// 按配置构造存储后端
pub async fn build_store(config: &StorageConfig) -> Result<SharedStore> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory telemetry store, data will not be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Timescale => {
            let store = TimescaleStore::connect(&config.url, config.pool_options())
                .await
                .context("failed to connect to TimescaleDB")?;
            if config.migrate {
                store
                    .migrate()
                    .await
                    .context("failed to migrate telemetry schema")?;
            }
            Ok(Arc::new(store))
        }
    }
}

/// 按配置构造事件发布者
pub async fn build_publisher(config: &FanoutConfig, broker: SharedBroker) -> Result<SharedPublisher> {
    match config.backend {
        FanoutBackend::Local => {
            tracing::info!("Publishing telemetry events to the in-process broker");
            Ok(Arc::new(LocalEventPublisher::new(broker)))
        }
        FanoutBackend::Redis => {
            let publisher = RedisEventPublisher::connect(&config.redis_url, config.channel_prefix.clone())
                .await
                .context("failed to connect to Redis")?;
            Ok(Arc::new(publisher))
        }
    }
}
