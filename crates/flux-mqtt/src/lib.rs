//! MQTT 遥测接入
//!
//! 订阅设备遥测主题，将每条 JSON 消息展开为逐指标的 [`TelemetryPoint`]，
//! 交给调用方提供的 [`TelemetryHandler`] 处理。

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod payload;
pub mod stats;
pub mod topic;

pub use client::{IngestClient, IngestClientBuilder};
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use flux_types::TelemetryPoint;
pub use handler::TelemetryHandler;
pub use payload::{parse_message, Metric, TelemetryMessage};
pub use stats::{IngestStats, IngestStatsSnapshot};
pub use topic::{extract_device_id, telemetry_topic, DEFAULT_TOPIC_FILTER};
