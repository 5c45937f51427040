use crate::error::{IngestError, Result};
use crate::topic::DEFAULT_TOPIC_FILTER;
use serde::Deserialize;
use std::time::Duration;

/// 遥测接入客户端配置
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,

    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// 订阅的主题过滤器
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// 连接断开后的重连间隔
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// rumqttc 请求通道容量
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "data-collector".to_string()
}

fn default_topic() -> String {
    DEFAULT_TOPIC_FILTER.to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_request_capacity() -> usize {
    10
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            client_id: default_client_id(),
            topic: default_topic(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl IngestConfig {
    /// 校验并补全默认值：空的 client_id / topic 使用默认值，broker 地址必填
    pub fn normalized(mut self) -> Result<Self> {
        if self.broker_host.trim().is_empty() {
            return Err(IngestError::InvalidConfig("broker host is required".to_string()));
        }
        if self.client_id.trim().is_empty() {
            self.client_id = default_client_id();
        }
        if self.topic.trim().is_empty() {
            self.topic = default_topic();
        }
        if self.request_capacity == 0 {
            self.request_capacity = default_request_capacity();
        }
        Ok(self)
    }

    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(5))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
