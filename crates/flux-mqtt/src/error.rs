use thiserror::Error;

/// 遥测接入错误类型
#[derive(Error, Debug)]
pub enum IngestError {
    /// 未设置消息处理器
    #[error("message handler is required")]
    MissingHandler,

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 主题不符合 `devices/{id}/telemetry`
    #[error("Could not extract device ID from topic: {0}")]
    TopicMismatch(String),

    /// 负载不是合法的遥测 JSON
    #[error("Failed to parse telemetry JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// MQTT 客户端请求失败
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
