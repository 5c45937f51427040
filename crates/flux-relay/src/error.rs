use thiserror::Error;

/// 事件分发与中继错误
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to decode telemetry event: {0}")]
    Decode(#[from] serde_json::Error),

    /// 订阅流或交接队列已关闭
    #[error("Relay channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, RelayError>;
