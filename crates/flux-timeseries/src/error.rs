use thiserror::Error;

/// 时序存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 该序列从未记录过数据
    #[error("No telemetry found for device {device_id} metric {metric_name}")]
    NotFound {
        device_id: String,
        metric_name: String,
    },

    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 时间戳超出可存储范围
    #[error("Timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    /// 存储已关闭
    #[error("Store is closed")]
    Closed,
}

/// 时序存储结果类型
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn not_found(device_id: &str, metric_name: &str) -> Self {
        StoreError::NotFound {
            device_id: device_id.to_string(),
            metric_name: metric_name.to_string(),
        }
    }

    /// 是否为调用方传入的非法参数
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, StoreError::InvalidTimestamp(_))
    }

    /// 是否为“无数据”，用于和一般失败区分
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
