use thiserror::Error;

/// FLUX Core 统一错误类型
#[derive(Error, Debug)]
pub enum FluxError {
    /// 安装系统信号监听失败
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, FluxError>;
