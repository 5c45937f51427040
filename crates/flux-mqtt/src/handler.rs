use async_trait::async_trait;
use flux_types::TelemetryPoint;
use std::future::Future;

/// 遥测数据处理器
///
/// 每个指标调用一次。投递语义为至少一次，同一逻辑数据点可能被重复处理，
/// 实现方不能因重复调用而破坏状态。返回错误只会被记录，不会中断接收循环。
#[async_trait]
pub trait TelemetryHandler: Send + Sync {
    async fn handle(&self, point: TelemetryPoint) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> TelemetryHandler for F
where
    F: Fn(TelemetryPoint) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, point: TelemetryPoint) -> anyhow::Result<()> {
        (self)(point).await
    }
}
