//! 遥测事件分发
//!
//! 写入成功后由 [`EventPublisher`] 按设备发布事件；[`RedisRelay`] 在提供实时查询的
//! 进程中订阅全部设备频道，并把事件转交给本地订阅代理。

pub mod error;
pub mod publisher;
pub mod relay;

pub use error::{RelayError, Result};
pub use publisher::{
    channel_for, channel_pattern, EventPublisher, LocalEventPublisher, RedisEventPublisher,
    SharedPublisher, DEFAULT_CHANNEL_PREFIX,
};
pub use relay::{decode_event, forward_events, RedisRelay, RelayConfig};
