pub mod aggregate;
pub mod error;
pub mod memory;
pub mod model;
pub mod query;
pub mod schema;
pub mod store;
pub mod timescale;

pub use aggregate::{bucket_start, bucketize};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use model::{TelemetryAggregationBucket, TelemetryPoint};
pub use query::{clamp_limit, AggregationInterval, DEFAULT_LIMIT, MAX_LIMIT};
pub use store::{SharedStore, TelemetryStore};
pub use timescale::{PoolOptions, TimescaleStore};
