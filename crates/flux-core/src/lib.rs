pub mod broker;
pub mod error;
pub mod shutdown;

pub use broker::{SharedBroker, SubscriberQueue, SubscriptionBroker, DEFAULT_QUEUE_CAPACITY};
pub use error::{FluxError, Result};
pub use shutdown::{Shutdown, ShutdownListener, ShutdownSignal};
