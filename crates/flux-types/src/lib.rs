pub mod telemetry;
pub mod time;

pub use telemetry::{TelemetryEvent, TelemetryPoint};
pub use time::{format_rfc3339, is_representable, now_unix, parse_rfc3339_or};
