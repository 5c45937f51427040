use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 接入统计
#[derive(Clone)]
pub struct IngestStats {
    inner: Arc<StatsInner>,
}

struct StatsInner {
    messages_received: AtomicU64,
    messages_malformed: AtomicU64,
    points_handled: AtomicU64,
    handler_failures: AtomicU64,
    connections: AtomicU64,
    connection_errors: AtomicU64,
    start_time: Instant,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner {
                messages_received: AtomicU64::new(0),
                messages_malformed: AtomicU64::new(0),
                points_handled: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
                connections: AtomicU64::new(0),
                connection_errors: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_message(&self) {
        self.inner.messages_received.fetch_add(1, Ordering::Relaxed);
        counter!("flux_ingest_messages_total", 1);
    }

    pub fn record_malformed(&self) {
        self.inner.messages_malformed.fetch_add(1, Ordering::Relaxed);
        counter!("flux_ingest_malformed_total", 1);
    }

    pub fn record_handled(&self) {
        self.inner.points_handled.fetch_add(1, Ordering::Relaxed);
        counter!("flux_ingest_points_total", 1);
    }

    pub fn record_handler_failure(&self) {
        self.inner.handler_failures.fetch_add(1, Ordering::Relaxed);
        counter!("flux_ingest_handler_failures_total", 1);
    }

    pub fn record_connection(&self) {
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
        counter!("flux_ingest_connections_total", 1);
    }

    pub fn record_connection_error(&self) {
        self.inner.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("flux_ingest_connection_errors_total", 1);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            messages_received: self.inner.messages_received.load(Ordering::Relaxed),
            messages_malformed: self.inner.messages_malformed.load(Ordering::Relaxed),
            points_handled: self.inner.points_handled.load(Ordering::Relaxed),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
            connections: self.inner.connections.load(Ordering::Relaxed),
            connection_errors: self.inner.connection_errors.load(Ordering::Relaxed),
            uptime: self.inner.start_time.elapsed(),
        }
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 统计快照
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatsSnapshot {
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub points_handled: u64,
    pub handler_failures: u64,
    /// 成功建立（含重连）的会话次数
    pub connections: u64,
    pub connection_errors: u64,
    #[serde(skip)]
    pub uptime: Duration,
}
