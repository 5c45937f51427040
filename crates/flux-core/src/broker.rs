use flux_types::TelemetryPoint;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

/// 默认订阅队列容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// 已注册的订阅者（发送端）
struct Subscriber {
    tx: mpsc::Sender<TelemetryPoint>,
    state: Arc<QueueState>,
}

/// 订阅队列的共享状态
#[derive(Default)]
struct QueueState {
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// 进程内订阅代理
///
/// 维护 device_id -> 订阅队列集合的映射。发布永不阻塞：
/// 队列满时只丢弃该订阅者的这条消息，其他订阅者和发布者不受影响。
/// 丢弃数量通过 [`SubscriptionBroker::dropped_total`] 暴露。
pub struct SubscriptionBroker {
    subscribers: RwLock<HashMap<String, HashMap<u64, Subscriber>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    dropped_total: AtomicU64,
}

impl SubscriptionBroker {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// 为设备创建新的订阅队列，调用方负责消费
    pub fn subscribe(&self, device_id: &str) -> SubscriberQueue {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(QueueState::default());

        let total = {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.entry(device_id.to_string()).or_default().insert(
                id,
                Subscriber {
                    tx,
                    state: state.clone(),
                },
            );
            count_all(&subscribers)
        };

        gauge!("flux_broker_subscribers", total as f64);
        debug!(device_id = %device_id, subscriber_id = id, "Subscriber registered");

        SubscriberQueue {
            id,
            device_id: device_id.to_string(),
            rx,
            state,
        }
    }

    /// 注销订阅队列
    ///
    /// 先在写锁内从集合移除再关闭，因此不会与进行中的 `publish` 发生发送竞争。
    /// 设备的订阅集合为空时删除该设备条目。返回该队列此前是否处于注册状态。
    pub fn unsubscribe(&self, device_id: &str, queue: &SubscriberQueue) -> bool {
        let (removed, total) = {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            let removed = match subscribers.get_mut(device_id) {
                Some(set) => {
                    let removed = set.remove(&queue.id);
                    if set.is_empty() {
                        subscribers.remove(device_id);
                    }
                    removed
                }
                None => None,
            };
            (removed, count_all(&subscribers))
        };

        let Some(subscriber) = removed else {
            return false;
        };

        // 发送端在此处被 drop，接收端读完缓冲后得到 None
        subscriber.state.closed.store(true, Ordering::Release);
        drop(subscriber.tx);

        gauge!("flux_broker_subscribers", total as f64);
        debug!(device_id = %device_id, subscriber_id = queue.id, "Subscriber removed");
        true
    }

    /// 向设备的所有订阅队列非阻塞投递，返回成功投递的数量
    pub fn publish(&self, device_id: &str, point: &TelemetryPoint) -> usize {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(set) = subscribers.get(device_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, subscriber) in set {
            match subscriber.tx.try_send(point.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    subscriber.state.dropped.fetch_add(1, Ordering::Relaxed);
                    self.dropped_total.fetch_add(1, Ordering::Relaxed);
                    counter!("flux_broker_dropped_total", 1);
                    debug!(
                        device_id = %device_id,
                        subscriber_id = id,
                        "Subscriber queue full, message dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    // 消费方丢弃了队列却没有注销
                    subscriber.state.dropped.fetch_add(1, Ordering::Relaxed);
                    self.dropped_total.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        device_id = %device_id,
                        subscriber_id = id,
                        "Subscriber queue dropped without unsubscribe"
                    );
                }
            }
        }

        delivered
    }

    pub fn subscriber_count(&self, device_id: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        count_all(
            &self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// 因队列已满而丢弃的消息总数
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

impl Default for SubscriptionBroker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn count_all(subscribers: &HashMap<String, HashMap<u64, Subscriber>>) -> usize {
    subscribers.values().map(HashMap::len).sum()
}

/// 有界订阅队列，由唯一的外部消费者持有
///
/// 状态只有 Open 和 Closed 两种，`unsubscribe` 时转入 Closed 且不可逆。
pub struct SubscriberQueue {
    id: u64,
    device_id: String,
    rx: mpsc::Receiver<TelemetryPoint>,
    state: Arc<QueueState>,
}

impl SubscriberQueue {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// 等待下一个数据点；队列关闭且缓冲读完后返回 None
    pub async fn recv(&mut self) -> Option<TelemetryPoint> {
        self.rx.recv().await
    }

    /// 非阻塞读取
    pub fn try_recv(&mut self) -> Option<TelemetryPoint> {
        match self.rx.try_recv() {
            Ok(point) => Some(point),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// 此队列因满而被丢弃的消息数
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SubscriberQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberQueue")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub type SharedBroker = Arc<SubscriptionBroker>;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn point(device_id: &str, value: f64) -> TelemetryPoint {
        TelemetryPoint::new(device_id, "temperature", value)
            .with_unit("C")
            .with_timestamp(1_700_000_000)
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let broker = SubscriptionBroker::default();
        let mut queue = broker.subscribe("device_a");

        let p = point("device_a", 21.5);
        assert_eq!(broker.publish("device_a", &p), 1);

        let received = timeout(Duration::from_millis(100), queue.recv())
            .await
            .expect("Timeout waiting for point")
            .expect("Queue closed");
        assert_eq!(received, p);
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broker = SubscriptionBroker::default();
        let mut queue = broker.subscribe("device_a");

        assert_eq!(broker.publish("device_b", &point("device_b", 1.0)), 0);
        assert!(queue.try_recv().is_none());
        assert_eq!(broker.subscriber_count("device_b"), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let broker = SubscriptionBroker::new(3);
        let mut slow = broker.subscribe("device_a");
        let mut fast = broker.subscribe("device_a");

        for i in 0..4 {
            broker.publish("device_a", &point("device_a", i as f64));
            // fast 每次都及时消费
            assert!(fast.try_recv().is_some());
        }

        let mut delivered = 0;
        while slow.try_recv().is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);
        assert_eq!(slow.dropped(), 1);
        assert_eq!(fast.dropped(), 0);
        assert_eq!(broker.dropped_total(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let broker = SubscriptionBroker::default();
        let mut queue = broker.subscribe("device_a");
        broker.publish("device_a", &point("device_a", 1.0));

        assert!(!queue.is_closed());
        assert!(broker.unsubscribe("device_a", &queue));
        assert!(queue.is_closed());

        // 注销后发布不会投递到已移除的队列
        assert_eq!(broker.publish("device_a", &point("device_a", 2.0)), 0);

        // 缓冲中的数据仍可读出，之后得到 None
        assert_eq!(queue.recv().await.map(|p| p.value), Some(1.0));
        assert!(queue.recv().await.is_none());

        // 重复注销是无害的
        assert!(!broker.unsubscribe("device_a", &queue));
    }

    #[test]
    fn test_empty_device_entry_removed() {
        let broker = SubscriptionBroker::default();
        let q1 = broker.subscribe("device_a");
        let q2 = broker.subscribe("device_a");
        let q3 = broker.subscribe("device_b");

        assert_eq!(broker.subscriber_count("device_a"), 2);
        assert_eq!(broker.total_subscribers(), 3);

        broker.unsubscribe("device_a", &q1);
        broker.unsubscribe("device_a", &q2);

        assert_eq!(broker.subscriber_count("device_a"), 0);
        assert!(broker
            .subscribers
            .read()
            .unwrap()
            .get("device_a")
            .is_none());
        assert_eq!(broker.total_subscribers(), 1);
        drop(q3);
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_unsubscribe() {
        let broker = Arc::new(SubscriptionBroker::new(4));
        let mut handles = vec![];

        for _ in 0..8 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    broker.publish("device_a", &point("device_a", i as f64));
                    tokio::task::yield_now().await;
                }
            }));
        }

        for _ in 0..50 {
            let queue = broker.subscribe("device_a");
            tokio::task::yield_now().await;
            assert!(broker.unsubscribe("device_a", &queue));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(broker.total_subscribers(), 0);
    }
}
