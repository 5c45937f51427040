use crate::error::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// 关闭信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Term,

    /// SIGINT / Ctrl+C
    Interrupt,

    /// 手动触发
    Manual,
}

/// 进程级关闭通知
///
/// 基于 watch 通道：晚于触发才开始监听的任务也能立即看到关闭状态。
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// 触发关闭，只有第一次触发生效
    pub fn trigger(&self, signal: ShutdownSignal) {
        let first = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
        if first {
            info!(signal = ?signal, "Shutdown triggered");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// 等待系统信号并触发关闭
    #[cfg(unix)]
    pub async fn wait_for_os_signal(&self) -> Result<ShutdownSignal> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let received = tokio::select! {
            _ = sigterm.recv() => ShutdownSignal::Term,
            _ = sigint.recv() => ShutdownSignal::Interrupt,
        };
        self.trigger(received);
        Ok(received)
    }

    #[cfg(not(unix))]
    pub async fn wait_for_os_signal(&self) -> Result<ShutdownSignal> {
        tokio::signal::ctrl_c().await?;
        self.trigger(ShutdownSignal::Interrupt);
        Ok(ShutdownSignal::Interrupt)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭监听端，每个后台循环持有一个
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    /// 等待关闭；`Shutdown` 全部被 drop 时视为手动关闭
    pub async fn recv(&mut self) -> ShutdownSignal {
        loop {
            let current = *self.rx.borrow_and_update();
            if let Some(signal) = current {
                return signal;
            }
            if self.rx.changed().await.is_err() {
                return ShutdownSignal::Manual;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
