//! 进程内双工传输
//!
//! 一对 [`MemoryTransport`] 通过有界 mpsc 互联，任一端关闭即视为整条链路断开，
//! 两端后续的读写都返回 [`TransportError::Closed`]。主要用于测试与本地演示。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};

use super::Transport;
use crate::error::TransportError;

const LINK_BUFFER: usize = 1024;

/// 进程内传输端点
pub struct MemoryTransport {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    link: Arc<watch::Sender<bool>>,
    ping_interval: Duration,
    ping_timeout: Duration,
    close_count: AtomicUsize,
    frames_written: AtomicUsize,
}

impl MemoryTransport {
    /// 创建一对互联的端点
    pub fn pair(ping_interval: Duration, ping_timeout: Duration) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(LINK_BUFFER);
        let (b_tx, a_rx) = mpsc::channel(LINK_BUFFER);
        let (link, _) = watch::channel(false);
        let link = Arc::new(link);

        let a = Self::new(a_tx, a_rx, link.clone(), ping_interval, ping_timeout);
        let b = Self::new(b_tx, b_rx, link, ping_interval, ping_timeout);
        (a, b)
    }

    fn new(
        tx: mpsc::Sender<String>,
        rx: mpsc::Receiver<String>,
        link: Arc<watch::Sender<bool>>,
        ping_interval: Duration,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            rx: Mutex::new(rx),
            link,
            ping_interval,
            ping_timeout,
            close_count: AtomicUsize::new(0),
            frames_written: AtomicUsize::new(0),
        }
    }

    /// 本端 `close` 被调用的次数
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// 本端成功写出的帧数
    pub fn frames_written(&self) -> usize {
        self.frames_written.load(Ordering::SeqCst)
    }

    /// 链路是否已断开
    pub fn is_closed(&self) -> bool {
        *self.link.borrow()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_frame(&self) -> Result<String, TransportError> {
        let mut closed = self.link.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::Closed);
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = closed.wait_for(|closed| *closed) => Err(TransportError::Closed),
            frame = rx.recv() => frame.ok_or(TransportError::Closed),
        }
    }

    async fn write_frame(&self, frame: &str) -> Result<(), TransportError> {
        let mut closed = self.link.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::Closed);
        }

        tokio::select! {
            _ = closed.wait_for(|closed| *closed) => Err(TransportError::Closed),
            sent = self.tx.send(frame.to_string()) => {
                sent.map_err(|_| TransportError::Closed)?;
                self.frames_written.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.link.send_replace(true);
        Ok(())
    }

    fn heartbeat_params(&self) -> (Duration, Duration) {
        (self.ping_interval, self.ping_timeout)
    }
}
