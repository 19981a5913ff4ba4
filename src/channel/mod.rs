//! 推送通道
//!
//! 每个已接受的连接对应一个 [`Channel`]：持有传输、有界出站队列、握手头、
//! 存活标志与 ACK 关联表，由三个并发泵驱动：
//!
//! - 入站泵 [`Channel::run_inbound`]：读帧、解码、内联处理 open/ping/pong，其余交给分发器
//! - 出站泵 [`Channel::run_outbound`]：按 FIFO 写出队列中的帧，并维护背压状态
//! - 心跳泵 [`Channel::run_heartbeat`]：周期性入队 ping
//!
//! 任一泵遇到致命错误都调用 [`Channel::close`]；关闭流程幂等，可被多个泵并发调用。

mod heartbeat;
mod inbound;
mod outbound;
mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ack::AckCorrelator;
use crate::config::ChannelConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{ChannelError, CloseReason, Result};
use crate::metrics::ChannelMetrics;
use crate::overflow::OverflowRegistry;
use crate::protocol::{self, Header};
use crate::transport::Transport;

pub use outbound::Backpressure;
pub(crate) use queue::{Outbound, OutboundQueue};

/// 推送通道
pub struct Channel {
    /// 连接标识（握手前即存在，用于 overflow 登记表）
    key: Uuid,
    transport: Arc<dyn Transport>,
    queue: OutboundQueue,
    header: OnceLock<Header>,
    alive: AtomicBool,
    /// 关闭流程互斥锁，仅在 close 内部获取
    close_lock: tokio::sync::Mutex<()>,
    close_reason: OnceLock<CloseReason>,
    acks: AckCorrelator,
    overflow: Arc<OverflowRegistry>,
    dispatcher: Arc<dyn EventDispatcher>,
    metrics: Arc<ChannelMetrics>,
    config: ChannelConfig,
}

/// 通道三个泵的任务句柄
pub struct ChannelTasks {
    pub inbound: JoinHandle<Result<()>>,
    pub outbound: JoinHandle<Result<()>>,
    pub heartbeat: JoinHandle<()>,
}

impl Channel {
    /// 创建并初始化通道
    ///
    /// 分配容量为 `config.queue_capacity` 的出站队列与空的 ACK 关联表，并置为存活。
    /// 必须在任何泵启动之前完成。
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn EventDispatcher>,
        overflow: Arc<OverflowRegistry>,
        metrics: Arc<ChannelMetrics>,
        config: ChannelConfig,
    ) -> Arc<Self> {
        let channel = Arc::new(Self {
            key: Uuid::new_v4(),
            transport,
            queue: OutboundQueue::new(config.queue_capacity),
            header: OnceLock::new(),
            alive: AtomicBool::new(true),
            close_lock: tokio::sync::Mutex::new(()),
            close_reason: OnceLock::new(),
            acks: AckCorrelator::new(config.max_pending_acks),
            overflow,
            dispatcher,
            metrics,
            config,
        });
        channel.metrics.channels_active.inc();
        debug!(channel_key = %channel.key, capacity = channel.capacity(), "channel initialized");
        channel
    }

    /// 启动入站、出站、心跳三个泵
    pub fn spawn_pumps(self: &Arc<Self>) -> ChannelTasks {
        ChannelTasks {
            inbound: tokio::spawn(self.clone().run_inbound()),
            outbound: tokio::spawn(self.clone().run_outbound()),
            heartbeat: tokio::spawn(self.clone().run_heartbeat()),
        }
    }

    /// 会话 ID（握手完成前为空字符串）
    pub fn id(&self) -> &str {
        self.header.get().map(|h| h.sid.as_str()).unwrap_or_default()
    }

    /// 连接标识
    pub fn key(&self) -> Uuid {
        self.key
    }

    /// 握手头（握手完成前为 `None`）
    pub fn header(&self) -> Option<&Header> {
        self.header.get()
    }

    /// 通道是否存活
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// 关闭原因（仍存活时为 `None`）
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.get()
    }

    /// 出站队列当前长度
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// 出站队列容量
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// ACK 关联表
    pub fn acks(&self) -> &AckCorrelator {
        &self.acks
    }

    /// 默认 ACK 超时
    pub fn default_ack_timeout(&self) -> Duration {
        self.config.default_ack_timeout()
    }

    /// 将原始帧放入出站队列
    ///
    /// 队满时等待空位；通道关闭后（包括等待期间被关闭）返回 [`ChannelError::Closed`]。
    pub async fn enqueue(&self, frame: impl Into<String>) -> Result<()> {
        if !self.is_alive() {
            return Err(ChannelError::Closed);
        }
        self.queue.push(frame.into()).await
    }

    /// 将原始帧放入出站队列，不等待；队满时返回 [`ChannelError::Overflow`]
    pub fn try_enqueue(&self, frame: impl Into<String>) -> Result<()> {
        if !self.is_alive() {
            return Err(ChannelError::Closed);
        }
        self.queue.try_push(frame.into())
    }

    /// 发送事件
    pub async fn emit<T: Serialize + ?Sized>(&self, method: &str, args: &T) -> Result<()> {
        let frame = protocol::encode_emit(method, args)?;
        self.enqueue(frame).await
    }

    /// 发送需要回复的调用并等待回复
    ///
    /// 返回回复参数的 JSON 数组文本。超时返回 [`ChannelError::AckTimeout`]，
    /// 等待期间通道关闭返回 [`ChannelError::Closed`]。
    pub async fn ack<T: Serialize + ?Sized>(
        &self,
        method: &str,
        args: &T,
        timeout: Duration,
    ) -> Result<String> {
        let (id, reply) = self.acks.register()?;

        let frame = match protocol::encode_ack_request(id, method, args) {
            Ok(frame) => frame,
            Err(err) => {
                self.acks.cancel(id);
                return Err(err.into());
            }
        };
        if let Err(err) = self.enqueue(frame).await {
            self.acks.cancel(id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.acks.cancel(id);
                Err(ChannelError::AckTimeout { id })
            }
        }
    }

    /// 按配置的默认超时发送需要回复的调用
    pub async fn call<T: Serialize + ?Sized>(&self, method: &str, args: &T) -> Result<String> {
        self.ack(method, args, self.default_ack_timeout()).await
    }

    /// 关闭通道
    ///
    /// 幂等：只有第一个调用者执行关闭流程并返回 `true`，其余调用直接返回 `false`。
    /// 关闭流程：关闭传输 -> 置为不存活 -> 丢弃待发帧并放入关闭哨兵；
    /// 释放锁之后再释放 ACK 等待方、清除 overflow 登记、触发断开事件。
    pub async fn close(self: &Arc<Self>, reason: CloseReason) -> bool {
        let discarded = {
            let _guard = self.close_lock.lock().await;
            if !self.is_alive() {
                return false;
            }

            if let Err(err) = self.transport.close().await {
                debug!(channel_id = %self.id(), error = %err, "transport close failed");
            }
            self.alive.store(false, Ordering::Release);
            let _ = self.close_reason.set(reason.clone());
            self.queue.close_and_drain()
        };

        let released = self.acks.release_all();
        self.overflow.clear(self.key);
        self.metrics.frames_discarded_total.inc_by(discarded as u64);
        self.metrics.record_close(reason.label());

        info!(
            channel_id = %self.id(),
            channel_key = %self.key,
            reason = %reason,
            discarded,
            released_acks = released,
            "channel closed"
        );

        self.dispatcher.on_disconnect(self.clone(), reason).await;
        true
    }
}
