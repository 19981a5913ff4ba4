//! 推送网关
//!
//! 接受传输并为其创建 [`Channel`]、启动三个泵；按会话 ID 索引在线通道，
//! 提供 overflow 监控查询与广播。
//!
//! 网关在业务分发器之前插入一层，握手完成时登记通道、关闭时移除，
//! 业务分发器收到的事件不受影响。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::channel::{Channel, ChannelTasks};
use crate::config::ChannelConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{CloseReason, Result};
use crate::metrics::ChannelMetrics;
use crate::overflow::OverflowRegistry;
use crate::protocol::{self, Message};
use crate::transport::Transport;

type ChannelMap = DashMap<String, Arc<Channel>>;

/// 推送网关
pub struct Gateway {
    config: ChannelConfig,
    overflow: Arc<OverflowRegistry>,
    metrics: Arc<ChannelMetrics>,
    channels: Arc<ChannelMap>,
    dispatcher: Arc<IndexingDispatcher>,
}

impl Gateway {
    /// 使用全局指标创建网关
    pub fn new(config: ChannelConfig, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self::with_metrics(config, dispatcher, ChannelMetrics::global())
    }

    /// 使用指定指标创建网关
    pub fn with_metrics(
        config: ChannelConfig,
        dispatcher: Arc<dyn EventDispatcher>,
        metrics: Arc<ChannelMetrics>,
    ) -> Self {
        let channels = Arc::new(ChannelMap::new());
        let overflow = Arc::new(OverflowRegistry::with_gauge(
            metrics.overflooded_channels.clone(),
        ));
        Self {
            config,
            overflow,
            metrics,
            dispatcher: Arc::new(IndexingDispatcher {
                channels: channels.clone(),
                inner: dispatcher,
            }),
            channels,
        }
    }

    /// 接受一个传输：创建通道并启动入站、出站、心跳泵
    pub fn accept(&self, transport: Arc<dyn Transport>) -> (Arc<Channel>, ChannelTasks) {
        let channel = Channel::new(
            transport,
            self.dispatcher.clone(),
            self.overflow.clone(),
            self.metrics.clone(),
            self.config.clone(),
        );
        let tasks = channel.spawn_pumps();
        debug!(channel_key = %channel.key(), "channel accepted");
        (channel, tasks)
    }

    /// 按会话 ID 查找在线通道
    pub fn channel(&self, sid: &str) -> Option<Arc<Channel>> {
        self.channels.get(sid).map(|entry| entry.value().clone())
    }

    /// 已完成握手的在线通道数
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 当前 overflooded 的通道数
    pub fn overflow_count(&self) -> usize {
        self.overflow.count()
    }

    /// overflow 登记表
    pub fn overflow_registry(&self) -> &Arc<OverflowRegistry> {
        &self.overflow
    }

    /// 向所有在线通道发送事件，返回成功入队的通道数
    ///
    /// 使用不等待的入队：队满的通道被跳过，不阻塞其余通道。
    pub fn broadcast<T: Serialize + ?Sized>(&self, event: &str, args: &T) -> Result<usize> {
        let frame = protocol::encode_emit(event, args)?;
        let channels: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0;
        for channel in channels {
            match channel.try_enqueue(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(channel_id = %channel.id(), error = %err, "broadcast skipped channel");
                }
            }
        }
        Ok(delivered)
    }

    /// 关闭所有在线通道
    pub async fn shutdown(&self) {
        let channels: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        info!(channels = channels.len(), "shutting down gateway");
        for channel in channels {
            channel.close(CloseReason::Requested).await;
        }
    }
}

/// 维护会话索引的分发器包装
struct IndexingDispatcher {
    channels: Arc<ChannelMap>,
    inner: Arc<dyn EventDispatcher>,
}

#[async_trait]
impl EventDispatcher for IndexingDispatcher {
    async fn on_connect(&self, channel: Arc<Channel>) {
        let key = channel.key();
        self.channels
            .insert(channel.id().to_string(), channel.clone());
        // 先登记再检查：与 on_disconnect 的移除交错时不会留下已关闭的通道
        if !channel.is_alive() {
            self.channels
                .remove_if(channel.id(), |_, current| current.key() == key);
            debug!(channel_id = %channel.id(), "closed channel not indexed");
            return;
        }
        self.inner.on_connect(channel).await;
    }

    async fn on_disconnect(&self, channel: Arc<Channel>, reason: CloseReason) {
        let key = channel.key();
        // 同一 sid 可能已被新连接占用，只移除自己
        self.channels
            .remove_if(channel.id(), |_, current| current.key() == key);
        self.inner.on_disconnect(channel, reason).await;
    }

    async fn on_message(&self, channel: Arc<Channel>, message: Message) {
        self.inner.on_message(channel, message).await;
    }
}
