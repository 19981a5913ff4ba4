//! 基于事件名的分发器
//!
//! ```ignore
//! let router = EventRouter::new();
//! router.on("sum", |_channel, args| async move {
//!     let nums: Vec<i64> = serde_json::from_str(&args).ok()?;
//!     Some(format!("[{}]", nums.iter().sum::<i64>()))
//! });
//! ```

use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use super::EventDispatcher;
use crate::channel::Channel;
use crate::error::CloseReason;
use crate::protocol::{self, Message, MessageKind};

/// 事件处理函数
///
/// 参数为事件参数的 JSON 数组文本；对需要回复的调用，返回值为回复参数的 JSON 数组文本，
/// 返回 `None` 时回复空数组。
pub type EventHandler =
    Arc<dyn Fn(Arc<Channel>, String) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// 连接建立回调
pub type LifecycleHandler = Arc<dyn Fn(Arc<Channel>) -> BoxFuture<'static, ()> + Send + Sync>;

/// 连接断开回调
pub type DisconnectHandler =
    Arc<dyn Fn(Arc<Channel>, CloseReason) -> BoxFuture<'static, ()> + Send + Sync>;

/// 事件路由
#[derive(Default)]
pub struct EventRouter {
    handlers: DashMap<String, EventHandler>,
    connection: RwLock<Option<LifecycleHandler>>,
    disconnection: RwLock<Option<DisconnectHandler>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事件处理函数，同名事件后注册的覆盖先注册的
    pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Channel>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |channel, args| handler(channel, args).boxed());
        self.handlers.insert(event.into(), handler);
    }

    /// 设置连接建立回调
    pub fn on_connection<F, Fut>(&self, handler: F)
    where
        F: Fn(Arc<Channel>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: LifecycleHandler = Arc::new(move |channel| handler(channel).boxed());
        *self
            .connection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    /// 设置连接断开回调
    pub fn on_disconnection<F, Fut>(&self, handler: F)
    where
        F: Fn(Arc<Channel>, CloseReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: DisconnectHandler =
            Arc::new(move |channel, reason| handler(channel, reason).boxed());
        *self
            .disconnection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    /// 是否注册了指定事件
    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    fn handler(&self, event: &str) -> Option<EventHandler> {
        self.handlers.get(event).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl EventDispatcher for EventRouter {
    async fn on_connect(&self, channel: Arc<Channel>) {
        let handler = self
            .connection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler(channel).await;
        }
    }

    async fn on_disconnect(&self, channel: Arc<Channel>, reason: CloseReason) {
        let handler = self
            .disconnection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler(channel, reason).await;
        }
    }

    async fn on_message(&self, channel: Arc<Channel>, message: Message) {
        match message.kind {
            MessageKind::Emit => {
                let Some(handler) = self.handler(&message.method) else {
                    debug!(channel_id = %channel.id(), event = %message.method, "no handler for event");
                    return;
                };
                handler(channel, message.args).await;
            }
            MessageKind::AckRequest => {
                let Some(id) = message.ack_id else {
                    return;
                };
                let Some(handler) = self.handler(&message.method) else {
                    debug!(channel_id = %channel.id(), event = %message.method, ack_id = id, "no handler for ack request");
                    return;
                };
                let reply = handler(channel.clone(), message.args)
                    .await
                    .unwrap_or_else(|| "[]".to_string());
                if let Err(err) = channel
                    .enqueue(protocol::encode_ack_response(id, &reply))
                    .await
                {
                    debug!(channel_id = %channel.id(), ack_id = id, error = %err, "failed to send ack reply");
                }
            }
            MessageKind::AckResponse => {
                if let Some(id) = message.ack_id {
                    channel.acks().resolve(id, message.args);
                }
            }
            MessageKind::Close => {
                debug!(channel_id = %channel.id(), "peer requested close");
                channel.close(CloseReason::Requested).await;
            }
            MessageKind::Empty | MessageKind::Open | MessageKind::Ping | MessageKind::Pong => {}
        }
    }
}
