//! 事件分发
//!
//! 通道核心只通过 [`EventDispatcher`] 向业务层报告连接建立、断开与应用消息。
//! [`EventRouter`] 是基于事件名的默认实现。

use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::error::CloseReason;
use crate::protocol::Message;

pub mod router;

pub use router::{DisconnectHandler, EventHandler, EventRouter, LifecycleHandler};

/// 事件分发器
///
/// `on_message` 为每条应用消息单独派生任务执行，彼此之间以及与协议控制消息的处理并发进行；
/// 其返回值与失败都不会被入站泵观察到，分发器需要自行上报错误。
#[async_trait]
pub trait EventDispatcher: Send + Sync + 'static {
    /// 握手完成
    async fn on_connect(&self, channel: Arc<Channel>);

    /// 通道关闭（每个通道恰好一次）
    async fn on_disconnect(&self, channel: Arc<Channel>, reason: CloseReason);

    /// 应用消息
    async fn on_message(&self, channel: Arc<Channel>, message: Message);
}
