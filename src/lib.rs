//! Flare 推送通道
//!
//! 长连接推送通道的连接生命周期核心：
//! - [`channel::Channel`]：入站/出站/心跳三个泵、有界出站队列、幂等关闭协议
//! - [`ack::AckCorrelator`]：调用 id 与回复的关联
//! - [`overflow::OverflowRegistry`]：overflooded 通道的监控登记表
//! - [`gateway::Gateway`]：接受传输、索引在线通道
//!
//! 传输与业务分发通过 [`transport::Transport`] 与 [`dispatch::EventDispatcher`] 注入。

pub mod ack;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod overflow;
pub mod protocol;
pub mod tracing;
pub mod transport;

pub use ack::{AckCorrelator, AckReceiver};
pub use channel::{Backpressure, Channel, ChannelTasks};
pub use config::{
    ChannelConfig, ConfigManager, LoggingConfig, PushChannelConfig, load_config,
    load_config_with_validation,
};
pub use dispatch::{EventDispatcher, EventRouter};
pub use error::{ChannelError, CloseReason, ProtocolError, Result, TransportError};
pub use gateway::Gateway;
pub use metrics::ChannelMetrics;
pub use overflow::OverflowRegistry;
pub use protocol::{Header, Message, MessageKind};
pub use transport::{MemoryTransport, Transport, WebSocketTransport};
