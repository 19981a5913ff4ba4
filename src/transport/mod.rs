//! 传输层抽象
//!
//! 通道只依赖 [`Transport`] 接口：读写不透明文本帧、关闭连接、查询心跳参数。
//! 读与写可能分别在入站泵与出站泵中并发进行，`close` 必须能唤醒阻塞中的读。

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

pub mod memory;
pub mod websocket;

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// 双工帧传输
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 读取一帧（阻塞直到有帧、连接关闭或出错）
    async fn read_frame(&self) -> Result<String, TransportError>;

    /// 写出一帧
    async fn write_frame(&self, frame: &str) -> Result<(), TransportError>;

    /// 关闭连接
    async fn close(&self) -> Result<(), TransportError>;

    /// 心跳参数：(间隔, 超时)
    fn heartbeat_params(&self) -> (Duration, Duration);
}
