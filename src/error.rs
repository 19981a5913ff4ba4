//! 推送通道错误模块
//!
//! - 传输层错误 `TransportError`（读写/关闭失败）
//! - 协议层错误 `ProtocolError`（帧格式错误、握手头错误）
//! - 通道错误 `ChannelError`（对外 API 统一返回类型）
//! - 关闭原因 `CloseReason`（所有致命错误最终汇入唯一的关闭流程）

use std::fmt;

/// 通道统一结果类型
pub type Result<T> = std::result::Result<T, ChannelError>;

/// 传输层错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// 连接已关闭（本端关闭或对端断开）
    #[error("transport closed")]
    Closed,
    /// 底层 I/O 失败
    #[error("transport i/o error: {0}")]
    Io(String),
    /// WebSocket 协议层失败
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// 协议层错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// 空帧
    #[error("empty frame")]
    EmptyFrame,
    /// 未知的包类型
    #[error("unknown packet type: {0}")]
    UnknownPacketType(String),
    /// 负载格式错误
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// 握手头解析失败
    #[error("wrong header: {0}")]
    WrongHeader(String),
}

/// 通道错误
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// 出站队列饱和
    #[error("outbound queue overflow (capacity {capacity})")]
    Overflow { capacity: usize },
    /// 通道已关闭
    #[error("channel closed")]
    Closed,
    /// 等待 ACK 回复超时
    #[error("ack {id} timed out")]
    AckTimeout { id: u32 },
    /// 待回复调用数量达到上限
    #[error("too many pending acks (limit {limit})")]
    AckTableFull { limit: usize },
    /// 负载序列化失败
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 通道关闭原因
///
/// 传输失败、协议违例、队列饱和以及外部显式关闭都会汇总为一个关闭原因，
/// 交给 [`crate::channel::Channel::close`] 处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 传输层读写失败
    Transport(TransportError),
    /// 入站帧无法解码
    MalformedFrame(ProtocolError),
    /// 握手头解析失败
    WrongHeader(ProtocolError),
    /// 出站队列饱和
    Overflow { capacity: usize },
    /// 外部主动关闭
    Requested,
}

impl CloseReason {
    /// 稳定的原因标签（用于指标 label 与日志）
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Transport(_) => "transport",
            CloseReason::MalformedFrame(_) => "malformed_frame",
            CloseReason::WrongHeader(_) => "wrong_header",
            CloseReason::Overflow { .. } => "overflow",
            CloseReason::Requested => "requested",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Transport(err) => write!(f, "transport failure: {err}"),
            CloseReason::MalformedFrame(err) => write!(f, "malformed frame: {err}"),
            CloseReason::WrongHeader(err) => write!(f, "{err}"),
            CloseReason::Overflow { capacity } => {
                write!(f, "outbound queue overflow (capacity {capacity})")
            }
            CloseReason::Requested => f.write_str("close requested"),
        }
    }
}

impl From<TransportError> for CloseReason {
    fn from(err: TransportError) -> Self {
        CloseReason::Transport(err)
    }
}
