//! WebSocket 传输适配
//!
//! 将 `tokio_tungstenite::WebSocketStream` 拆分为 sink / stream，分别置于异步锁之后，
//! 使入站泵的读与出站泵的写可以并发进行。

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use super::Transport;
use crate::config::ChannelConfig;
use crate::error::TransportError;

/// WebSocket 传输
pub struct WebSocketTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    closed: watch::Sender<bool>,
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// 包装已完成握手的 WebSocket 连接
    pub fn new(ws: WebSocketStream<S>, ping_interval: Duration, ping_timeout: Duration) -> Self {
        let (sink, stream) = ws.split();
        let (closed, _) = watch::channel(false);
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed,
            ping_interval,
            ping_timeout,
        }
    }

    /// 使用通道配置中的心跳参数包装连接
    pub fn from_config(ws: WebSocketStream<S>, config: &ChannelConfig) -> Self {
        Self::new(ws, config.ping_interval(), config.ping_timeout())
    }

    /// 在原始字节流上完成服务端握手
    pub async fn accept(stream: S, config: &ChannelConfig) -> Result<Self, TransportError> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|err| TransportError::WebSocket(err.to_string()))?;
        Ok(Self::from_config(ws, config))
    }

    async fn next_text(&self) -> Result<String, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text),
                Some(Ok(WsMessage::Binary(_))) => {
                    return Err(TransportError::Io("binary frames are not supported".into()));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "websocket closed by peer");
                    return Err(TransportError::Closed);
                }
                // ping/pong 由 tungstenite 自动处理
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(TransportError::WebSocket(err.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&self) -> Result<String, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::Closed);
        }

        tokio::select! {
            _ = closed.wait_for(|closed| *closed) => Err(TransportError::Closed),
            frame = self.next_text() => frame,
        }
    }

    async fn write_frame(&self, frame: &str) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(frame.to_string()))
            .await
            .map_err(|err| TransportError::WebSocket(err.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);

        // 写端可能阻塞在慢对端上，关闭最多等待一个心跳超时
        let shutdown = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(self.ping_timeout, shutdown).await {
            Ok(result) => result.map_err(|err| TransportError::WebSocket(err.to_string())),
            Err(_) => Err(TransportError::Io("websocket close timed out".into())),
        }
    }

    fn heartbeat_params(&self) -> (Duration, Duration) {
        (self.ping_interval, self.ping_timeout)
    }
}
