//! 入站泵

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::Channel;
use crate::error::{ChannelError, CloseReason, Result};
use crate::protocol::{self, Message, MessageKind, PONG_FRAME};

impl Channel {
    /// 读帧并处理，直到传输出错或通道关闭
    ///
    /// open/ping/pong 按读取顺序内联处理，其余消息各自派生任务交给分发器。
    /// 解码或握手失败时关闭通道并立即退出。
    #[instrument(skip(self), fields(channel_key = %self.key))]
    pub(crate) async fn run_inbound(self: Arc<Self>) -> Result<()> {
        loop {
            let frame = match self.transport.read_frame().await {
                Ok(frame) => frame,
                Err(err) => {
                    // 已被其他路径关闭时读失败属于正常退出
                    if !self.close(CloseReason::Transport(err.clone())).await {
                        debug!("inbound pump stopped after close");
                        return Ok(());
                    }
                    return Err(err.into());
                }
            };
            self.metrics.frames_received_total.inc();

            let message = match protocol::decode(&frame) {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, "malformed frame, closing channel");
                    self.close(CloseReason::MalformedFrame(err.clone())).await;
                    return Err(err.into());
                }
            };

            if !message.kind.is_control() {
                self.dispatch(message);
                continue;
            }

            match message.kind {
                MessageKind::Open => self.handle_open(&message).await?,
                MessageKind::Ping => match self.enqueue(PONG_FRAME).await {
                    Ok(()) => {}
                    Err(ChannelError::Closed) => return Ok(()),
                    Err(err) => return Err(err),
                },
                _ => {}
            }
        }
    }

    async fn handle_open(self: &Arc<Self>, message: &Message) -> Result<()> {
        let header = match protocol::parse_header(message.payload()) {
            Ok(header) => header,
            Err(err) => {
                warn!(error = %err, "wrong handshake header, closing channel");
                self.close(CloseReason::WrongHeader(err.clone())).await;
                return Err(err.into());
            }
        };

        if self.header.set(header).is_err() {
            warn!(channel_id = %self.id(), "duplicate open frame ignored");
            return Ok(());
        }

        // 读到 open 帧之后通道可能已被其他泵关闭，断开之后不再报告连接
        if !self.is_alive() {
            debug!(channel_id = %self.id(), "open frame arrived after close, connect skipped");
            return Ok(());
        }

        info!(
            channel_id = %self.id(),
            ping_interval_ms = self.header().map(|h| h.ping_interval).unwrap_or_default(),
            "channel connected"
        );
        self.dispatcher.on_connect(self.clone()).await;
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, message: Message) {
        let channel = self.clone();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.on_message(channel, message).await;
        });
    }
}
