//! 出站泵与背压检查

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{Channel, Outbound};
use crate::error::{ChannelError, CloseReason, Result};

/// 出站队列背压状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// 长度不超过容量一半
    Normal,
    /// 长度超过容量一半
    Overflooded,
    /// 队列已满，通道将以 overflow 关闭
    Saturated,
}

impl Channel {
    /// 检查当前出站队列的背压状态
    pub fn check_backpressure(&self) -> Backpressure {
        let len = self.queue_len();
        let capacity = self.capacity();
        if len >= capacity {
            Backpressure::Saturated
        } else if len > capacity / 2 {
            Backpressure::Overflooded
        } else {
            Backpressure::Normal
        }
    }

    /// 检查背压并同步 overflow 登记表
    pub(crate) fn observe_backpressure(&self) -> Backpressure {
        let state = self.check_backpressure();
        match state {
            Backpressure::Overflooded => {
                if self.overflow.mark(self.key) {
                    debug!(channel_id = %self.id(), len = self.queue_len(), "channel overflooded");
                }
            }
            Backpressure::Normal => {
                self.overflow.clear(self.key);
            }
            Backpressure::Saturated => {}
        }
        state
    }

    /// 按 FIFO 写出队列中的帧，直到读到关闭哨兵或写失败
    #[instrument(skip(self), fields(channel_key = %self.key))]
    pub(crate) async fn run_outbound(self: Arc<Self>) -> Result<()> {
        let result = self.pump_outbound().await;
        // 与关闭流程并发的 mark 可能晚于 close 内的清除
        self.overflow.clear(self.key);
        result
    }

    async fn pump_outbound(self: &Arc<Self>) -> Result<()> {
        loop {
            if self.observe_backpressure() == Backpressure::Saturated {
                let capacity = self.capacity();
                warn!(channel_id = %self.id(), capacity, "outbound queue saturated, closing channel");
                self.close(CloseReason::Overflow { capacity }).await;
                return Err(ChannelError::Overflow { capacity });
            }

            let frame = match self.queue.pop().await {
                Outbound::Close => {
                    debug!("outbound pump observed close sentinel");
                    return Ok(());
                }
                Outbound::Frame(frame) => frame,
            };

            if !self.is_alive() {
                continue;
            }

            if let Err(err) = self.transport.write_frame(&frame).await {
                if !self.close(CloseReason::Transport(err.clone())).await {
                    // 写失败源于并发关闭
                    return Ok(());
                }
                return Err(err.into());
            }
            self.metrics.frames_sent_total.inc();
        }
    }
}
