//! 心跳泵

use std::sync::Arc;

use tracing::{debug, instrument};

use super::Channel;
use crate::protocol::PING_FRAME;

impl Channel {
    /// 按传输给出的间隔周期性入队 ping，通道关闭后退出
    ///
    /// 本身不感知背压：对端不再消费时由出站泵的饱和检查关闭通道。
    #[instrument(skip(self), fields(channel_key = %self.key))]
    pub(crate) async fn run_heartbeat(self: Arc<Self>) {
        loop {
            let (interval, _) = self.transport.heartbeat_params();
            tokio::time::sleep(interval).await;
            if !self.is_alive() {
                break;
            }
            if self.enqueue(PING_FRAME).await.is_err() {
                break;
            }
            self.metrics.heartbeats_sent_total.inc();
        }
        debug!("heartbeat pump stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::channel::tests::fixture;
    use crate::config::ChannelConfig;
    use crate::dispatch::testing::RecordingDispatcher;
    use crate::error::{CloseReason, TransportError};
    use crate::metrics::ChannelMetrics;
    use crate::overflow::OverflowRegistry;
    use crate::transport::Transport;

    /// 心跳间隔可在运行中调整的传输
    struct TunableTransport {
        interval_secs: AtomicU64,
    }

    #[async_trait]
    impl Transport for TunableTransport {
        async fn read_frame(&self) -> Result<String, TransportError> {
            std::future::pending().await
        }

        async fn write_frame(&self, _frame: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn heartbeat_params(&self) -> (Duration, Duration) {
            (
                Duration::from_secs(self.interval_secs.load(Ordering::SeqCst)),
                Duration::from_secs(60),
            )
        }
    }

    async fn settle(done: impl Fn() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_enqueues_ping_each_interval() {
        let fx = fixture(8);
        let heartbeat = tokio::spawn(fx.channel.clone().run_heartbeat());
        // 让心跳任务先注册定时器
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(25)).await;
        settle(|| fx.channel.queue_len() == 1).await;
        assert_eq!(fx.channel.queue_len(), 1);

        // 间隔未到不会产生新的 ping
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(fx.channel.queue_len(), 1);

        tokio::time::advance(Duration::from_secs(15)).await;
        settle(|| fx.channel.queue_len() == 2).await;
        assert_eq!(fx.channel.queue_len(), 2);

        fx.channel.close(CloseReason::Requested).await;
        tokio::time::advance(Duration::from_secs(25)).await;
        heartbeat.await.unwrap();
        // 关闭后只剩哨兵
        assert_eq!(fx.channel.queue_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_follows_interval_changes() {
        let transport = Arc::new(TunableTransport {
            interval_secs: AtomicU64::new(10),
        });
        let channel = Channel::new(
            transport.clone(),
            Arc::new(RecordingDispatcher::default()),
            Arc::new(OverflowRegistry::new()),
            Arc::new(ChannelMetrics::unregistered()),
            ChannelConfig::default(),
        );
        let heartbeat = tokio::spawn(channel.clone().run_heartbeat());
        tokio::task::yield_now().await;

        // 当前这一轮仍按 10s 计时，下一轮起按 30s
        transport.interval_secs.store(30, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(10)).await;
        settle(|| channel.queue_len() == 1).await;
        assert_eq!(channel.queue_len(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(channel.queue_len(), 1);

        tokio::time::advance(Duration::from_secs(20)).await;
        settle(|| channel.queue_len() == 2).await;
        assert_eq!(channel.queue_len(), 2);

        channel.close(CloseReason::Requested).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        heartbeat.await.unwrap();
    }
}
