//! # Prometheus 指标收集模块
//!
//! 为推送通道提供统一的 Prometheus 指标：活跃通道数、关闭原因分布、
//! 收发帧计数、心跳计数以及背压（overflooded）状态。

use std::sync::Arc;

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static GLOBAL_METRICS: Lazy<Arc<ChannelMetrics>> = Lazy::new(|| {
    let metrics = ChannelMetrics::unregistered();
    // 注册指标，忽略重复注册错误
    metrics.register_lossy(&REGISTRY);
    Arc::new(metrics)
});

/// 推送通道指标
#[derive(Clone)]
pub struct ChannelMetrics {
    /// 当前活跃通道数
    pub channels_active: IntGauge,
    /// 通道关闭总数（按原因）
    pub channels_closed_total: IntCounterVec,
    /// 收到的帧总数
    pub frames_received_total: IntCounter,
    /// 写出的帧总数
    pub frames_sent_total: IntCounter,
    /// 发送的心跳总数
    pub heartbeats_sent_total: IntCounter,
    /// 关闭时丢弃的出站帧总数
    pub frames_discarded_total: IntCounter,
    /// 当前处于 overflooded 状态的通道数
    pub overflooded_channels: IntGauge,
}

impl ChannelMetrics {
    /// 创建指标并注册到指定注册表
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::unregistered();
        registry.register(Box::new(metrics.channels_active.clone()))?;
        registry.register(Box::new(metrics.channels_closed_total.clone()))?;
        registry.register(Box::new(metrics.frames_received_total.clone()))?;
        registry.register(Box::new(metrics.frames_sent_total.clone()))?;
        registry.register(Box::new(metrics.heartbeats_sent_total.clone()))?;
        registry.register(Box::new(metrics.frames_discarded_total.clone()))?;
        registry.register(Box::new(metrics.overflooded_channels.clone()))?;
        Ok(metrics)
    }

    /// 全局共享指标（注册在 [`REGISTRY`] 上）
    pub fn global() -> Arc<Self> {
        GLOBAL_METRICS.clone()
    }

    /// 创建未注册的指标（测试中互不干扰）
    pub fn unregistered() -> Self {
        Self {
            channels_active: IntGauge::new(
                "push_channels_active",
                "Number of live push channels",
            )
            .expect("Failed to create push_channels_active metric"),
            channels_closed_total: IntCounterVec::new(
                Opts::new(
                    "push_channels_closed_total",
                    "Total number of closed push channels",
                ),
                &["reason"],
            )
            .expect("Failed to create push_channels_closed_total metric"),
            frames_received_total: IntCounter::new(
                "push_frames_received_total",
                "Total number of frames read from transports",
            )
            .expect("Failed to create push_frames_received_total metric"),
            frames_sent_total: IntCounter::new(
                "push_frames_sent_total",
                "Total number of frames written to transports",
            )
            .expect("Failed to create push_frames_sent_total metric"),
            heartbeats_sent_total: IntCounter::new(
                "push_heartbeats_sent_total",
                "Total number of heartbeat probes enqueued",
            )
            .expect("Failed to create push_heartbeats_sent_total metric"),
            frames_discarded_total: IntCounter::new(
                "push_frames_discarded_total",
                "Total number of outbound frames discarded on close",
            )
            .expect("Failed to create push_frames_discarded_total metric"),
            overflooded_channels: IntGauge::new(
                "push_channels_overflooded",
                "Number of channels whose outbound queue is above half capacity",
            )
            .expect("Failed to create push_channels_overflooded metric"),
        }
    }

    fn register_lossy(&self, registry: &Registry) {
        let _ = registry.register(Box::new(self.channels_active.clone()));
        let _ = registry.register(Box::new(self.channels_closed_total.clone()));
        let _ = registry.register(Box::new(self.frames_received_total.clone()));
        let _ = registry.register(Box::new(self.frames_sent_total.clone()));
        let _ = registry.register(Box::new(self.heartbeats_sent_total.clone()));
        let _ = registry.register(Box::new(self.frames_discarded_total.clone()));
        let _ = registry.register(Box::new(self.overflooded_channels.clone()));
    }

    /// 记录一次通道关闭
    pub fn record_close(&self, reason: &str) {
        self.channels_active.dec();
        self.channels_closed_total.with_label_values(&[reason]).inc();
    }
}

/// 以文本格式导出全局注册表中的指标
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registers_on_private_registry() {
        let registry = Registry::new();
        let metrics = ChannelMetrics::new(&registry).unwrap();
        metrics.channels_active.inc();
        metrics.record_close("overflow");

        assert_eq!(metrics.channels_active.get(), 0);
        assert_eq!(
            metrics
                .channels_closed_total
                .with_label_values(&["overflow"])
                .get(),
            1
        );
        // 同一注册表重复注册应失败
        assert!(ChannelMetrics::new(&registry).is_err());
    }

    #[test]
    fn test_global_metrics_are_gathered() {
        let metrics = ChannelMetrics::global();
        metrics.heartbeats_sent_total.inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("push_heartbeats_sent_total"));
    }
}
