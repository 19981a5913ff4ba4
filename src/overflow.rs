//! Overflow 登记表
//!
//! 记录出站队列长度超过容量一半（overflooded）的通道，仅供监控查询，
//! 不影响通道行为；真正的饱和关闭由出站泵负责。
//!
//! 登记表由调用方显式持有并注入到通道（通常每个 [`crate::gateway::Gateway`] 一个），
//! 其锁与任何通道自身的锁互不嵌套。

use std::collections::HashSet;
use std::sync::Mutex;

use prometheus::IntGauge;
use uuid::Uuid;

/// Overflow 登记表
#[derive(Default)]
pub struct OverflowRegistry {
    members: Mutex<HashSet<Uuid>>,
    gauge: Option<IntGauge>,
}

impl OverflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 成员数变化时同步更新指标
    pub fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            members: Mutex::new(HashSet::new()),
            gauge: Some(gauge),
        }
    }

    /// 标记通道为 overflooded，新加入时返回 `true`
    pub fn mark(&self, channel: Uuid) -> bool {
        self.update(|members| members.insert(channel))
    }

    /// 清除通道的 overflooded 标记，原本存在时返回 `true`
    pub fn clear(&self, channel: Uuid) -> bool {
        self.update(|members| members.remove(&channel))
    }

    pub fn contains(&self, channel: Uuid) -> bool {
        self.lock().contains(&channel)
    }

    /// 当前 overflooded 的通道数
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn update(&self, op: impl FnOnce(&mut HashSet<Uuid>) -> bool) -> bool {
        let mut members = self.lock();
        let changed = op(&mut members);
        if changed {
            if let Some(gauge) = &self.gauge {
                gauge.set(members.len() as i64);
            }
        }
        changed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
