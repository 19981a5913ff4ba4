//! ACK 关联表
//!
//! - id 为 `u32`，从 1 开始单调递增，超过 `u32::MAX` 后回绕到 1（0 永不分配）
//! - 回绕后若候选 id 仍在等待中，则跳到下一个空闲 id
//! - 同时等待中的条目数不超过 `limit`，超出返回 [`ChannelError::AckTableFull`]
//! - 通道关闭时 [`AckCorrelator::release_all`] 以 [`ChannelError::Closed`] 释放全部等待方

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ChannelError;

/// 回复槽位的接收端
pub type AckReceiver = oneshot::Receiver<Result<String, ChannelError>>;

type AckSender = oneshot::Sender<Result<String, ChannelError>>;

/// ACK 关联表
pub struct AckCorrelator {
    waiters: DashMap<u32, AckSender>,
    /// 最近一次分配的 id
    last_id: AtomicU32,
    /// 已占用的名额（严格不超过 limit）
    reserved: AtomicUsize,
    limit: usize,
    closed: AtomicBool,
}

impl AckCorrelator {
    /// 创建关联表
    pub fn new(limit: usize) -> Self {
        Self::starting_after(limit, 0)
    }

    /// 从指定 id 之后开始分配
    pub(crate) fn starting_after(limit: usize, last_id: u32) -> Self {
        Self {
            waiters: DashMap::new(),
            last_id: AtomicU32::new(last_id),
            reserved: AtomicUsize::new(0),
            limit,
            closed: AtomicBool::new(false),
        }
    }

    /// 注册一个等待回复的调用
    pub fn register(&self) -> Result<(u32, AckReceiver), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let limit = self.limit;
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .map_err(|_| ChannelError::AckTableFull { limit })?;

        let (tx, rx) = oneshot::channel();
        // 占用中的 id 最多 limit - 1 个，limit + 1 次尝试内必然找到空位
        let mut slot = Some(tx);
        let mut issued = None;
        for _ in 0..=limit {
            let id = self.next_candidate();
            if let Entry::Vacant(vacant) = self.waiters.entry(id) {
                if let Some(tx) = slot.take() {
                    vacant.insert(tx);
                }
                issued = Some(id);
                break;
            }
            debug!(ack_id = id, "ack id still pending after wraparound, skipping");
        }

        let Some(id) = issued else {
            self.reserved.fetch_sub(1, Ordering::SeqCst);
            return Err(ChannelError::AckTableFull { limit });
        };

        // 与 release_all 竞争：关闭后插入的条目由注册方自行撤回
        if self.closed.load(Ordering::SeqCst) {
            self.cancel(id);
            return Err(ChannelError::Closed);
        }

        Ok((id, rx))
    }

    fn next_candidate(&self) -> u32 {
        let advance = |id: u32| if id == u32::MAX { 1 } else { id + 1 };
        let previous = self
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| Some(advance(id)))
            .unwrap_or_else(|id| id);
        advance(previous)
    }

    /// 用回复内容完成等待中的调用
    ///
    /// 未知或已过期的 id 返回 `false`。
    pub fn resolve(&self, id: u32, payload: String) -> bool {
        match self.take(id) {
            Some(tx) => tx.send(Ok(payload)).is_ok(),
            None => {
                debug!(ack_id = id, "dropping reply for unknown ack id");
                false
            }
        }
    }

    /// 放弃等待中的调用（例如超时）
    pub fn cancel(&self, id: u32) -> bool {
        self.take(id).is_some()
    }

    /// 释放全部等待方，之后的注册均返回 [`ChannelError::Closed`]
    pub fn release_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<u32> = self.waiters.iter().map(|entry| *entry.key()).collect();
        let mut released = 0;
        for id in ids {
            if let Some(tx) = self.take(id) {
                let _ = tx.send(Err(ChannelError::Closed));
                released += 1;
            }
        }
        released
    }

    /// 当前等待中的调用数
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    /// 上限
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn take(&self, id: u32) -> Option<AckSender> {
        let (_, tx) = self.waiters.remove(&id)?;
        self.reserved.fetch_sub(1, Ordering::SeqCst);
        Some(tx)
    }
}
