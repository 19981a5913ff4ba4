//! 有界出站队列
//!
//! 多生产者、单消费者的 FIFO：
//! - 容量由信号量名额表示，队满时 [`OutboundQueue::push`] 等待空位
//! - [`OutboundQueue::close_and_drain`] 丢弃全部待发帧并放入关闭哨兵，
//!   同时关闭信号量，使所有等待空位的生产者立即返回 [`ChannelError::Closed`]
//! - 哨兵一旦入队便始终位于队首，消费者重复读取也只会得到哨兵

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore, SemaphorePermit, TryAcquireError};

use crate::error::ChannelError;

/// 出站队列条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Frame(String),
    /// 关闭哨兵
    Close,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Outbound>,
    closed: bool,
}

pub(crate) struct OutboundQueue {
    state: Mutex<QueueState>,
    slots: Semaphore,
    readable: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            readable: Notify::new(),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前队列长度（关闭后为 1，即哨兵）
    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// 入队，队满时等待空位
    pub(crate) async fn push(&self, frame: String) -> Result<(), ChannelError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| ChannelError::Closed)?;
        self.push_with(permit, frame)
    }

    /// 入队，不等待
    pub(crate) fn try_push(&self, frame: String) -> Result<(), ChannelError> {
        match self.slots.try_acquire() {
            Ok(permit) => self.push_with(permit, frame),
            Err(TryAcquireError::Closed) => Err(ChannelError::Closed),
            Err(TryAcquireError::NoPermits) => Err(ChannelError::Overflow {
                capacity: self.capacity,
            }),
        }
    }

    fn push_with(&self, permit: SemaphorePermit<'_>, frame: String) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        // 名额随条目一起转移，出队时归还
        permit.forget();
        state.items.push_back(Outbound::Frame(frame));
        drop(state);

        self.readable.notify_one();
        Ok(())
    }

    /// 出队，队空时等待
    pub(crate) async fn pop(&self) -> Outbound {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.readable.notified().await;
        }
    }

    pub(crate) fn try_pop(&self) -> Option<Outbound> {
        let mut state = self.lock();
        if matches!(state.items.front()?, Outbound::Close) {
            return Some(Outbound::Close);
        }
        let item = state.items.pop_front();
        drop(state);
        self.slots.add_permits(1);
        item
    }

    /// 丢弃待发帧并放入关闭哨兵，返回丢弃的帧数
    pub(crate) fn close_and_drain(&self) -> usize {
        let mut state = self.lock();
        if state.closed {
            return 0;
        }
        state.closed = true;
        let discarded = state.items.len();
        state.items.clear();
        state.items.push_back(Outbound::Close);
        drop(state);

        self.slots.close();
        self.readable.notify_one();
        discarded
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = OutboundQueue::new(8);
        for i in 0..5 {
            queue.push(format!("m{i}")).await.unwrap();
        }
        assert_eq!(queue.len(), 5);
        for i in 0..5 {
            assert_eq!(queue.pop().await, Outbound::Frame(format!("m{i}")));
        }
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_try_push_reports_full() {
        let queue = OutboundQueue::new(2);
        queue.try_push("a".into()).unwrap();
        queue.try_push("b".into()).unwrap();
        assert!(matches!(
            queue.try_push("c".into()),
            Err(ChannelError::Overflow { capacity: 2 })
        ));

        queue.pop().await;
        queue.try_push("c".into()).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_close_drains_and_leaves_sentinel() {
        let queue = OutboundQueue::new(4);
        queue.push("a".into()).await.unwrap();
        queue.push("b".into()).await.unwrap();

        assert_eq!(queue.close_and_drain(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().await, Outbound::Close);
        // 哨兵保持在队首
        assert_eq!(queue.pop().await, Outbound::Close);
        assert!(matches!(queue.push("c".into()).await, Err(ChannelError::Closed)));
        assert!(matches!(queue.try_push("c".into()), Err(ChannelError::Closed)));
        assert_eq!(queue.close_and_drain(), 0);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_consumer() {
        let queue = Arc::new(OutboundQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close_and_drain();
        assert_eq!(consumer.await.unwrap(), Outbound::Close);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(OutboundQueue::new(2));
        queue.push("a".into()).await.unwrap();
        queue.push("b".into()).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push("c".into()).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!producer.is_finished());
        queue.close_and_drain();
        assert!(matches!(producer.await.unwrap(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_pending_pop_woken_by_push_and_close() {
        let queue = OutboundQueue::new(4);

        let mut pop = tokio_test::task::spawn(queue.pop());
        tokio_test::assert_pending!(pop.poll());
        queue.try_push("a".into()).unwrap();
        assert!(pop.is_woken());
        assert_eq!(tokio_test::assert_ready!(pop.poll()), Outbound::Frame("a".into()));
        drop(pop);

        let mut pop = tokio_test::task::spawn(queue.pop());
        tokio_test::assert_pending!(pop.poll());
        queue.close_and_drain();
        assert!(pop.is_woken());
        assert_eq!(tokio_test::assert_ready!(pop.poll()), Outbound::Close);
    }

    #[test]
    fn test_pending_push_fails_on_close() {
        let queue = OutboundQueue::new(2);
        queue.try_push("a".into()).unwrap();
        queue.try_push("b".into()).unwrap();

        let mut push = tokio_test::task::spawn(queue.push("c".into()));
        tokio_test::assert_pending!(push.poll());
        queue.close_and_drain();
        assert!(push.is_woken());
        assert!(matches!(
            tokio_test::assert_ready!(push.poll()),
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_blocked_producer_resumes_after_pop() {
        let queue = Arc::new(OutboundQueue::new(1));
        queue.push("a".into()).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push("b".into()).await })
        };

        assert_eq!(queue.pop().await, Outbound::Frame("a".into()));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.pop().await, Outbound::Frame("b".into()));
    }
}
