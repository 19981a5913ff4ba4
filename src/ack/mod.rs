//! ACK 关联模块
//!
//! 为每个通道维护「调用 id -> 等待回复的一次性槽位」映射，
//! 用于把异步到达的回复消息匹配回发起调用的一方。

pub mod correlator;

pub use correlator::{AckCorrelator, AckReceiver};
