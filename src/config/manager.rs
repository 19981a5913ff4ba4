//! 配置管理器 - 负责处理环境变量对通道配置的覆盖
//!
//! 支持的环境变量：
//! - `FLARE_CHANNEL_QUEUE_CAPACITY`：出站队列容量
//! - `FLARE_CHANNEL_MAX_PENDING_ACKS`：ACK 待回复上限

use std::env;
use std::str::FromStr;

use tracing::warn;

use super::ChannelConfig;

/// 出站队列容量环境变量
pub const ENV_QUEUE_CAPACITY: &str = "FLARE_CHANNEL_QUEUE_CAPACITY";
/// ACK 待回复上限环境变量
pub const ENV_MAX_PENDING_ACKS: &str = "FLARE_CHANNEL_MAX_PENDING_ACKS";

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 应用环境变量覆盖
    ///
    /// 环境变量优先级高于配置文件；无法解析的值会被忽略并记录警告。
    pub fn apply_env_overrides(config: &mut ChannelConfig) {
        Self::apply_overrides_from(config, |key| env::var(key).ok());
    }

    /// 从任意键值来源应用覆盖（便于测试，不触碰进程环境）
    pub fn apply_overrides_from<F>(config: &mut ChannelConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = Self::parse_var::<usize, _>(&lookup, ENV_QUEUE_CAPACITY) {
            config.queue_capacity = value;
        }
        if let Some(value) = Self::parse_var::<usize, _>(&lookup, ENV_MAX_PENDING_ACKS) {
            config.max_pending_acks = value;
        }
    }

    fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
    where
        T: FromStr,
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(key)?;
        match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key = %key, value = %raw, "ignoring unparsable config override");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_overrides_applied() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENV_QUEUE_CAPACITY, "32"), (ENV_MAX_PENDING_ACKS, "8")]);
        let mut cfg = ChannelConfig::default();

        ConfigManager::apply_overrides_from(&mut cfg, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.queue_capacity, 32);
        assert_eq!(cfg.max_pending_acks, 8);
    }

    #[test]
    fn test_invalid_override_ignored() {
        let mut cfg = ChannelConfig::default();
        ConfigManager::apply_overrides_from(&mut cfg, |key| {
            (key == ENV_QUEUE_CAPACITY).then(|| "lots".to_string())
        });
        assert_eq!(cfg.queue_capacity, super::super::DEFAULT_QUEUE_CAPACITY);
    }
}
