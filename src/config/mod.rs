//! 推送通道配置模块
//!
//! 该模块提供了通道运行所需的配置管理功能，包括：
//! - 配置文件加载和解析（TOML）
//! - 环境变量覆盖
//! - 通道参数（队列容量、ACK 上限、心跳参数）与日志配置定义

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::warn;

mod manager;
pub use manager::ConfigManager;

/// 默认出站队列容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// 通道配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 出站队列容量（达到容量即视为致命溢出）
    pub queue_capacity: usize,
    /// 同时等待回复的 ACK 调用上限
    pub max_pending_acks: usize,
    /// 默认 ACK 等待超时（毫秒）
    pub default_ack_timeout_ms: u64,
    /// 心跳间隔（毫秒），用于不协商心跳参数的传输
    pub ping_interval_ms: u64,
    /// 心跳超时（毫秒）
    pub ping_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pending_acks: 1024,
            default_ack_timeout_ms: 5_000,
            ping_interval_ms: 25_000,
            ping_timeout_ms: 60_000,
        }
    }
}

impl ChannelConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity < 2 {
            return Err(anyhow!(
                "queue_capacity must be at least 2, got {}",
                self.queue_capacity
            ));
        }
        if self.max_pending_acks == 0 {
            return Err(anyhow!("max_pending_acks must be greater than 0"));
        }
        if self.ping_interval_ms == 0 {
            return Err(anyhow!("ping_interval_ms must be greater than 0"));
        }
        Ok(())
    }

    /// 默认 ACK 超时
    pub fn default_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ack_timeout_ms)
    }

    /// 心跳间隔
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// 心跳超时
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    pub level: String,
    /// 是否输出 target
    pub with_target: bool,
    /// 是否输出线程 ID
    pub with_thread_ids: bool,
    /// 是否输出文件名
    pub with_file: bool,
    /// 是否输出行号
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// 推送通道根配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PushChannelConfig {
    /// 通道配置
    pub channel: ChannelConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 加载配置
///
/// 依次尝试给定路径（未指定时尝试 `config/push-channel.toml` 与 `push-channel.toml`），
/// 全部失败时回退到默认配置；随后应用环境变量覆盖。
pub fn load_config(path: Option<&str>) -> PushChannelConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![
            PathBuf::from("config/push-channel.toml"),
            PathBuf::from("push-channel.toml"),
        ],
    };

    let mut cfg = load_with_fallback(&candidates);
    ConfigManager::apply_env_overrides(&mut cfg.channel);
    cfg
}

/// 加载并校验配置
pub fn load_config_with_validation(path: Option<&str>) -> Result<PushChannelConfig> {
    let cfg = load_config(path);
    cfg.channel
        .validate()
        .context("invalid channel configuration")?;
    Ok(cfg)
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> PushChannelConfig {
    for path in candidates {
        match load_config_from_file(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err:#}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    PushChannelConfig::default()
}

/// 从文件加载配置
pub fn load_config_from_file(path: &Path) -> Result<PushChannelConfig> {
    let content = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => anyhow!("configuration path {} does not exist", path.display()),
        _ => anyhow!(err).context(format!("unable to read config file: {}", path.display())),
    })?;
    parse_config(&content).with_context(|| format!("invalid config format: {}", path.display()))
}

/// 从 TOML 文本解析配置
pub fn parse_config(content: &str) -> Result<PushChannelConfig> {
    let cfg: PushChannelConfig = toml::from_str(content)?;
    Ok(cfg)
}
