use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// AI 助手子系统配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 模型服务配置 ---
    pub api_key: String,
    pub api_base_url: String,
    /// 模型目录缓存文件
    pub model_cache_path: String,
    /// 模型目录缓存有效期（小时）
    pub catalog_ttl_hours: u64,
    // --- 调度配置 ---
    /// 两次请求之间的最小间隔（毫秒），所有调用方共享
    pub min_request_interval_ms: u64,
    /// 限流/过载后的模型冷却时间（秒）
    pub model_cooldown_secs: u64,
    /// 单次生成调用超时（秒），0 表示不限制
    pub request_timeout_secs: u64,
    // --- 生成参数 ---
    pub max_output_tokens: u32,
    pub generation_seed: i64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model_cache_path: "data/gemini_models_cache.json".to_string(),
            catalog_ttl_hours: 24,
            min_request_interval_ms: 4000,
            model_cooldown_secs: 180,
            request_timeout_secs: 120,
            max_output_tokens: 8192,
            generation_seed: 42,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or(default.api_key),
            api_base_url: std::env::var("GEMINI_API_BASE_URL").unwrap_or(default.api_base_url),
            model_cache_path: std::env::var("MODEL_CACHE_PATH").unwrap_or(default.model_cache_path),
            catalog_ttl_hours: std::env::var("CATALOG_TTL_HOURS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.catalog_ttl_hours),
            min_request_interval_ms: std::env::var("MIN_REQUEST_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.min_request_interval_ms),
            model_cooldown_secs: std::env::var("MODEL_COOLDOWN_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.model_cooldown_secs),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            max_output_tokens: std::env::var("MAX_OUTPUT_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_output_tokens),
            generation_seed: std::env::var("GENERATION_SEED").ok().and_then(|v| v.parse().ok()).unwrap_or(default.generation_seed),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }

    /// 从 TOML 文件加载配置，缺省字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseFailed { source, .. } => ConfigError::ParseFailed {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::ParseFailed {
            path: String::new(),
            source,
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.model_cache_path)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_hours.saturating_mul(3600))
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn model_cooldown(&self) -> Duration {
        Duration::from_secs(self.model_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
