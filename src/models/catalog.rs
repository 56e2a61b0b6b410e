use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 模型目录缓存记录
///
/// 每次成功刷新后整体覆盖，从不局部修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// 写入时间（epoch 毫秒）
    pub timestamp: i64,
    pub models: Vec<String>,
}

impl CatalogEntry {
    pub fn new(models: Vec<String>, timestamp: i64) -> Self {
        Self { timestamp, models }
    }

    /// 缓存的年龄；时间戳在未来时视为 0
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.timestamp).max(0) as u64)
    }

    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        self.age(now_ms) < ttl
    }
}

/// 模型服务列表接口返回的单个模型描述
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// 形如 `models/gemini-2.5-flash`
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelDescriptor {
    pub const GENERATE_CONTENT: &'static str = "generateContent";

    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == Self::GENERATE_CONTENT)
    }

    /// 去掉 `models/` 之类的路径前缀
    pub fn model_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}
