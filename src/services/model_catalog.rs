//! 模型目录服务 - 业务能力层
//!
//! 只负责"现在有哪些模型可用、按什么顺序用"，不关心请求调度
//!
//! 降级顺序：有效缓存 → 远程刷新 → 过期缓存 → 内置优先列表。
//! 对外的两个方法都不会返回错误。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clients::ModelLister;
use crate::config::Config;
use crate::infrastructure::CatalogStore;
use crate::models::CatalogEntry;

/// 经过验证的模型优先顺序，同时作为最后的默认目录
pub const PREFERRED_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

/// 专用或受限的模型变体，不参与兜底选择
const RESTRICTED_MARKERS: &[&str] = &["robotics", "nano", "tts"];

const FALLBACK_LIMIT: usize = 5;

/// 模型目录服务
///
/// 职责：
/// - 缓存有效期内直接返回缓存，不发网络请求
/// - 刷新时只保留支持 generateContent 的模型
/// - 刷新失败时降级到旧缓存或内置列表
/// - 按优先列表给模型排序
pub struct ModelCatalogService {
    lister: Arc<dyn ModelLister>,
    store: CatalogStore,
    ttl: Duration,
    cache: RwLock<Option<CatalogEntry>>,
    refresh_lock: Mutex<()>,
}

impl ModelCatalogService {
    /// 创建服务并读取缓存文件
    pub async fn initialize(lister: Arc<dyn ModelLister>, store: CatalogStore, ttl: Duration) -> Self {
        let cache = store.load().await.filter(|entry| !entry.models.is_empty());
        match &cache {
            Some(entry) => info!("📦 已加载模型缓存: {} 个模型", entry.models.len()),
            None => debug!("没有可用的模型缓存: {}", store.path().display()),
        }

        Self {
            lister,
            store,
            ttl,
            cache: RwLock::new(cache),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn from_config(config: &Config, lister: Arc<dyn ModelLister>) -> Self {
        Self::initialize(lister, CatalogStore::new(config.cache_path()), config.catalog_ttl()).await
    }

    /// 当前内存中的缓存记录
    pub async fn cached_entry(&self) -> Option<CatalogEntry> {
        self.cache.read().await.clone()
    }

    /// 获取可用模型列表
    ///
    /// # 参数
    /// - `force_refresh`: 忽略有效缓存，强制请求远程目录
    ///
    /// # 返回
    /// 模型 ID 列表（已去掉 `models/` 前缀）
    pub async fn get_available_models(&self, force_refresh: bool) -> Vec<String> {
        let requested_at = now_ms();

        if !force_refresh {
            if let Some(models) = self.fresh_models(requested_at).await {
                debug!("使用模型缓存: {} 个模型", models.len());
                return models;
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // 等锁期间已有其他调用方完成刷新
        if let Some(entry) = self.cache.read().await.as_ref() {
            if entry.timestamp >= requested_at {
                debug!("复用刚完成的模型目录刷新");
                return entry.models.clone();
            }
        }

        match self.refresh_from_remote().await {
            Ok(entry) => {
                info!("✓ 模型目录已刷新: {} 个可用模型", entry.models.len());
                let models = entry.models.clone();
                *self.cache.write().await = Some(entry);
                models
            }
            Err(e) => {
                warn!("⚠️ 刷新模型目录失败，使用降级列表: {:#}", e);
                self.fallback_models().await
            }
        }
    }

    /// 获取按优先顺序排列的候选模型
    pub async fn get_ordered_models(&self, force_refresh: bool) -> Vec<String> {
        let available = self.get_available_models(force_refresh).await;
        let ordered = rank_models(&available);
        debug!("候选模型顺序: {:?}", ordered);
        ordered
    }

    async fn fresh_models(&self, now: i64) -> Option<Vec<String>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.models.clone())
    }

    async fn refresh_from_remote(&self) -> Result<CatalogEntry> {
        let descriptors = self
            .lister
            .list_models()
            .await
            .context("获取模型列表失败")?;

        let mut models: Vec<String> = Vec::new();
        for descriptor in descriptors.iter().filter(|d| d.supports_generation()) {
            let id = descriptor.model_id();
            if !models.iter().any(|m| m == id) {
                models.push(id.to_string());
            }
        }

        if models.is_empty() {
            anyhow::bail!("模型列表中没有支持 generateContent 的模型");
        }

        let entry = CatalogEntry::new(models, now_ms());
        self.store
            .save(&entry)
            .await
            .context("保存模型缓存失败")?;
        Ok(entry)
    }

    /// 旧缓存（不论是否过期），否则内置列表
    async fn fallback_models(&self) -> Vec<String> {
        match self.cache.read().await.as_ref() {
            Some(entry) => entry.models.clone(),
            None => default_models(),
        }
    }
}

/// 内置默认目录
pub fn default_models() -> Vec<String> {
    PREFERRED_MODELS.iter().map(|m| m.to_string()).collect()
}

/// 按优先列表排序
///
/// 优先列表与可用模型没有交集时，从可用模型里挑选 flash / pro 系列，
/// 排除受限变体，最多 5 个。
pub fn rank_models(available: &[String]) -> Vec<String> {
    let ranked: Vec<String> = PREFERRED_MODELS
        .iter()
        .filter(|preferred| available.iter().any(|id| id == *preferred))
        .map(|preferred| preferred.to_string())
        .collect();

    if !ranked.is_empty() {
        return ranked;
    }

    available
        .iter()
        .filter(|id| id.contains("flash") || id.contains("pro"))
        .filter(|id| !RESTRICTED_MARKERS.iter().any(|marker| id.contains(marker)))
        .take(FALLBACK_LIMIT)
        .cloned()
        .collect()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
