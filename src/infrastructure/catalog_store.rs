//! 模型目录缓存文件 - 基础设施层
//!
//! 只负责读写一条 `{timestamp, models}` 记录，不判断是否过期

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, warn};

use crate::models::CatalogEntry;

/// 缓存文件存储
///
/// 职责：
/// - 启动时读取缓存
/// - 刷新成功后整体覆盖写入
/// - 目录不存在时自动创建
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取缓存记录
    ///
    /// 文件不存在返回 `None`；文件损坏同样视为没有缓存。
    pub async fn load(&self) -> Option<CatalogEntry> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("模型缓存文件不存在: {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("读取模型缓存失败 ({}): {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<CatalogEntry>(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("模型缓存文件格式错误 ({}): {}", self.path.display(), e);
                None
            }
        }
    }

    /// 写入缓存记录（先写临时文件再重命名）
    pub async fn save(&self, entry: &CatalogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建缓存目录: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(entry)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("无法写入缓存文件: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("无法替换缓存文件: {}", self.path.display()))?;

        debug!("模型缓存已写入: {} 个模型", entry.models.len());
        Ok(())
    }
}
