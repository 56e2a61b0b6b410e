//! 模型服务抽象
//!
//! 目录服务只依赖 [`ModelLister`]，调度器只依赖 [`ContentGenerator`]，
//! 测试中用内存实现替换真实的 HTTP 客户端。

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{GenerationParams, ModelDescriptor};

/// 列出模型服务当前提供的模型
#[async_trait]
pub trait ModelLister: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError>;
}

/// 调用指定模型生成文本
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;
}
