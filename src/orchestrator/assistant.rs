//! AI 助手入口
//!
//! 把模型目录服务和请求调度队列组装在一起，供上层请求处理代码直接使用。

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::clients::GeminiClient;
use crate::config::Config;
use crate::error::DispatchResult;
use crate::models::{GenerationRequest, GenerationResult};
use crate::orchestrator::dispatch_queue::{DispatchSettings, RequestDispatchQueue};
use crate::services::ModelCatalogService;
use crate::utils::logging::log_startup;

/// AI 助手
///
/// 应在进程内只创建一个并共享，限速和冷却才是全局的。
pub struct AiAssistant {
    catalog: ModelCatalogService,
    queue: RequestDispatchQueue,
}

impl AiAssistant {
    /// 按配置初始化：读取模型缓存、创建 Gemini 客户端和调度队列
    pub async fn initialize(config: &Config) -> Self {
        log_startup(config);

        let client = Arc::new(GeminiClient::new(config));
        let catalog = ModelCatalogService::from_config(config, client.clone()).await;
        let queue = RequestDispatchQueue::new(client, DispatchSettings::from_config(config));

        Self::with_components(catalog, queue)
    }

    pub fn with_components(catalog: ModelCatalogService, queue: RequestDispatchQueue) -> Self {
        Self { catalog, queue }
    }

    pub fn catalog(&self) -> &ModelCatalogService {
        &self.catalog
    }

    pub fn queue(&self) -> &RequestDispatchQueue {
        &self.queue
    }

    /// 按当前模型优先顺序提交请求
    pub async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        json_mode: bool,
    ) -> DispatchResult<GenerationResult> {
        let models = self.catalog.get_ordered_models(false).await;
        debug!("提交请求，候选模型: {:?}", models);

        let mut request = GenerationRequest::new(prompt, models).json_mode(json_mode);
        if let Some(instruction) = system_instruction {
            request = request.with_system_instruction(instruction);
        }

        self.queue.add(request).await
    }

    /// 文本请求
    pub async fn ask(&self, prompt: &str, system_instruction: Option<&str>) -> DispatchResult<String> {
        let result = self.generate(prompt, system_instruction, false).await?;
        Ok(result.text().to_string())
    }

    /// JSON 请求，返回解析后的结构
    pub async fn ask_json(&self, prompt: &str, system_instruction: Option<&str>) -> DispatchResult<Value> {
        let result = self.generate(prompt, system_instruction, true).await?;
        Ok(result.into_json().unwrap_or(Value::Null))
    }
}
