//! # Assessment AI
//!
//! 阅卷工作流中的 AI 助手子系统：所有对生成式模型服务的调用都经过这里
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有模型目录缓存文件
//! - `CatalogStore` - 读写 `{timestamp, models}` 记录
//!
//! ### ② 客户端层（Clients）
//! - `clients/` - 模型服务 HTTP 接口
//! - `GeminiClient` - 模型列表 / 内容生成，HTTP 状态码转换为带类别的错误
//!
//! ### ③ 业务能力层（Services）
//! - `ModelCatalogService` - 可用模型目录（缓存、降级、排序）
//! - `json_extract` - 结构化输出提取
//!
//! ### ④ 编排层（Orchestration）
//! - `RequestDispatchQueue` - FIFO 队列、全局限速、故障转移
//! - `CooldownRegistry` - 模型冷却表
//! - `AiAssistant` - 对外入口
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use clients::{ContentGenerator, GeminiClient, ModelLister};
pub use config::Config;
pub use error::{DispatchError, DispatchResult, ProviderError};
pub use infrastructure::CatalogStore;
pub use models::{CatalogEntry, GenerationOutput, GenerationRequest, GenerationResult};
pub use orchestrator::{AiAssistant, CooldownRegistry, DispatchHandle, DispatchSettings, RequestDispatchQueue};
pub use services::ModelCatalogService;
