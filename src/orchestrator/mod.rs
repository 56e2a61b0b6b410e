//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `dispatch_queue` - 请求调度队列
//! - FIFO 队列 + 唯一调度任务
//! - 全局最小间隔限速
//!
//! ### `failover` - 故障转移
//! - 按顺序尝试候选模型，校验输出
//!
//! ### `cooldown` - 模型冷却表
//! - 限流/过载的模型暂时不参与调度
//!
//! ### `assistant` - 对外入口
//! - 组装目录服务和调度队列
//!
//! ## 层次关系
//!
//! ```text
//! assistant (AiAssistant)
//!     ↓
//! services::ModelCatalogService ──→ 候选模型顺序
//!     ↓
//! dispatch_queue (限速、排队)
//!     ↓
//! failover (冷却表、输出校验)
//!     ↓
//! clients (ContentGenerator)
//! ```

pub mod assistant;
pub mod cooldown;
pub mod dispatch_queue;
pub mod failover;

pub use assistant::AiAssistant;
pub use cooldown::CooldownRegistry;
pub use dispatch_queue::{DispatchHandle, DispatchSettings, RequestDispatchQueue};
