//! 单个请求的故障转移
//!
//! 按顺序尝试候选模型：
//! - 冷却中的模型直接跳过，不发请求
//! - 限流 / 过载：设置冷却，换下一个
//! - 其他失败、超时、输出不合法：记录错误，不冷却，换下一个
//! - 成功：清除该模型的冷却并返回

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clients::ContentGenerator;
use crate::error::{AttemptError, DispatchError, DispatchResult};
use crate::models::{GenerationOutput, GenerationParams, GenerationRequest, GenerationResult};
use crate::orchestrator::cooldown::CooldownRegistry;
use crate::orchestrator::dispatch_queue::DispatchSettings;
use crate::services::json_extract::extract_json;

pub async fn run_failover(
    generator: &dyn ContentGenerator,
    cooldowns: &CooldownRegistry,
    settings: &DispatchSettings,
    request: &GenerationRequest,
) -> DispatchResult<GenerationResult> {
    let params = GenerationParams::deterministic(
        settings.seed,
        settings.max_output_tokens,
        request.json_mode,
    );
    let mut attempted: Vec<String> = Vec::new();
    let mut last_error: Option<String> = None;

    for model in &request.ordered_models {
        if let Some(left) = cooldowns.remaining(model, Instant::now()) {
            debug!("跳过冷却中的模型 {} (剩余 {}s)", model, left.as_secs());
            continue;
        }

        attempted.push(model.clone());
        debug!("尝试模型: {}", model);

        match attempt(generator, model, request, &params, settings).await {
            Ok(output) => {
                if cooldowns.clear(model) {
                    debug!("模型 {} 已恢复，清除冷却", model);
                }
                info!("✓ 模型 {} 调用成功", model);
                return Ok(GenerationResult {
                    model: model.clone(),
                    output,
                });
            }
            Err(AttemptError::Provider(e)) if e.triggers_cooldown() => {
                cooldowns.start(model, Instant::now(), settings.cooldown);
                warn!(
                    "⚠️ 模型 {} 不可用，冷却 {}s: {}",
                    model,
                    settings.cooldown.as_secs(),
                    e
                );
                last_error = Some(e.to_string());
            }
            Err(e) => {
                warn!("⚠️ 模型 {} 调用失败: {}", model, e);
                last_error = Some(e.to_string());
            }
        }
    }

    warn!("❌ 候选模型全部失败，已尝试: {:?}", attempted);
    Err(DispatchError::Exhausted {
        attempted,
        last_error,
    })
}

/// 对单个模型发起一次调用并校验输出
async fn attempt(
    generator: &dyn ContentGenerator,
    model: &str,
    request: &GenerationRequest,
    params: &GenerationParams,
    settings: &DispatchSettings,
) -> Result<GenerationOutput, AttemptError> {
    let call = generator.generate(
        model,
        request.system_instruction.as_deref(),
        &request.prompt,
        params,
    );

    let raw = match settings.attempt_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| AttemptError::Timeout(limit))??,
        None => call.await?,
    };

    if request.json_mode {
        let (span, value) = extract_json(&raw)?;
        Ok(GenerationOutput::Json { raw: span, value })
    } else {
        Ok(GenerationOutput::Text(raw.trim().to_string()))
    }
}
