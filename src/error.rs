use std::time::Duration;

use thiserror::Error;

/// 模型服务调用错误
///
/// 由 HTTP 客户端层直接给出分类，调度层据此决定是否冷却模型。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// 请求频率限制（HTTP 429）
    #[error("模型服务请求频率受限: {message}")]
    RateLimited { message: String },
    /// 服务过载（HTTP 503）
    #[error("模型服务过载: {message}")]
    Overloaded { message: String },
    /// 其他调用失败（网络、鉴权、参数、空响应等）
    #[error("模型服务调用失败 (status: {status:?}): {message}")]
    Other {
        status: Option<u16>,
        message: String,
    },
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Overloaded,
    Other,
}

impl ProviderError {
    /// 根据 HTTP 状态码分类
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => ProviderError::RateLimited { message },
            503 => ProviderError::Overloaded { message },
            _ => ProviderError::Other {
                status: Some(status),
                message,
            },
        }
    }

    /// 网络层错误（没有拿到 HTTP 响应）
    pub fn transport(message: impl Into<String>) -> Self {
        ProviderError::Other {
            status: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::RateLimited { .. } => FailureKind::RateLimited,
            ProviderError::Overloaded { .. } => FailureKind::Overloaded,
            ProviderError::Other { .. } => FailureKind::Other,
        }
    }

    /// 是否需要让该模型进入冷却
    pub fn triggers_cooldown(&self) -> bool {
        matches!(self.kind(), FailureKind::RateLimited | FailureKind::Overloaded)
    }
}

/// 结构化输出提取错误
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 没有找到成对闭合的 `{...}` / `[...]`
    #[error("返回内容中没有找到完整的 JSON 结构")]
    NoStructuredSpan,
    /// 找到了片段但解析失败
    #[error("JSON 解析失败: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 单次尝试失败的原因
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// 模型正常返回，但内容不合法
    #[error("输出校验失败: {0}")]
    Validation(#[from] ExtractError),
    #[error("调用超时 ({0:?})")]
    Timeout(Duration),
}

/// 调度错误
///
/// 调用方唯一能看到的错误类型。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// 所有候选模型都被跳过或失败
    #[error("所有候选模型均不可用 (已尝试: [{}]); 最后错误: {}", .attempted.join(", "), .last_error.as_deref().unwrap_or("无"))]
    Exhausted {
        attempted: Vec<String>,
        last_error: Option<String>,
    },
    /// 调度任务已退出，请求没有得到处理
    #[error("请求调度任务不可用")]
    WorkerUnavailable,
    /// 处理请求时发生 panic，只影响当前请求
    #[error("请求处理异常中止: {reason}")]
    Aborted { reason: String },
}

impl DispatchError {
    /// 实际发起过调用的模型（冷却跳过的不计入）
    pub fn attempted_models(&self) -> &[String] {
        match self {
            DispatchError::Exhausted { attempted, .. } => attempted,
            DispatchError::WorkerUnavailable | DispatchError::Aborted { .. } => &[],
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== Result 类型别名 ==========

/// 调度结果类型
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderError::from_status(429, "quota").kind(), FailureKind::RateLimited);
        assert_eq!(ProviderError::from_status(503, "busy").kind(), FailureKind::Overloaded);
        assert_eq!(ProviderError::from_status(500, "boom").kind(), FailureKind::Other);
        assert_eq!(ProviderError::from_status(400, "bad").kind(), FailureKind::Other);
        assert_eq!(ProviderError::transport("dns").kind(), FailureKind::Other);
    }

    #[test]
    fn test_only_rate_limit_and_overload_cool_down() {
        assert!(ProviderError::from_status(429, "").triggers_cooldown());
        assert!(ProviderError::from_status(503, "").triggers_cooldown());
        assert!(!ProviderError::from_status(404, "").triggers_cooldown());
        assert!(!ProviderError::transport("reset").triggers_cooldown());
    }

    #[test]
    fn test_exhausted_message_names_models() {
        let err = DispatchError::Exhausted {
            attempted: vec!["gemini-2.5-flash".to_string(), "gemini-2.0-flash".to_string()],
            last_error: Some("模型服务过载: busy".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("gemini-2.5-flash, gemini-2.0-flash"));
        assert!(msg.contains("busy"));
        assert_eq!(err.attempted_models().len(), 2);
    }

    #[test]
    fn test_exhausted_message_without_attempts() {
        let err = DispatchError::Exhausted {
            attempted: Vec::new(),
            last_error: None,
        };
        assert!(err.to_string().contains("[]"));
        assert!(err.attempted_models().is_empty());
    }
}
