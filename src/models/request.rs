use serde_json::Value;

/// 一次生成请求
///
/// `ordered_models` 按优先级排列，调度器按顺序依次尝试。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub ordered_models: Vec<String>,
    /// 是否要求返回 JSON
    pub json_mode: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, ordered_models: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            ordered_models,
            json_mode: false,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn json_mode(mut self, value: bool) -> Self {
        self.json_mode = value;
        self
    }
}

/// 发送给模型服务的固定生成参数
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub seed: i64,
    pub max_output_tokens: u32,
    pub json_mode: bool,
}

impl GenerationParams {
    /// 确定性参数：temperature 0，top-1 采样，固定种子
    pub fn deterministic(seed: i64, max_output_tokens: u32, json_mode: bool) -> Self {
        Self {
            temperature: 0.0,
            top_k: 1,
            seed,
            max_output_tokens,
            json_mode,
        }
    }

    pub fn response_mime_type(&self) -> &'static str {
        if self.json_mode {
            "application/json"
        } else {
            "text/plain"
        }
    }
}

/// 模型输出
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    Text(String),
    /// `raw` 是从原始文本中截取出的 JSON 片段
    Json { raw: String, value: Value },
}

/// 调度成功的结果
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// 实际完成请求的模型
    pub model: String,
    pub output: GenerationOutput,
}

impl GenerationResult {
    pub fn text(&self) -> &str {
        match &self.output {
            GenerationOutput::Text(text) => text,
            GenerationOutput::Json { raw, .. } => raw,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.output {
            GenerationOutput::Json { value, .. } => Some(value),
            GenerationOutput::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self.output {
            GenerationOutput::Json { value, .. } => Some(value),
            GenerationOutput::Text(_) => None,
        }
    }
}
