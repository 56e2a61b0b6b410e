/// Gemini API 客户端
///
/// 封装模型列表和内容生成两个 REST 接口，HTTP 状态码在这里转换为
/// 带类别的 [`ProviderError`]。
use std::future::Future;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clients::provider::{ContentGenerator, ModelLister};
use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{GenerationParams, ModelDescriptor};

const LIST_PAGE_SIZE: u32 = 1000;

/// Gemini 客户端
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    api_base_url: String,
}

impl GeminiClient {
    /// 创建新的 Gemini 客户端
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.api_key, &config.api_base_url)
    }

    pub fn with_base_url(api_key: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.api_base_url)
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base_url, model)
    }

    async fn fetch_model_page(&self, page_token: Option<&str>) -> Result<ListModelsResponse, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            ("pageSize", LIST_PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(self.models_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Other {
            status: Some(status.as_u16()),
            message: format!("无法解析模型列表: {}", e),
        })
    }
}

#[async_trait]
impl ModelLister for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let models = collect_pages(|token| async move { self.fetch_model_page(token.as_deref()).await }).await?;
        debug!("模型列表共 {} 项", models.len());
        Ok(models)
    }
}

/// 按 `nextPageToken` 依次拉取，直到没有下一页
async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<ModelDescriptor>, ProviderError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListModelsResponse, ProviderError>>,
{
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = fetch_page(page_token.take()).await?;
        models.extend(page.models);
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(models)
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        debug!("调用 Gemini API，模型: {}", model);
        debug!("用户消息长度: {} 字符", prompt.len());

        let body = build_generate_body(system_instruction, prompt, params);

        let response = self
            .http
            .post(self.generate_url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Gemini API 请求失败: {}", e);
                ProviderError::transport(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Other {
                status: Some(status.as_u16()),
                message: format!("无法解析生成结果: {}", e),
            })?;

        extract_text(parsed)
    }
}

/// 把失败响应转换为带类别的错误
///
/// HTTP 状态码优先；状态码不是 429/503 时再看错误体里的 `status` 字段。
pub fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let (message, provider_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.trim().to_string(), String::new()),
    };

    match (status.as_u16(), provider_status.as_str()) {
        (429 | 503, _) => ProviderError::from_status(status.as_u16(), message),
        (_, "RESOURCE_EXHAUSTED") => ProviderError::RateLimited { message },
        (_, "UNAVAILABLE") => ProviderError::Overloaded { message },
        (code, _) => ProviderError::from_status(code, message),
    }
}

// ========== 请求/响应结构 ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfigBody,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigBody {
    temperature: f32,
    top_k: u32,
    seed: i64,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

fn build_generate_body<'a>(
    system_instruction: Option<&'a str>,
    prompt: &'a str,
    params: &GenerationParams,
) -> GenerateContentBody<'a> {
    GenerateContentBody {
        system_instruction: system_instruction.map(|text| Content {
            role: None,
            parts: vec![TextPart { text }],
        }),
        contents: vec![Content {
            role: Some("user"),
            parts: vec![TextPart { text: prompt }],
        }],
        generation_config: GenerationConfigBody {
            temperature: params.temperature,
            top_k: params.top_k,
            seed: params.seed,
            max_output_tokens: params.max_output_tokens,
            response_mime_type: params.response_mime_type(),
        },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// 拼接第一个候选结果的全部文本
fn extract_text(response: GenerateContentResponse) -> Result<String, ProviderError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        ProviderError::Other {
            status: None,
            message: match &block_reason {
                Some(reason) => format!("模型返回结果为空 (blockReason: {})", reason),
                None => "模型返回结果为空".to_string(),
            },
        }
    })?;

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::Other {
            status: None,
            message: format!(
                "模型返回内容为空 (finishReason: {})",
                candidate.finish_reason.as_deref().unwrap_or("未知")
            ),
        });
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_classify_failure_uses_status() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(
            err,
            ProviderError::RateLimited {
                message: "Resource has been exhausted".to_string()
            }
        );

        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, "The model is overloaded.");
        assert_eq!(err.kind(), FailureKind::Overloaded);

        let err = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert_eq!(
            err,
            ProviderError::RateLimited {
                message: "quota exceeded".to_string()
            }
        );

        let err = classify_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"code":500,"message":"backend busy","status":"UNAVAILABLE"}}"#,
        );
        assert_eq!(err.kind(), FailureKind::Overloaded);

        let err = classify_failure(StatusCode::NOT_FOUND, r#"{"error":{"message":"not found"}}"#);
        assert_eq!(
            err,
            ProviderError::Other {
                status: Some(404),
                message: "not found".to_string()
            }
        );
    }

    #[test]
    fn test_generate_body_shape() {
        let params = GenerationParams::deterministic(42, 2048, true);
        let body = build_generate_body(Some("你是阅卷助手"), "评分", &params);
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "systemInstruction": {"parts": [{"text": "你是阅卷助手"}]},
                "contents": [{"role": "user", "parts": [{"text": "评分"}]}],
                "generationConfig": {
                    "temperature": 0.0,
                    "topK": 1,
                    "seed": 42,
                    "maxOutputTokens": 2048,
                    "responseMimeType": "application/json"
                }
            })
        );
    }

    #[test]
    fn test_generate_body_without_system_instruction() {
        let params = GenerationParams::deterministic(7, 100, false);
        let value = serde_json::to_value(build_generate_body(None, "hi", &params)).unwrap();
        assert!(value.get("systemInstruction").is_none());
        assert_eq!(value["generationConfig"]["responseMimeType"], "text/plain");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"第一段"},{"text":"第二段"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "第一段第二段");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Other);
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_empty_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_list_response_parse() {
        let page: ListModelsResponse = serde_json::from_str(
            r#"{"models":[{"name":"models/gemini-2.5-flash","supportedGenerationMethods":["generateContent"]}],"nextPageToken":"abc"}"#,
        )
        .unwrap();
        assert_eq!(page.models.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_collect_pages_follows_next_page_token() {
        let mut pages = vec![
            r#"{"models":[{"name":"models/gemini-2.5-flash","supportedGenerationMethods":["generateContent"]}],"nextPageToken":"p2"}"#,
            r#"{"models":[{"name":"models/gemini-2.5-pro","supportedGenerationMethods":["generateContent"]}],"nextPageToken":""}"#,
        ]
        .into_iter();
        let mut tokens: Vec<Option<String>> = Vec::new();

        let models = collect_pages(|token| {
            tokens.push(token);
            let page = pages.next().map(|body| serde_json::from_str::<ListModelsResponse>(body).unwrap());
            async move { page.ok_or_else(|| ProviderError::transport("no more pages")) }
        })
        .await
        .unwrap();

        let names: Vec<&str> = models.iter().map(|m| m.model_id()).collect();
        assert_eq!(names, vec!["gemini-2.5-flash", "gemini-2.5-pro"]);
        assert_eq!(tokens, vec![None, Some("p2".to_string())]);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_error() {
        let mut calls = 0;
        let result = collect_pages(|_| {
            calls += 1;
            async { Err::<ListModelsResponse, _>(ProviderError::from_status(429, "slow down")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::RateLimited);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let client = GeminiClient::with_base_url("k", "https://example.com/v1beta/");
        assert_eq!(client.models_url(), "https://example.com/v1beta/models");
        assert_eq!(
            client.generate_url("gemini-2.5-flash"),
            "https://example.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
