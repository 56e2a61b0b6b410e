//! 结构化输出提取
//!
//! 两步纯函数：先去掉 Markdown 代码块标记，再截取第一个成对闭合的
//! `{...}` / `[...]` 片段并解析。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ExtractError;

// JSON 字符串里不能有裸换行，所以行首/行尾的标记不会出现在字符串值内部
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*|```[A-Za-z0-9_-]*[ \t\r]*$")
        .unwrap_or_else(|e| panic!("代码块正则无效: {}", e))
});

/// 去掉位于行首或行尾的 ``` 与 ```json 之类的标记
pub fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").into_owned()
}

/// 定位第一个成对闭合的 JSON 片段
///
/// 从第一个 `{` 或 `[` 开始扫描，字符串内的括号和转义字符不参与配对。
/// 括号类型不匹配或直到结尾都没有闭合时返回 `None`。
pub fn find_balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut expected: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => expected.push('}'),
            '[' => expected.push(']'),
            '}' | ']' => {
                if expected.pop() != Some(ch) {
                    return None;
                }
                if expected.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// 提取并解析结构化输出，返回 (原始片段, 解析结果)
pub fn extract_json(raw: &str) -> Result<(String, Value), ExtractError> {
    let stripped = strip_code_fences(raw);
    let span = find_balanced_span(&stripped).ok_or(ExtractError::NoStructuredSpan)?;
    let value = serde_json::from_str(span)?;
    Ok((span.to_string(), value))
}
