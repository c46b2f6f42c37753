use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::{error_chain_text, first_non_empty_env};

pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_LANGUAGE: &str = "한국어";
/// Enough room for a comma-separated list of several dishes.
pub const DEFAULT_MAX_TOKENS: u32 = 50;

const SYSTEM_INSTRUCTION: &str =
    "너는 이미지를 보고 음식 이름만 정확히 답변하는 전문가야. 절대 다른 설명이나 인사는 하지 마.";

fn user_instruction(language: &str) -> String {
    format!(
        "이 사진에 있는 모든 음식의 이름을 {language}로 알려줘. 음식 이름만 쉼표(,)로 구분해서 답해."
    )
}

/// Why a classification produced no usable answer. Never confused with a
/// food name: callers get either text or one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("vision request failed: {0}")]
    Transport(String),
    #[error("vision API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("vision response could not be decoded: {0}")]
    Decode(String),
    #[error("vision response contained no text")]
    EmptyResponse,
}

pub trait VisionClassifier {
    fn name(&self) -> &str;
    /// One attempt at naming the foods in a JPEG. Returns the model's raw text.
    fn classify(&self, image: &[u8]) -> Result<String, ClassifyError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub model: String,
    pub max_tokens: u32,
    pub language: String,
    pub api_base: String,
    /// `None` waits for the model as long as it takes.
    pub timeout: Option<Duration>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_VISION_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            language: DEFAULT_LANGUAGE.to_string(),
            api_base: openai_api_base(),
            timeout: None,
        }
    }
}

pub fn openai_api_key() -> Option<String> {
    first_non_empty_env(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"])
}

/// `OPENAI_API_BASE`, then `OPENAI_BASE_URL`, then the public endpoint.
pub fn openai_api_base() -> String {
    api_base_from(|key| first_non_empty_env(&[key]))
}

fn api_base_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["OPENAI_API_BASE", "OPENAI_BASE_URL"]
        .into_iter()
        .find_map(lookup)
        .map(|raw| normalize_api_base(&raw))
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

/// Trims trailing slashes and adds `/v1` to a bare host.
pub fn normalize_api_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base
}

pub fn image_data_url(image: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(image))
}

/// Chat-completions client for a vision-capable OpenAI model.
pub struct OpenAiVisionClient {
    config: ClassifierConfig,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiVisionClient {
    pub fn new(config: ClassifierConfig, api_key: Option<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build vision HTTP client")?;
        Ok(Self::with_http(config, api_key, http))
    }

    pub fn from_env(config: ClassifierConfig) -> Result<Self> {
        Self::new(config, openai_api_key())
    }

    pub fn with_http(config: ClassifierConfig, api_key: Option<String>, http: HttpClient) -> Self {
        let api_key = api_key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self {
            config,
            api_key,
            http,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim().trim_end_matches('/')
        )
    }

    pub fn build_payload(&self, image: &[u8]) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": SYSTEM_INSTRUCTION,
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user_instruction(&self.config.language) },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": image_data_url(image),
                                "detail": "low",
                            },
                        },
                    ],
                },
            ],
            "max_tokens": self.config.max_tokens,
        })
    }
}

impl VisionClassifier for OpenAiVisionClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn classify(&self, image: &[u8]) -> Result<String, ClassifyError> {
        let api_key = self.api_key.as_deref().ok_or(ClassifyError::MissingApiKey)?;
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&self.build_payload(image))
            .send()
            .map_err(|err| ClassifyError::Transport(error_chain_text(&err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let parsed: Value = response
            .json()
            .map_err(|err| ClassifyError::Decode(error_chain_text(&err)))?;
        let text = extract_chat_completion_text(&parsed);
        if text.is_empty() {
            return Err(ClassifyError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Text of the first choice. Accepts both a plain string `content` and the
/// list-of-parts form.
fn extract_chat_completion_text(response: &Value) -> String {
    let Some(content) = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
    else {
        return String::new();
    };

    if let Some(text) = content.as_str() {
        return text.trim().to_string();
    }

    content
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter(|part| {
                    matches!(
                        part.get("type").and_then(Value::as_str),
                        Some("text" | "output_text")
                    )
                })
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .collect::<Vec<&str>>()
                .join(", ")
        })
        .unwrap_or_default()
}
