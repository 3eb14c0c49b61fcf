//! OpenAI-compatible chat-completions judge client.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::dataset::{Message, Sample};
use crate::error::{FtlintError, Result};

use super::{JudgeProvider, JudgeVerdict};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const PROVIDER_NAME: &str = "chat";

/// Instructions sent ahead of every judged sample.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"
You review training examples for fine-tuning a chat assistant.

Rate the conversation below on a 1-5 scale:
5 = accurate, helpful, well-formed
4 = good with minor flaws
3 = usable but mediocre
2 = significant errors, unhelpful or off-topic
1 = wrong, harmful or broken

Reply with JSON only: {"score": <1-5>, "reasons": ["short reason", ...]}
"#;

/// Judge backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatJudge {
    api_base: String,
    api_key: Option<String>,
    http_client: Client,
}

impl ChatJudge {
    /// Creates a client for `api_base` with a per-request `timeout`.
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FtlintError::provider(PROVIDER_NAME, e))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    /// Creates a client from `FTLINT_JUDGE_API_BASE` (default OpenAI) and
    /// `FTLINT_JUDGE_API_KEY`, falling back to `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_base =
            env::var("FTLINT_JUDGE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = env::var("FTLINT_JUDGE_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok();
        Self::new(api_base, api_key, Duration::from_secs(120))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Renders a sample as the user turn of a judge request.
fn render_sample(sample: &Sample) -> String {
    let mut out = String::from("Conversation to rate:\n");
    for message in &sample.messages {
        out.push_str(&format!("\n[{}]\n{}\n", message.role, message.content));
    }
    out
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl JudgeProvider for ChatJudge {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn judge(&self, sample: &Sample, model: &str) -> Result<JudgeVerdict> {
        let api_request = ApiRequest {
            model,
            messages: vec![
                Message::system(JUDGE_SYSTEM_PROMPT.trim()),
                Message::user(render_sample(sample)),
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(&api_request)
            .send()
            .await
            .map_err(|e| FtlintError::provider(PROVIDER_NAME, format!("request failed: {e}")))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);
            return Err(FtlintError::provider(
                PROVIDER_NAME,
                format!("HTTP {}: {}", status.as_u16(), message),
            ));
        }

        let api_response: ApiResponse = http_response.json().await.map_err(|e| {
            FtlintError::provider(PROVIDER_NAME, format!("Failed to parse API response: {e}"))
        })?;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FtlintError::provider(PROVIDER_NAME, "empty completion"))?;

        JudgeVerdict::parse(PROVIDER_NAME, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetFormat;

    #[test]
    fn test_new_trims_trailing_slash() {
        let judge = ChatJudge::new("http://localhost:4000/v1/", None, Duration::from_secs(5))
            .expect("client");
        assert_eq!(judge.api_base(), "http://localhost:4000/v1");
        assert!(!judge.has_api_key());
    }

    #[test]
    fn test_render_sample_lists_roles_in_order() {
        let sample = Sample::new(
            vec![Message::user("What is 2+2?"), Message::assistant("4")],
            DatasetFormat::ChatMl,
            "{}",
            0,
        );
        let rendered = render_sample(&sample);
        let user_at = rendered.find("[user]").expect("user");
        let assistant_at = rendered.find("[assistant]").expect("assistant");
        assert!(user_at < assistant_at);
        assert!(rendered.contains("What is 2+2?"));
    }
}
