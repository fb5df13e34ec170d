use crate::constants::backend;
use crate::error::AppForgeError;
use crate::llm::traits::*;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            model: backend::DEFAULT_OPENAI_MODEL.to_string(),
            base_url: backend::OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(backend::REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: &'a [Message],
}

/// Backend conflicts that clear up once the in-flight run finishes.
pub(crate) fn is_conflict(status: StatusCode, body: &str) -> bool {
    let body = body.to_lowercase();
    status == StatusCode::CONFLICT
        || body.contains("another agent is active")
        || body.contains("already active")
}

/// Send a chat-completions request and turn the reply into an `LlmResponse`.
/// Shared by every OpenAI-wire-compatible client.
pub(crate) async fn send_chat(
    request: reqwest::RequestBuilder,
    body: &ChatCompletionRequest<'_>,
    provider: &str,
) -> Result<LlmResponse, AppForgeError> {
    let response = request.json(body).send().await?;

    let status = response.status();
    let response_text = response.text().await?;

    if !status.is_success() {
        return Err(AppForgeError::Generation {
            persona: String::new(),
            message: format!("{provider} API error ({status}): {response_text}"),
            retryable: is_conflict(status, &response_text),
        });
    }

    let api_response: ChatCompletionResponse = serde_json::from_str(&response_text)
        .map_err(|e| AppForgeError::generation("", format!("Failed to parse response: {e}")))?;

    let choice = api_response
        .choices
        .first()
        .ok_or_else(|| AppForgeError::generation("", "No response from API"))?;

    Ok(LlmResponse {
        message: Message::assistant(choice.message.content.clone().unwrap_or_default()),
        usage: api_response.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
    })
}

#[async_trait::async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse, AppForgeError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        tracing::debug!(url = %url, model = %self.model, messages = messages.len(), "openai request");

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let body = ChatCompletionRequest {
            model: Some(&self.model),
            messages,
        };

        send_chat(request, &body, "OpenAI").await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_detection() {
        assert!(is_conflict(StatusCode::CONFLICT, ""));
        assert!(is_conflict(
            StatusCode::BAD_REQUEST,
            "Unable to proceed while another agent is active."
        ));
        assert!(!is_conflict(StatusCode::UNAUTHORIZED, "invalid api key"));
        assert!(!is_conflict(StatusCode::TOO_MANY_REQUESTS, "quota exceeded"));
    }

    #[test]
    fn request_serializes_author_names() {
        let messages = vec![
            Message::system("be brief"),
            Message::assistant("plan").with_name("BusinessAnalyst"),
        ];
        let body = ChatCompletionRequest {
            model: None,
            messages: &messages,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][0].get("name").is_none());
        assert_eq!(json["messages"][1]["name"], "BusinessAnalyst");
    }

    #[test]
    fn response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],
                      "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 3);
    }
}
