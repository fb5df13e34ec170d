use crate::constants::backend;
use crate::error::AppForgeError;
use crate::llm::openai::{http_client, send_chat, ChatCompletionRequest};
use crate::llm::traits::*;

/// Azure OpenAI chat completions, addressed by deployment rather than model.
pub struct AzureOpenAIClient {
    client: reqwest::Client,
    endpoint: String,
    deployment: String,
    api_key: String,
    api_version: String,
}

impl AzureOpenAIClient {
    pub fn new(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: http_client(),
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_key: api_key.into(),
            api_version: backend::AZURE_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

#[async_trait::async_trait]
impl LlmClient for AzureOpenAIClient {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse, AppForgeError> {
        let url = self.completions_url();
        tracing::debug!(url = %url, messages = messages.len(), "azure openai request");

        let request = self.client.post(&url).header("api-key", &self.api_key);
        let body = ChatCompletionRequest {
            model: None,
            messages,
        };

        send_chat(request, &body, "Azure OpenAI").await
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_uses_deployment_and_version() {
        let client = AzureOpenAIClient::new("https://example.openai.azure.com/", "gpt4o", "k")
            .with_api_version("2024-02-01");
        assert_eq!(
            client.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-02-01"
        );
    }
}
