use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{ApprovalMatch, Persona, RetryPolicy, SchedulerOptions};
use crate::constants::{backend, publish, scheduling};
use crate::error::AppForgeError;
use crate::llm::{AzureOpenAIClient, LlmClient, OpenAIClient};
use crate::publish::Publisher;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
    #[serde(default)]
    pub publish: PublishSettings,
    /// Instruction overrides keyed by persona name.
    #[serde(default)]
    pub personas: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub deployment_env: String,
    pub endpoint_env: String,
    pub api_key_env: String,
    pub api_version: String,
    /// Model name for the OpenAI provider.
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Azure,
    OpenAI,
}

impl LlmProvider {
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::Azure => backend::API_KEY_ENV,
            LlmProvider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = AppForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" | "azure-openai" => Ok(LlmProvider::Azure),
            "openai" => Ok(LlmProvider::OpenAI),
            other => Err(AppForgeError::Config(format!(
                "Unknown provider '{other}'. Options: azure, openai"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    pub approval_match: ApprovalMatch,
    pub max_turns_per_round: usize,
    pub max_submit_attempts: u32,
    pub submit_backoff_ms: u64,
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub enabled: bool,
    pub run_script: bool,
    pub workdir: Option<PathBuf>,
    pub artifact_file: String,
    pub script_file: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Azure,
            deployment_env: backend::DEPLOYMENT_ENV.to_string(),
            endpoint_env: backend::ENDPOINT_ENV.to_string(),
            api_key_env: backend::API_KEY_ENV.to_string(),
            api_version: backend::AZURE_API_VERSION.to_string(),
            model: None,
            base_url: None,
        }
    }
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            approval_match: ApprovalMatch::default(),
            max_turns_per_round: scheduling::MAX_TURNS_PER_ROUND,
            max_submit_attempts: scheduling::MAX_SUBMIT_ATTEMPTS,
            submit_backoff_ms: scheduling::SUBMIT_BACKOFF_MS,
            settle_delay_ms: scheduling::SETTLE_DELAY_MS,
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            run_script: true,
            workdir: None,
            artifact_file: publish::ARTIFACT_FILE.to_string(),
            script_file: publish::SCRIPT_FILE.to_string(),
        }
    }
}

/// Resolved, validated backend credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Azure {
        endpoint: String,
        deployment: String,
        api_key: String,
        api_version: String,
    },
    OpenAI {
        base_url: String,
        model: String,
        api_key: String,
    },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => f
                .debug_struct("Azure")
                .field("endpoint", endpoint)
                .field("deployment", deployment)
                .field("api_version", api_version)
                .finish_non_exhaustive(),
            BackendConfig::OpenAI {
                base_url, model, ..
            } => f
                .debug_struct("OpenAI")
                .field("base_url", base_url)
                .field("model", model)
                .finish_non_exhaustive(),
        }
    }
}

impl BackendConfig {
    pub fn into_client(self) -> Arc<dyn LlmClient> {
        match self {
            BackendConfig::Azure {
                endpoint,
                deployment,
                api_key,
                api_version,
            } => Arc::new(
                AzureOpenAIClient::new(endpoint, deployment, api_key).with_api_version(api_version),
            ),
            BackendConfig::OpenAI {
                base_url,
                model,
                api_key,
            } => Arc::new(
                OpenAIClient::new(api_key)
                    .with_model(model)
                    .with_base_url(base_url),
            ),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("appforge")
            .join("config.toml")
    }

    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, AppForgeError> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`. A missing file yields defaults; an unreadable or
    /// malformed one is a configuration error.
    pub fn load_from(path: &Path) -> Result<Self, AppForgeError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppForgeError::Config(format!("{}: {e}", path.display())))?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| AppForgeError::Config(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppForgeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppForgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that do not depend on the environment.
    pub fn validate(&self) -> Result<(), AppForgeError> {
        for name in self.personas.keys() {
            if Persona::from_name(name).is_none() {
                return Err(AppForgeError::Config(format!(
                    "Unknown persona '{name}'. Options: BusinessAnalyst, SoftwareEngineer, ProductOwner"
                )));
            }
        }
        if self.orchestration.max_turns_per_round == 0 {
            return Err(AppForgeError::Config(
                "orchestration.max_turns_per_round must be at least 1".into(),
            ));
        }
        if self.orchestration.max_submit_attempts == 0 {
            return Err(AppForgeError::Config(
                "orchestration.max_submit_attempts must be at least 1".into(),
            ));
        }
        if self.publish.artifact_file.trim().is_empty() || self.publish.script_file.trim().is_empty() {
            return Err(AppForgeError::Config(
                "publish.artifact_file and publish.script_file must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve backend credentials from the process environment.
    pub fn backend_config(&self) -> Result<BackendConfig, AppForgeError> {
        self.backend_config_with(|name| std::env::var(name).ok())
    }

    /// Resolve backend credentials through `lookup`. Every required value
    /// must be present and non-empty; endpoints must be http(s) URLs.
    pub fn backend_config_with<F>(&self, lookup: F) -> Result<BackendConfig, AppForgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String, AppForgeError> {
            match lookup(name).map(|v| v.trim().to_string()) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(AppForgeError::Config(format!(
                    "Environment variable {name} is missing or empty"
                ))),
            }
        };

        match self.llm.provider {
            LlmProvider::Azure => {
                let endpoint = required(&self.llm.endpoint_env)?;
                validate_url(&self.llm.endpoint_env, &endpoint)?;
                Ok(BackendConfig::Azure {
                    endpoint,
                    deployment: required(&self.llm.deployment_env)?,
                    api_key: required(&self.llm.api_key_env)?,
                    api_version: self.llm.api_version.clone(),
                })
            }
            LlmProvider::OpenAI => {
                let base_url = self
                    .llm
                    .base_url
                    .clone()
                    .unwrap_or_else(|| backend::OPENAI_BASE_URL.to_string());
                validate_url("llm.base_url", &base_url)?;
                Ok(BackendConfig::OpenAI {
                    base_url,
                    model: self
                        .llm
                        .model
                        .clone()
                        .unwrap_or_else(|| backend::DEFAULT_OPENAI_MODEL.to_string()),
                    api_key: required(&self.llm.api_key_env)?,
                })
            }
        }
    }

    /// Build the completion backend, failing fast on missing credentials.
    pub fn build_llm_client(&self) -> Result<Arc<dyn LlmClient>, AppForgeError> {
        let config = self.backend_config()?;
        tracing::info!(backend = ?config, "completion backend configured");
        Ok(config.into_client())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        let o = &self.orchestration;
        SchedulerOptions {
            approval_match: o.approval_match,
            max_turns_per_round: o.max_turns_per_round,
            retry: RetryPolicy {
                max_attempts: o.max_submit_attempts,
                backoff: Duration::from_millis(o.submit_backoff_ms),
            },
            settle_delay: Duration::from_millis(o.settle_delay_ms),
        }
    }

    /// Instruction override for `persona`, if configured.
    pub fn instructions_for(&self, persona: Persona) -> Option<&str> {
        self.personas.get(persona.name()).map(String::as_str)
    }

    /// The publisher for this run, or `None` when publishing is disabled.
    pub fn publisher(&self) -> Option<Publisher> {
        if !self.publish.enabled {
            return None;
        }
        let workdir = self
            .publish
            .workdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Some(
            Publisher::new(workdir)
                .with_artifact_file(&self.publish.artifact_file)
                .with_script_file(&self.publish.script_file)
                .with_run_script(self.publish.run_script),
        )
    }
}

fn validate_url(label: &str, value: &str) -> Result<(), AppForgeError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| AppForgeError::Config(format!("{label} is not a valid URL ({value}): {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppForgeError::Config(format!(
            "{label} must use http or https, got '{scheme}'"
        ))),
    }
}
