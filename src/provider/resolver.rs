// src/provider/resolver.rs — Build an executor from its config section

use std::sync::Arc;

use super::bedrock::BedrockExecutor;
use super::google::GeminiExecutor;
use super::openai_compat::{Flavor, OpenAICompatExecutor};
use super::Executor;
use crate::infra::config::{ExecutorConfig, ProviderKind};
use crate::infra::errors::EvalError;

/// Pick a value from config first, then the named environment variable.
fn config_or_env(value: &Option<String>, env_var: &str) -> Option<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|v| !v.is_empty()))
}

fn require(value: Option<String>, what: &str, provider: ProviderKind) -> Result<String, EvalError> {
    value.ok_or_else(|| EvalError::Config(format!("{provider} executor requires {what}")))
}

/// Construct the executor described by `config`.
///
/// Credentials missing from the config fall back to the usual environment
/// variables (`AWS_ACCESS_KEY_ID`, `GOOGLE_CLOUD_PROJECT`, ...).
pub fn build_executor(config: &ExecutorConfig) -> Result<Arc<dyn Executor>, EvalError> {
    if config.model.is_empty() {
        return Err(EvalError::Config(format!(
            "{} executor requires a model name",
            config.provider
        )));
    }

    let executor: Arc<dyn Executor> = match config.provider {
        ProviderKind::OpenAi | ProviderKind::Inhouse | ProviderKind::Azure => {
            let flavor = match config.provider {
                ProviderKind::Inhouse => Flavor::Inhouse,
                ProviderKind::Azure => Flavor::Azure,
                _ => Flavor::OpenAi,
            };
            Arc::new(
                OpenAICompatExecutor::new(
                    flavor,
                    config.api_key.clone(),
                    config.base_url.clone(),
                    config.model.clone(),
                )
                .with_model_path(config.model_path.clone())
                .with_api_version(config.api_version.clone())
                .with_max_tokens(config.max_tokens),
            )
        }
        ProviderKind::Gemini => {
            let project = require(
                config_or_env(&config.gcloud_project_id, "GOOGLE_CLOUD_PROJECT"),
                "gcloud_project_id",
                config.provider,
            )?;
            let location = config_or_env(&config.gcloud_location, "GOOGLE_CLOUD_LOCATION")
                .unwrap_or_else(|| "us-central1".into());
            let token = require(
                config_or_env(&Some(config.api_key.clone()), "GOOGLE_ACCESS_TOKEN"),
                "an access token (api_key or GOOGLE_ACCESS_TOKEN)",
                config.provider,
            )?;
            Arc::new(
                GeminiExecutor::new(token, project, location, config.model.clone())
                    .with_max_tokens(config.max_tokens),
            )
        }
        ProviderKind::Bedrock => {
            let access_key = require(
                config_or_env(&config.aws_access_key_id, "AWS_ACCESS_KEY_ID"),
                "aws_access_key_id",
                config.provider,
            )?;
            let secret = require(
                config_or_env(&config.aws_secret_key, "AWS_SECRET_ACCESS_KEY"),
                "aws_secret_key",
                config.provider,
            )?;
            let session = config_or_env(&config.aws_session_token, "AWS_SESSION_TOKEN");
            Arc::new(
                BedrockExecutor::new(
                    access_key,
                    secret,
                    session,
                    config.aws_region.clone(),
                    config.model.clone(),
                )
                .with_max_tokens(config.max_tokens),
            )
        }
    };

    tracing::debug!(
        executor = executor.id(),
        model = config.model.as_str(),
        "Executor ready"
    );
    Ok(executor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_inhouse() {
        let config = ExecutorConfig {
            provider: ProviderKind::Inhouse,
            model: "funcchat-7b".into(),
            model_path: Some("/ckpt/7b".into()),
            ..ExecutorConfig::default()
        };
        let exec = build_executor(&config).unwrap();
        assert_eq!(exec.id(), "inhouse");
    }

    #[test]
    fn test_build_requires_model() {
        let err = build_executor(&ExecutorConfig::default()).err().unwrap();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_build_bedrock_with_explicit_keys() {
        let config = ExecutorConfig {
            aws_access_key_id: Some("AKID".into()),
            aws_secret_key: Some("secret".into()),
            ..ExecutorConfig::judge_default()
        };
        let exec = build_executor(&config).unwrap();
        assert_eq!(exec.id(), "bedrock");
    }

    #[test]
    fn test_build_gemini_with_project() {
        let config = ExecutorConfig {
            provider: ProviderKind::Gemini,
            model: "gemini-1.5-pro".into(),
            api_key: "ya29.token".into(),
            gcloud_project_id: Some("proj".into()),
            ..ExecutorConfig::default()
        };
        let exec = build_executor(&config).unwrap();
        assert_eq!(exec.id(), "gemini");
    }
}
