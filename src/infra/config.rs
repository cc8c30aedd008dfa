// src/infra/config.rs — Configuration loading (TOML)
//
// `${VAR}` placeholders anywhere in the file are replaced with environment
// variables before parsing, so API keys can stay out of the config itself.

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::core::types::FailurePolicy;
use crate::evaluator::verdict::VerdictRules;
use crate::infra::errors::EvalError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ExecutorConfig,

    #[serde(
        default = "ExecutorConfig::judge_default",
        deserialize_with = "judge_over_defaults"
    )]
    pub judge: ExecutorConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub verdict: VerdictRules,

    #[serde(default)]
    pub judge_prompt: JudgePromptConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ExecutorConfig::default(),
            judge: ExecutorConfig::judge_default(),
            run: RunConfig::default(),
            verdict: VerdictRules::default(),
            judge_prompt: JudgePromptConfig::default(),
        }
    }
}

/// Which wire protocol an executor speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    /// OpenAI-compatible server hosting an in-house model, addressed by `model_path`.
    Inhouse,
    Azure,
    Gemini,
    Bedrock,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Inhouse => "inhouse",
            ProviderKind::Azure => "azure",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Bedrock => "bedrock",
        };
        f.write_str(s)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "inhouse" => Ok(ProviderKind::Inhouse),
            "azure" => Ok(ProviderKind::Azure),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "bedrock" => Ok(ProviderKind::Bedrock),
            other => Err(format!(
                "unknown provider '{other}' (expected openai, inhouse, azure, gemini, bedrock)"
            )),
        }
    }
}

/// Connection settings for one executor (the model under test or the judge).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    /// Sent as a header to in-house servers that host several checkpoints.
    pub model_path: Option<String>,
    /// Azure OpenAI `api-version` query parameter.
    pub api_version: Option<String>,
    pub gcloud_project_id: Option<String>,
    pub gcloud_location: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub aws_region: String,
    pub max_tokens: Option<u32>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: String::new(),
            api_key: "inhouse".into(),
            base_url: "http://localhost/v1".into(),
            model_path: None,
            api_version: None,
            gcloud_project_id: None,
            gcloud_location: None,
            aws_access_key_id: None,
            aws_secret_key: None,
            aws_session_token: None,
            aws_region: "us-west-2".into(),
            max_tokens: None,
        }
    }
}

impl ExecutorConfig {
    pub fn judge_default() -> Self {
        Self {
            provider: ProviderKind::Bedrock,
            model: "anthropic.claude-3-sonnet-20240229-v1:0".into(),
            max_tokens: Some(4096),
            ..Self::default()
        }
    }
}

/// A `[judge]` table only overrides the keys it names; everything else keeps
/// the judge defaults rather than the generic executor defaults.
fn judge_over_defaults<'de, D>(deserializer: D) -> Result<ExecutorConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = toml::Table::deserialize(deserializer)?;
    let mut merged = match toml::Value::try_from(ExecutorConfig::judge_default()) {
        Ok(toml::Value::Table(table)) => table,
        Ok(_) => toml::Table::new(),
        Err(e) => return Err(de::Error::custom(e)),
    };
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    toml::Value::Table(merged)
        .try_into()
        .map_err(de::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub batch_size: usize,
    pub use_async: bool,
    pub failure_policy: FailurePolicy,
    pub call_timeout_secs: Option<u64>,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            use_async: false,
            failure_policy: FailurePolicy::Isolate,
            call_timeout_secs: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgePromptConfig {
    /// minijinja template overriding the built-in judge prompt.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load config from file, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, EvalError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, EvalError> {
        let content = substitute_env_vars(content);
        toml::from_str(&content).map_err(|e| EvalError::Config(e.to_string()))
    }
}

fn env_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex"))
}

/// Replace `${NAME}` with the value of the environment variable `NAME`.
/// Unknown variables are left untouched.
pub fn substitute_env_vars(text: &str) -> String {
    env_placeholder()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
