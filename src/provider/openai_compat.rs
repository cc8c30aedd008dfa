// src/provider/openai_compat.rs — OpenAI-compatible executor
//
// Covers api.openai.com, in-house servers that speak the same protocol
// (optionally selecting a checkpoint via a `model-path` header) and Azure OpenAI
// deployments. Requests are already stored in OpenAI shape, so the adapter pair
// is close to the identity.

use async_trait::async_trait;
use serde_json::json;

use super::{read_json, transport_error, Executor, Request, Response};
use crate::infra::errors::EvalError;

const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    OpenAi,
    Inhouse,
    Azure,
}

pub struct OpenAICompatExecutor {
    id_str: String,
    flavor: Flavor,
    api_key: String,
    base_url: String,
    model: String,
    model_path: Option<String>,
    api_version: Option<String>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAICompatExecutor {
    pub fn new(flavor: Flavor, api_key: String, base_url: String, model: String) -> Self {
        let id_str = match flavor {
            Flavor::OpenAi => "openai",
            Flavor::Inhouse => "inhouse",
            Flavor::Azure => "azure",
        };
        Self {
            id_str: id_str.into(),
            flavor,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            model_path: None,
            api_version: None,
            max_tokens: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model_path(mut self, model_path: Option<String>) -> Self {
        self.model_path = model_path;
        self
    }

    pub fn with_api_version(mut self, api_version: Option<String>) -> Self {
        self.api_version = api_version;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        match self.flavor {
            Flavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url,
                self.model,
                self.api_version
                    .as_deref()
                    .unwrap_or(DEFAULT_AZURE_API_VERSION)
            ),
            Flavor::OpenAi | Flavor::Inhouse => format!("{}/chat/completions", self.base_url),
        }
    }
}

/// Build the `/chat/completions` body.
pub fn to_provider_format(request: &Request, model: &str, max_tokens: Option<u32>) -> serde_json::Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages,
        "temperature": request.temperature,
    });
    // tool_choice without tools is rejected by most servers
    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools);
        body["tool_choice"] = json!(request.tool_choice);
    }
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Responses are kept in their native `choices` shape.
pub fn from_provider_format(response: &serde_json::Value) -> Response {
    response.clone()
}

#[async_trait]
impl Executor for OpenAICompatExecutor {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn predict(&self, request: &Request) -> Result<Response, EvalError> {
        let body = to_provider_format(request, &self.model, self.max_tokens);

        let mut req = self.client.post(self.endpoint()).json(&body);
        req = match self.flavor {
            Flavor::Azure => req.header("api-key", &self.api_key),
            Flavor::OpenAi | Flavor::Inhouse => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
        };
        if let Some(ref path) = self.model_path {
            req = req.header("model-path", path);
        }

        tracing::debug!(
            provider = self.id_str.as_str(),
            serial_num = request.serial_num,
            "POST {}",
            self.endpoint()
        );

        let response = req
            .send()
            .await
            .map_err(|e| transport_error(&self.id_str, e))?;
        let resp = read_json(&self.id_str, response).await?;

        Ok(from_provider_format(&resp))
    }
}
