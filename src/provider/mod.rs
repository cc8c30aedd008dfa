// src/provider/mod.rs — Executor capability and the request data model

pub mod bedrock;
pub mod google;
pub mod openai_compat;
pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::EvalError;

/// A provider response. The orchestrator never looks inside it: it is persisted
/// and counted as an atomic unit, and only the judge's responses are parsed.
pub type Response = serde_json::Value;

/// The single capability the orchestrator depends on.
///
/// Implementations translate a [`Request`] into their wire format, perform the
/// call and hand back the provider's answer.
#[async_trait]
pub trait Executor: Send + Sync {
    fn id(&self) -> &str;

    async fn predict(&self, request: &Request) -> Result<Response, EvalError>;
}

/// One evaluation case, produced by payload creation and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Position in the golden set; stable across runs.
    pub serial_num: u64,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDef>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
    #[serde(default)]
    pub ground_truth: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_arguments: Option<serde_json::Value>,

    // Mode-specific descriptors, consumed by the report builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_of_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_type: Option<String>,
}

fn default_tool_choice() -> String {
    "auto".into()
}

impl Request {
    /// Minimal request with a single user turn, mostly useful in tests.
    pub fn new(serial_num: u64, prompt: impl Into<String>) -> Self {
        Self {
            serial_num,
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            temperature: 0.0,
            tool_choice: default_tool_choice(),
            ground_truth: serde_json::Value::Null,
            acceptable_arguments: None,
            category: None,
            type_of_output: None,
            tools_type: None,
        }
    }
}

/// OpenAI-style chat message. This is the canonical shape requests are stored in;
/// other providers convert from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as OpenAI sends them.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type", default = "default_function_type")]
    pub kind: String,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

fn default_function_type() -> String {
    "function".into()
}

/// Map a reqwest transport error into an executor failure.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> EvalError {
    EvalError::Provider {
        provider: provider.to_string(),
        message: e.to_string(),
        retriable: e.is_timeout() || e.is_connect(),
    }
}

/// Read a response body, turning non-2xx statuses into executor failures.
pub(crate) async fn read_json(
    provider: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, EvalError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(EvalError::Provider {
            provider: provider.to_string(),
            message: format!("HTTP {}: {}", status, body),
            retriable: status.as_u16() == 429 || status.is_server_error(),
        });
    }

    response.json().await.map_err(|e| EvalError::Provider {
        provider: provider.to_string(),
        message: e.to_string(),
        retriable: false,
    })
}
