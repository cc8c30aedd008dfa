// src/provider/google.rs — Gemini executor (Vertex AI generateContent)

use async_trait::async_trait;
use serde_json::json;

use super::{read_json, transport_error, Executor, Message, Request, Response, Role};
use crate::infra::errors::EvalError;

pub struct GeminiExecutor {
    access_token: String,
    project_id: String,
    location: String,
    model: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl GeminiExecutor {
    pub fn new(access_token: String, project_id: String, location: String, model: String) -> Self {
        Self {
            access_token,
            project_id,
            location,
            model,
            max_tokens: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/{model}:generateContent",
            loc = self.location,
            project = self.project_id,
            model = self.model,
        )
    }
}

/// Tool results in Gemini are keyed by function name, not call id.
fn function_name_for_call<'a>(messages: &'a [Message], tool_call_id: &str) -> Option<&'a str> {
    messages
        .iter()
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .find(|c| c.id == tool_call_id)
        .map(|c| c.function.name.as_str())
}

fn parse_json_or_wrap(text: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) if v.is_object() => v,
        Ok(v) => json!({ "content": v }),
        Err(_) => json!({ "content": text }),
    }
}

/// Build the `generateContent` body from an OpenAI-shaped request.
pub fn to_provider_format(request: &Request, max_tokens: Option<u32>) -> serde_json::Value {
    let mut contents: Vec<serde_json::Value> = Vec::new();
    let mut system_parts: Vec<serde_json::Value> = Vec::new();

    for m in &request.messages {
        match m.role {
            Role::System => system_parts.push(json!({ "text": m.text() })),
            Role::User => contents.push(json!({
                "role": "user",
                "parts": [{ "text": m.text() }],
            })),
            Role::Assistant => {
                let mut parts = Vec::new();
                if let Some(text) = m.content.as_deref().filter(|t| !t.is_empty()) {
                    parts.push(json!({ "text": text }));
                }
                for call in m.tool_calls.iter().flatten() {
                    parts.push(json!({
                        "functionCall": {
                            "name": call.function.name,
                            "args": parse_json_or_wrap(&call.function.arguments),
                        }
                    }));
                }
                contents.push(json!({ "role": "model", "parts": parts }));
            }
            Role::Tool => {
                let name = m
                    .name
                    .as_deref()
                    .or_else(|| {
                        m.tool_call_id
                            .as_deref()
                            .and_then(|id| function_name_for_call(&request.messages, id))
                    })
                    .unwrap_or_default();
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "response": parse_json_or_wrap(m.text()),
                        }
                    }],
                }));
            }
        }
    }

    let mut body = json!({ "contents": contents });

    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({ "parts": system_parts });
    }

    let mut gen_config = json!({ "temperature": request.temperature });
    if let Some(max_tokens) = max_tokens {
        gen_config["maxOutputTokens"] = json!(max_tokens);
    }
    body["generationConfig"] = gen_config;

    if !request.tools.is_empty() {
        let declarations: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "parameters": t.function.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);

        let mode = match request.tool_choice.as_str() {
            "none" => "NONE",
            "required" => "ANY",
            _ => "AUTO",
        };
        body["toolConfig"] = json!({ "functionCallingConfig": { "mode": mode } });
    }

    body
}

/// Convert a `generateContent` response into an OpenAI-style assistant message.
pub fn from_provider_format(response: &serde_json::Value) -> Response {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in &parts {
        if let Some(text) = part["text"].as_str() {
            texts.push(text.to_string());
        } else if let Some(call) = part.get("functionCall") {
            tool_calls.push(json!({
                "id": format!("call_{}", tool_calls.len()),
                "type": "function",
                "function": {
                    "name": call["name"].as_str().unwrap_or_default(),
                    "arguments": call
                        .get("args")
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "{}".into()),
                },
            }));
        }
    }

    json!({
        "role": "assistant",
        "content": if texts.is_empty() { serde_json::Value::Null } else { json!(texts.join("")) },
        "tool_calls": if tool_calls.is_empty() { serde_json::Value::Null } else { json!(tool_calls) },
    })
}

#[async_trait]
impl Executor for GeminiExecutor {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn predict(&self, request: &Request) -> Result<Response, EvalError> {
        let body = to_provider_format(request, self.max_tokens);

        tracing::debug!(serial_num = request.serial_num, "POST {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("gemini", e))?;
        let resp = read_json("gemini", response).await?;

        Ok(from_provider_format(&resp))
    }
}
