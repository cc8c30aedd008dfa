// src/provider/bedrock.rs — AWS Bedrock executor (Converse API, SigV4 auth)
//
// Requests are signed with SigV4 directly instead of going through the AWS SDK.
// The adapter pair converts between OpenAI-shaped chat messages and Bedrock's
// content-block format, including tool use and tool results.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{read_json, transport_error, Executor, Request, Response, Role, ToolDef};
use crate::infra::errors::EvalError;

pub struct BedrockExecutor {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    region: String,
    model_id: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl BedrockExecutor {
    pub fn new(
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
        region: String,
        model_id: String,
    ) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            session_token,
            region,
            model_id,
            max_tokens: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
    }

    fn converse_url(&self) -> String {
        format!(
            "{}/model/{}/converse",
            self.endpoint(),
            uri_encode(&self.model_id, true)
        )
    }

    /// Sign a request with AWS SigV4, appending the auth headers to `headers`.
    fn sign_request(
        &self,
        method: &str,
        url: &str,
        headers: &mut Vec<(String, String)>,
        payload: &[u8],
    ) -> Result<(), EvalError> {
        let now = Utc::now();
        let datestamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let parsed = url::Url::parse(url)
            .map_err(|e| EvalError::Config(format!("invalid Bedrock URL '{url}': {e}")))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        // Non-S3 services sign the path with every segment encoded a second time.
        let canonical_path = parsed
            .path()
            .split('/')
            .map(|seg| uri_encode(seg, true))
            .collect::<Vec<_>>()
            .join("/");

        headers.push(("host".into(), host));
        headers.push(("x-amz-date".into(), amz_date.clone()));
        headers.push(("content-type".into(), "application/json".into()));
        if let Some(ref token) = self.session_token {
            headers.push(("x-amz-security-token".into(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method,
            canonical_path,
            canonical_headers,
            signed_headers,
            sha256_hex(payload)
        );

        let credential_scope = format!("{}/{}/bedrock/aws4_request", datestamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            datestamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"bedrock");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        headers.push((
            "authorization".into(),
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                self.access_key_id, credential_scope, signed_headers, signature
            ),
        ));
        Ok(())
    }
}

// ─── Adapter pair ───────────────────────────────────────────────────────────

fn tool_spec(tool: &ToolDef) -> serde_json::Value {
    let mut parameters = match &tool.function.parameters {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    // Bedrock rejects schemas whose top-level type is not "object".
    parameters
        .entry("type")
        .or_insert_with(|| json!("object"));
    let has_properties = parameters
        .get("properties")
        .and_then(|p| p.as_object())
        .is_some_and(|p| !p.is_empty());
    if !has_properties {
        parameters.insert("properties".into(), json!({}));
    }

    json!({
        "toolSpec": {
            "name": tool.function.name,
            "description": tool.function.description,
            "inputSchema": { "json": parameters },
        }
    })
}

fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| json!({ "raw": arguments }))
}

/// Convert an OpenAI-shaped request into a Converse API body.
///
/// The first system message is folded into the first user turn, since it is
/// sent as conversation text rather than through the `system` field.
pub fn to_provider_format(request: &Request, max_tokens: Option<u32>) -> serde_json::Value {
    let system_content = request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .and_then(|m| m.content.clone());

    let mut messages: Vec<serde_json::Value> = Vec::new();
    for m in &request.messages {
        match m.role {
            Role::System => continue,
            Role::User => {
                let text = match (&system_content, messages.is_empty()) {
                    (Some(sys), true) => format!("<system>\n{}\n</system>\n\n{}", sys, m.text()),
                    _ => m.text().to_string(),
                };
                messages.push(json!({ "role": "user", "content": [{ "text": text }] }));
            }
            Role::Assistant => match &m.tool_calls {
                Some(calls) => {
                    let mut items = Vec::new();
                    if let Some(text) = m.content.as_deref().filter(|t| !t.is_empty()) {
                        items.push(json!({ "text": text }));
                    }
                    for call in calls.iter().filter(|c| c.kind == "function") {
                        items.push(json!({
                            "toolUse": {
                                "toolUseId": call.id,
                                "name": call.function.name,
                                "input": parse_arguments(&call.function.arguments),
                            }
                        }));
                    }
                    messages.push(json!({ "role": "assistant", "content": items }));
                }
                None => messages.push(json!({
                    "role": "assistant",
                    "content": [{ "text": m.text() }],
                })),
            },
            Role::Tool => {
                let content = match serde_json::from_str::<serde_json::Value>(m.text()) {
                    Ok(v) => json!([{ "json": v }]),
                    Err(_) => json!([{ "text": m.text() }]),
                };
                messages.push(json!({
                    "role": "user",
                    "content": [{
                        "toolResult": {
                            "toolUseId": m.tool_call_id.clone().unwrap_or_default(),
                            "content": content,
                        }
                    }],
                }));
            }
        }
    }

    let mut body = json!({ "messages": messages });

    let mut inference = serde_json::Map::new();
    inference.insert("temperature".into(), json!(request.temperature));
    if let Some(max_tokens) = max_tokens {
        inference.insert("maxTokens".into(), json!(max_tokens));
    }
    body["inferenceConfig"] = serde_json::Value::Object(inference);

    let tools: Vec<serde_json::Value> = request
        .tools
        .iter()
        .filter(|t| t.kind == "function")
        .map(tool_spec)
        .collect();
    if !tools.is_empty() {
        body["toolConfig"] = json!({ "tools": tools });
    }

    body
}

/// Convert a Converse response into an OpenAI-style assistant message.
pub fn from_provider_format(response: &serde_json::Value) -> Response {
    let items = response["output"]["message"]["content"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut texts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<serde_json::Value> = Vec::new();
    for item in &items {
        if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
            texts.push(text.to_string());
        } else if let Some(tool_use) = item.get("toolUse") {
            let id = tool_use["toolUseId"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", tool_calls.len()));
            tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": {
                    "name": tool_use["name"].as_str().unwrap_or_default(),
                    "arguments": tool_use.get("input").cloned().unwrap_or_else(|| json!({})).to_string(),
                },
            }));
        }
    }

    json!({
        "role": "assistant",
        "content": if texts.is_empty() { serde_json::Value::Null } else { json!(texts.join(" ")) },
        "tool_calls": if tool_calls.is_empty() { serde_json::Value::Null } else { json!(tool_calls) },
    })
}

#[async_trait]
impl Executor for BedrockExecutor {
    fn id(&self) -> &str {
        "bedrock"
    }

    async fn predict(&self, request: &Request) -> Result<Response, EvalError> {
        let url = self.converse_url();
        let body = to_provider_format(request, self.max_tokens);
        let payload = serde_json::to_vec(&body)?;

        let mut sig_headers = Vec::new();
        self.sign_request("POST", &url, &mut sig_headers, &payload)?;

        let mut req = self.client.post(&url);
        for (k, v) in &sig_headers {
            req = req.header(k.as_str(), v.as_str());
        }

        tracing::debug!(serial_num = request.serial_num, "POST {}", url);

        let response = req
            .body(payload)
            .send()
            .await
            .map_err(|e| transport_error("bedrock", e))?;
        let resp = read_json("bedrock", response).await?;

        Ok(from_provider_format(&resp))
    }
}

// ─── SigV4 helpers ──────────────────────────────────────────────────────────

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;

    let key = if key.len() > BLOCK_SIZE {
        Sha256::digest(key).to_vec()
    } else {
        key.to_vec()
    };

    let mut k_ipad = vec![0x36u8; BLOCK_SIZE];
    let mut k_opad = vec![0x5cu8; BLOCK_SIZE];
    for (i, &b) in key.iter().enumerate() {
        k_ipad[i] ^= b;
        k_opad[i] ^= b;
    }

    k_ipad.extend_from_slice(data);
    let inner = Sha256::digest(&k_ipad);
    k_opad.extend_from_slice(&inner);
    Sha256::digest(&k_opad).into()
}

/// AWS flavour of percent-encoding: only unreserved characters pass through.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
