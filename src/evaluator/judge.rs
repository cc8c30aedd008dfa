// src/evaluator/judge.rs — Build judge requests from (request, model response) pairs

use std::path::Path;

use minijinja::{context, Environment};

use crate::infra::errors::EvalError;
use crate::provider::{Message, Request, Response};

/// Built-in judge prompt. Overridable through `[judge_prompt] path`.
///
/// Available variables: `serial_num`, `messages`, `tools`, `ground_truth`,
/// `acceptable_arguments` (empty when absent) and `model_output`, all of them
/// pre-rendered JSON text.
pub const DEFAULT_TEMPLATE: &str = r#"You are grading the function-calling behaviour of an AI assistant.

[Conversation given to the assistant]
{{ messages }}

[Tools the assistant could call]
{{ tools }}

[Expected answer]
{{ ground_truth }}
{% if acceptable_arguments %}
[Other acceptable arguments]
{{ acceptable_arguments }}
{% endif %}
[Assistant output]
{{ model_output }}

Decide whether the assistant output is correct. When a function call is expected, the assistant must call the same function with arguments equivalent to the expected ones or to the other acceptable arguments. When a plain reply is expected, the reply must serve the user as well as the expected answer does.
Explain your reasoning briefly, then write a single word, pass or fail, on the last line."#;

/// Renders the judge prompt and wraps it into a judge [`Request`].
#[derive(Debug, Clone)]
pub struct JudgePromptBuilder {
    source: String,
}

impl JudgePromptBuilder {
    pub fn new() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Use a custom template. Syntax errors surface here rather than mid-run.
    pub fn from_template(source: impl Into<String>) -> Result<Self, EvalError> {
        let source = source.into();
        Environment::new().template_from_str(&source)?;
        Ok(Self { source })
    }

    pub fn from_file(path: &Path) -> Result<Self, EvalError> {
        let source = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded judge template from {}", path.display());
        Self::from_template(source)
    }

    pub fn render(&self, request: &Request, response: &Response) -> Result<String, EvalError> {
        let acceptable = match &request.acceptable_arguments {
            Some(value) if !value.is_null() => serde_json::to_string_pretty(value)?,
            _ => String::new(),
        };
        let env = Environment::new();
        let prompt = env.render_str(
            &self.source,
            context! {
                serial_num => request.serial_num,
                messages => serde_json::to_string_pretty(&request.messages)?,
                tools => serde_json::to_string_pretty(&request.tools)?,
                ground_truth => serde_json::to_string_pretty(&request.ground_truth)?,
                acceptable_arguments => acceptable,
                model_output => serde_json::to_string_pretty(response)?,
            },
        )?;
        Ok(prompt)
    }

    /// A judge request keeps the serial number of the request it grades.
    pub fn build_request(&self, request: &Request, response: &Response) -> Result<Request, EvalError> {
        let prompt = self.render(request, response)?;
        Ok(Request {
            serial_num: request.serial_num,
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            temperature: 0.0,
            tool_choice: "none".into(),
            ground_truth: serde_json::Value::Null,
            acceptable_arguments: None,
            category: None,
            type_of_output: None,
            tools_type: None,
        })
    }

    /// One judge request per (request, response) pair, in order.
    pub fn build_all(&self, requests: &[Request], responses: &[Response]) -> Result<Vec<Request>, EvalError> {
        if requests.len() != responses.len() {
            return Err(EvalError::Other(anyhow::anyhow!(
                "{} requests but {} model responses",
                requests.len(),
                responses.len()
            )));
        }
        requests
            .iter()
            .zip(responses)
            .map(|(req, resp)| self.build_request(req, resp))
            .collect()
    }
}

impl Default for JudgePromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graded_request() -> Request {
        let mut req = Request::new(42, "서울 날씨 알려줘");
        req.ground_truth = json!({"name": "get_weather", "arguments": "{\"city\": \"서울\"}"});
        req
    }

    #[test]
    fn test_default_template_renders_all_parts() {
        let builder = JudgePromptBuilder::new();
        let prompt = builder
            .render(&graded_request(), &json!({"content": "맑음"}))
            .unwrap();
        assert!(prompt.contains("서울 날씨 알려줘"));
        assert!(prompt.contains("get_weather"));
        assert!(prompt.contains("맑음"));
        assert!(!prompt.contains("[Other acceptable arguments]"));
        assert!(prompt.trim_end().ends_with("pass or fail, on the last line."));
    }

    #[test]
    fn test_acceptable_arguments_section_appears() {
        let mut req = graded_request();
        req.acceptable_arguments = Some(json!({"city": ["서울", "Seoul"]}));
        let prompt = JudgePromptBuilder::new().render(&req, &json!({})).unwrap();
        assert!(prompt.contains("[Other acceptable arguments]"));
        assert!(prompt.contains("Seoul"));
    }

    #[test]
    fn test_judge_request_shape() {
        let judge = JudgePromptBuilder::new()
            .build_request(&graded_request(), &json!({"content": "x"}))
            .unwrap();
        assert_eq!(judge.serial_num, 42);
        assert_eq!(judge.messages.len(), 1);
        assert!(judge.tools.is_empty());
        assert_eq!(judge.temperature, 0.0);
        assert_eq!(judge.tool_choice, "none");
    }

    #[test]
    fn test_custom_template() {
        let builder = JudgePromptBuilder::from_template("#{{ serial_num }}: {{ model_output }}").unwrap();
        let prompt = builder.render(&graded_request(), &json!("ok")).unwrap();
        assert_eq!(prompt, "#42: \"ok\"");
    }

    #[test]
    fn test_bad_template_rejected_early() {
        let err = JudgePromptBuilder::from_template("{% if %}").unwrap_err();
        assert!(matches!(err, EvalError::Template(_)));
    }

    #[test]
    fn test_build_all_length_mismatch() {
        let err = JudgePromptBuilder::new()
            .build_all(&[graded_request()], &[])
            .unwrap_err();
        assert!(err.to_string().contains("1 requests but 0 model responses"));
    }
}
