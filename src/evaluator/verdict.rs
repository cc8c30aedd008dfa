// src/evaluator/verdict.rs — Classify a judge model's free text as pass / fail
//
// Judges are told to end their answer with a verdict token, so only the tail
// of the text is inspected. Scanning the whole answer would pick up "pass"
// or "fail" mentioned in the reasoning itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::Response;

/// Used as the reasoning column when a judge response carries no text.
pub const NO_REASONING: &str = "No reasoning available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// No token matched; holds the inspected key for manual review.
    Unresolved(String),
}

impl Verdict {
    /// Strict two-valued view: anything but `Pass` fails.
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("pass"),
            Verdict::Fail => f.write_str("fail"),
            Verdict::Unresolved(key) => f.write_str(key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenVerdict {
    Pass,
    Fail,
}

/// One row of the token table: if the key contains `token`, the result is `verdict`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictToken {
    pub token: String,
    pub verdict: TokenVerdict,
}

impl VerdictToken {
    fn new(token: &str, verdict: TokenVerdict) -> Self {
        Self {
            token: token.into(),
            verdict,
        }
    }
}

/// Tunable parameters of the extractor, loaded from the `[verdict]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictRules {
    /// Number of trailing lines forming the verdict key.
    pub primary_window: usize,
    /// Wider window used when the key is exactly `fallback_trigger`.
    pub fallback_window: usize,
    /// Boilerplate sign-off that pushes the real verdict further up.
    pub fallback_trigger: String,
    /// Checked in order, first match wins. Matching ignores case.
    pub tokens: Vec<VerdictToken>,
}

impl Default for VerdictRules {
    fn default() -> Self {
        Self {
            primary_window: 2,
            fallback_window: 4,
            fallback_trigger: "입니다.".into(),
            tokens: vec![
                VerdictToken::new("pass", TokenVerdict::Pass),
                VerdictToken::new("fail", TokenVerdict::Fail),
                VerdictToken::new("패스", TokenVerdict::Pass),
                VerdictToken::new("패쓰", TokenVerdict::Pass),
                VerdictToken::new("통과", TokenVerdict::Pass),
                VerdictToken::new("합격", TokenVerdict::Pass),
            ],
        }
    }
}

impl VerdictRules {
    /// Match a key against the token table.
    pub fn classify(&self, key: &str) -> Verdict {
        let lowered = key.to_lowercase();
        self.tokens
            .iter()
            .find(|t| lowered.contains(&t.token.to_lowercase()))
            .map(|t| match t.verdict {
                TokenVerdict::Pass => Verdict::Pass,
                TokenVerdict::Fail => Verdict::Fail,
            })
            .unwrap_or_else(|| Verdict::Unresolved(key.to_string()))
    }

    /// Classify judge text by its trailing lines, widening the window once
    /// when the narrow key is only the boilerplate sign-off.
    pub fn classify_text(&self, text: &str) -> Verdict {
        match self.classify(&tail_key(text, self.primary_window)) {
            Verdict::Unresolved(key) if key == self.fallback_trigger => {
                self.classify(&tail_key(text, self.fallback_window))
            }
            verdict => verdict,
        }
    }
}

/// Concatenate the last `window` lines of the trimmed text.
fn tail_key(text: &str, window: usize) -> String {
    let lines: Vec<&str> = text.trim().split('\n').collect();
    lines[lines.len().saturating_sub(window)..].concat()
}

/// Locate the answer text inside a judge response.
///
/// Shapes are probed in order: OpenAI `choices[0].message.content`, a flat
/// `completion`, `results[0].outputText`, then a flat `content`. Only the
/// first shape present is consulted.
pub fn extract_text(response: &Response) -> Option<&str> {
    let non_empty = |key: &str| {
        response
            .get(key)
            .and_then(|v| v.as_array())
            .filter(|items| !items.is_empty())
    };

    let candidate = if let Some(choices) = non_empty("choices") {
        choices[0].get("message").and_then(|m| m.get("content"))
    } else if let Some(completion) = response.get("completion") {
        Some(completion)
    } else if let Some(results) = non_empty("results") {
        results[0].get("outputText")
    } else {
        response.get("content")
    };

    candidate.and_then(|c| c.as_str())
}

/// Extract the verdict from a judge response. Never fails: an unrecognized
/// shape is logged and counts as `Fail`.
pub fn extract_verdict(response: &Response, rules: &VerdictRules) -> Verdict {
    match extract_text(response) {
        Some(text) => rules.classify_text(text),
        None => {
            tracing::warn!(
                keys = ?response.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()),
                "Could not find judge text in response, counting as fail"
            );
            Verdict::Fail
        }
    }
}

/// The judge's free text, or a placeholder when it has none.
pub fn reasoning_text(response: &Response) -> &str {
    extract_text(response).unwrap_or(NO_REASONING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn openai(content: &str) -> Response {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    // ─── Text location tests ────────────────────────────────────

    #[test]
    fn test_extract_openai_shape() {
        assert_eq!(extract_text(&openai("hello")), Some("hello"));
    }

    #[test]
    fn test_extract_completion_shape() {
        assert_eq!(extract_text(&json!({"completion": "c"})), Some("c"));
    }

    #[test]
    fn test_extract_results_shape() {
        let resp = json!({"results": [{"outputText": "r"}]});
        assert_eq!(extract_text(&resp), Some("r"));
    }

    #[test]
    fn test_extract_flat_content_shape() {
        let resp = json!({"role": "assistant", "content": "flat", "tool_calls": null});
        assert_eq!(extract_text(&resp), Some("flat"));
    }

    #[test]
    fn test_choices_shadow_later_shapes() {
        // Only the first present shape is consulted.
        let resp = json!({"choices": [{"message": {}}], "content": "ignored"});
        assert_eq!(extract_text(&resp), None);
    }

    #[test]
    fn test_empty_choices_fall_through() {
        let resp = json!({"choices": [], "content": "used"});
        assert_eq!(extract_text(&resp), Some("used"));
    }

    #[test]
    fn test_null_content_is_missing() {
        assert_eq!(extract_text(&json!({"choices": [{"message": {"content": null}}]})), None);
    }

    // ─── Verdict tests ──────────────────────────────────────────

    #[test]
    fn test_korean_pass_token() {
        let rules = VerdictRules::default();
        let resp = openai("모델 응답을 검토했습니다.\n정답입니다\n통과");
        assert_eq!(extract_verdict(&resp, &rules), Verdict::Pass);
    }

    #[test]
    fn test_fail_token() {
        let rules = VerdictRules::default();
        let resp = openai("Reasoning...\nThe answer is correct.\nfail");
        assert_eq!(extract_verdict(&resp, &rules), Verdict::Fail);
    }

    #[test]
    fn test_case_insensitive_latin() {
        let rules = VerdictRules::default();
        assert_eq!(rules.classify_text("analysis\nResult: PASS"), Verdict::Pass);
    }

    #[test]
    fn test_pass_checked_before_fail() {
        let rules = VerdictRules::default();
        assert_eq!(rules.classify_text("x\npass, not fail"), Verdict::Pass);
    }

    #[test]
    fn test_pass_in_early_reasoning_ignored() {
        let rules = VerdictRules::default();
        let text = "The call would pass validation.\nBut arguments differ.\n\n결론\n오답";
        assert_eq!(
            rules.classify_text(text),
            Verdict::Unresolved("결론오답".into())
        );
    }

    #[test]
    fn test_fallback_window_recovers_verdict() {
        let rules = VerdictRules::default();
        let text = "판정 근거를 설명합니다.\n판정: pass\n\n입니다.";
        assert_eq!(rules.classify_text(text), Verdict::Pass);
    }

    #[test]
    fn test_fallback_unresolved_returns_wide_key() {
        let rules = VerdictRules::default();
        let text = "a\nb\nc\n\n입니다.";
        assert_eq!(
            rules.classify_text(text),
            Verdict::Unresolved("bc입니다.".into())
        );
    }

    #[test]
    fn test_no_fallback_when_key_differs() {
        let rules = VerdictRules::default();
        let text = "판정: pass\n설명\n입니다.";
        assert_eq!(
            rules.classify_text(text),
            Verdict::Unresolved("설명입니다.".into())
        );
    }

    #[test]
    fn test_unrecognized_shape_is_fail() {
        let rules = VerdictRules::default();
        assert_eq!(extract_verdict(&json!({}), &rules), Verdict::Fail);
        assert_eq!(extract_verdict(&json!("bare string"), &rules), Verdict::Fail);
    }

    #[test]
    fn test_sentinel_error_response_is_fail() {
        let rules = VerdictRules::default();
        let sentinel = json!({"error": {"serial_num": 3, "message": "HTTP 500"}});
        assert_eq!(extract_verdict(&sentinel, &rules), Verdict::Fail);
    }

    #[test]
    fn test_custom_token_table() {
        let rules = VerdictRules {
            tokens: vec![VerdictToken::new("correct", TokenVerdict::Pass)],
            ..VerdictRules::default()
        };
        assert_eq!(rules.classify_text("x\ncorrect"), Verdict::Pass);
        assert_eq!(
            rules.classify_text("x\npass"),
            Verdict::Unresolved("xpass".into())
        );
    }

    #[test]
    fn test_rules_from_toml() {
        let rules: VerdictRules = toml::from_str(
            r#"
primary_window = 3
[[tokens]]
token = "ok"
verdict = "pass"
"#,
        )
        .unwrap();
        assert_eq!(rules.primary_window, 3);
        assert_eq!(rules.fallback_window, 4);
        assert_eq!(rules.classify("OK"), Verdict::Pass);
    }

    #[test]
    fn test_display_and_is_pass() {
        assert_eq!(Verdict::Pass.to_string(), "pass");
        assert!(!Verdict::Unresolved("입니다.".into()).is_pass());
        assert_eq!(Verdict::Unresolved("x".into()).to_string(), "x");
    }

    #[test]
    fn test_reasoning_placeholder() {
        assert_eq!(reasoning_text(&json!({})), NO_REASONING);
        assert_eq!(reasoning_text(&openai("why")), "why");
    }
}
