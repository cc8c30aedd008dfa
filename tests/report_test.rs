// tests/report_test.rs — Integration test: model run, judge run and TSV report

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use funcchat_eval::cli::evaluate::Pipeline;
use funcchat_eval::core::types::RunOptions;
use funcchat_eval::evaluator::judge::JudgePromptBuilder;
use funcchat_eval::evaluator::report::{tsv_header, EvalMode, ReportSummary};
use funcchat_eval::evaluator::verdict::VerdictRules;
use funcchat_eval::infra::errors::EvalError;
use funcchat_eval::infra::paths::run_paths;
use funcchat_eval::provider::{Executor, Request, Response};

/// Model under test: answers every request with a fixed tool call.
struct ToolCallingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl Executor for ToolCallingModel {
    fn id(&self) -> &str {
        "model"
    }

    async fn predict(&self, request: &Request) -> Result<Response, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": format!("call_{}", request.serial_num),
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"서울\"}"}
                }]
            }}]
        }))
    }
}

/// Judge whose verdict depends on the serial number found in the prompt's
/// position: even serials pass in Korean, odd ones fail, serial 3 rambles.
struct ScriptedJudge {
    calls: AtomicUsize,
}

#[async_trait]
impl Executor for ScriptedJudge {
    fn id(&self) -> &str {
        "judge"
    }

    async fn predict(&self, request: &Request) -> Result<Response, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.tool_choice, "none");
        let text = match request.serial_num {
            3 => "판단을 보류합니다.\n추가 정보가 필요합니다",
            n if n % 2 == 0 => "함수와 인자가 일치합니다.\n결과\n통과",
            _ => "The arguments differ.\nfail",
        };
        Ok(json!({"role": "assistant", "content": text, "tool_calls": null}))
    }
}

fn golden(n: u64) -> Vec<Request> {
    (0..n)
        .map(|i| {
            let mut req = Request::new(i, format!("{i}번 도시 날씨 알려줘"));
            req.category = Some("weather".into());
            req.type_of_output = Some("call".into());
            req.ground_truth = json!({"name": "get_weather", "arguments": {"city": "서울"}});
            req
        })
        .collect()
}

fn pipeline(
    model: &Arc<ToolCallingModel>,
    judge: &Arc<ScriptedJudge>,
    options: RunOptions,
) -> Pipeline {
    Pipeline {
        mode: EvalMode::Common,
        model: model.clone() as Arc<dyn Executor>,
        judge: judge.clone() as Arc<dyn Executor>,
        options,
        prompt: JudgePromptBuilder::new(),
        rules: VerdictRules::default(),
        quiet: true,
    }
}

fn executors() -> (Arc<ToolCallingModel>, Arc<ScriptedJudge>) {
    (
        Arc::new(ToolCallingModel {
            calls: AtomicUsize::new(0),
        }),
        Arc::new(ScriptedJudge {
            calls: AtomicUsize::new(0),
        }),
    )
}

fn report_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_common_pipeline_writes_report() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("golden_weather.jsonl");
    let paths = run_paths(dir.path(), EvalMode::Common, &input, "tiny-model", None);
    let (model, judge) = executors();

    let outcome = pipeline(&model, &judge, RunOptions::default())
        .run(&golden(5), &paths)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        outcome.summary,
        ReportSummary {
            total: 5,
            passed: 3,
            failed: 1,
            unresolved: 1
        }
    );
    assert!(outcome.model_failures.is_empty());
    assert_eq!(
        outcome.report_path,
        dir.path().join("golden_weather.tiny-model.eval_report.tsv")
    );

    let lines = report_lines(&outcome.report_path);
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], tsv_header(EvalMode::Common));

    let row: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(row[0], "0");
    assert_eq!(row[1], "pass");
    assert_eq!(row[2], "weather");
    assert_eq!(row[3], "call");
    assert_eq!(row[4], "{\"name\":\"get_weather\",\"arguments\":{\"city\":\"서울\"}}");
    assert_eq!(row[5], "null");
    assert!(row[6].contains("get_weather"));
    assert!(row[7].starts_with("{\"reasoning\":\"함수와 인자가 일치합니다."));
    assert!(row[8].contains("0번 도시 날씨 알려줘"));

    let unresolved: Vec<&str> = lines[4].split('\t').collect();
    assert_eq!(unresolved[1], "판단을 보류합니다.추가 정보가 필요합니다");
}

#[tokio::test]
async fn test_rerun_reuses_both_caches() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("golden.jsonl");
    let paths = run_paths(dir.path(), EvalMode::Common, &input, "m", None);
    let (model, judge) = executors();
    let requests = golden(4);

    pipeline(&model, &judge, RunOptions::default())
        .run(&requests, &paths)
        .await
        .unwrap();
    let again = pipeline(&model, &judge, RunOptions::default())
        .run(&requests, &paths)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 4);
    assert_eq!(again.summary.total, 4);
}

#[tokio::test]
async fn test_sample_run_uses_separate_judge_files() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("golden.jsonl");
    let paths = run_paths(dir.path(), EvalMode::Common, &input, "m", None);
    let (model, judge) = executors();
    let options = RunOptions {
        sample: true,
        ..RunOptions::default()
    };

    let outcome = pipeline(&model, &judge, options)
        .run(&golden(3), &paths)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.summary.total, 1);
    assert_eq!(outcome.report_path, paths.for_sample().report);
    assert!(!paths.eval.exists());
    assert!(paths.for_sample().eval.exists());
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_singlecall_requires_tools_type() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("golden.jsonl");
    let paths = run_paths(dir.path(), EvalMode::SingleCall, &input, "m", Some("exact"));
    let (model, judge) = executors();
    let mut p = pipeline(&model, &judge, RunOptions::default());
    p.mode = EvalMode::SingleCall;

    let err = p.run(&golden(1), &paths).await.unwrap_err();
    assert!(matches!(err, EvalError::MissingField { .. }));

    let mut requests = golden(1);
    requests[0].tools_type = Some("exact".into());
    let outcome = p.run(&requests, &paths).await.unwrap().unwrap();
    let lines = report_lines(&outcome.report_path);
    assert!(lines[0].contains("tools_type"));
    assert_eq!(lines[1].split('\t').nth(2), Some("exact"));
}
