// src/cli/evaluate.rs — Evaluation pipeline: model run, judge run, report

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use super::{progress, Commands};
use crate::core::cache;
use crate::core::orchestrator::Orchestrator;
use crate::core::types::{as_failure, FailureRecord, RunOptions};
use crate::evaluator::judge::JudgePromptBuilder;
use crate::evaluator::report::{self, EvalMode, ReportSummary};
use crate::evaluator::verdict::VerdictRules;
use crate::infra::config::Config;
use crate::infra::errors::EvalError;
use crate::infra::paths::{self, RunPaths};
use crate::provider::resolver::build_executor;
use crate::provider::{Executor, Request, Response};

/// Load a pre-built request list, one JSON request per line.
pub fn load_requests(path: &Path) -> anyhow::Result<Vec<Request>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read requests from {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                anyhow::anyhow!("{}:{}: invalid request: {}", path.display(), idx + 1, e)
            })
        })
        .collect()
}

/// What a finished evaluation reports back.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub summary: ReportSummary,
    pub report_path: PathBuf,
    /// Sentinel responses in the model cache, from this run or earlier ones.
    pub model_failures: Vec<FailureRecord>,
    pub judge_failures: Vec<FailureRecord>,
}

fn sentinels(responses: &[Response]) -> Vec<FailureRecord> {
    responses.iter().filter_map(as_failure).collect()
}

/// Model run, judge run and report for one request list.
pub struct Pipeline {
    pub mode: EvalMode,
    pub model: Arc<dyn Executor>,
    pub judge: Arc<dyn Executor>,
    pub options: RunOptions,
    pub prompt: JudgePromptBuilder,
    pub rules: VerdictRules,
    pub quiet: bool,
}

impl Pipeline {
    fn orchestrator(&self, executor: &Arc<dyn Executor>, options: RunOptions, label: &str) -> Orchestrator {
        let orchestrator = Orchestrator::new(Arc::clone(executor), options).with_label(label);
        if self.quiet {
            orchestrator
        } else {
            orchestrator.with_progress(progress::terminal_progress())
        }
    }

    /// Returns `None` in sample mode when every case is already cached.
    pub async fn run(&self, requests: &[Request], paths: &RunPaths) -> Result<Option<EvaluationOutcome>, EvalError> {
        let start = if self.options.reset {
            0
        } else {
            cache::resume_offset(&paths.predict, requests.len())?
        };

        let model_run = self
            .orchestrator(&self.model, self.options.clone(), "model")
            .run(requests, &paths.predict)
            .await?;

        // Sample runs grade only the fresh slice, against their own judge cache.
        let (graded, out, judge_options) = if self.options.sample {
            if model_run.responses.is_empty() {
                return Ok(None);
            }
            let graded = &requests[start..start + model_run.responses.len()];
            let options = RunOptions {
                reset: true,
                sample: false,
                ..self.options.clone()
            };
            (graded, paths.for_sample(), options)
        } else {
            (requests, paths.clone(), self.options.clone())
        };

        let judge_requests = self.prompt.build_all(graded, &model_run.responses)?;
        let judge_run = self
            .orchestrator(&self.judge, judge_options, "judge")
            .run(&judge_requests, &out.eval)
            .await?;

        let records = report::build_records(
            self.mode,
            graded,
            &model_run.responses,
            &judge_run.responses,
            &self.rules,
        )?;
        report::write_report(&out.report, self.mode, &records).await?;

        Ok(Some(EvaluationOutcome {
            summary: ReportSummary::from_records(&records),
            report_path: out.report,
            model_failures: sentinels(&model_run.responses),
            judge_failures: sentinels(&judge_run.responses),
        }))
    }
}

fn print_failures(what: &str, failures: &[FailureRecord]) {
    const SHOWN: usize = 10;
    if failures.is_empty() {
        return;
    }
    eprintln!("{} {} call(s) failed:", failures.len(), what);
    for f in failures.iter().take(SHOWN) {
        eprintln!("  #{}: {}", f.serial_num, f.message);
    }
    if failures.len() > SHOWN {
        eprintln!("  ... and {} more", failures.len() - SHOWN);
    }
}

/// Entry point for the `common`, `dialog` and `singlecall` subcommands.
pub async fn run_evaluation(command: &Commands, mut config: Config, quiet: bool) -> anyhow::Result<()> {
    let mode = command.mode();
    let args = command.args();
    let tools_type = command.tools_type();
    args.apply_to(&mut config);

    let mut requests = load_requests(&args.input_path)?;
    if let Some(tt) = tools_type {
        for request in requests.iter_mut().filter(|r| r.tools_type.is_none()) {
            request.tools_type = Some(tt.to_string());
        }
    }

    let model = build_executor(&config.model)?;
    let judge = build_executor(&config.judge)?;
    let prompt = match config.judge_prompt.path {
        Some(ref path) => JudgePromptBuilder::from_file(path)?,
        None => JudgePromptBuilder::new(),
    };

    paths::ensure_dir(&config.run.output_dir).await?;
    let run_paths = paths::run_paths(
        &config.run.output_dir,
        mode,
        &args.input_path,
        &config.model.model,
        tools_type,
    );

    if !quiet {
        eprintln!(
            "[{}] {} | model: {} | judge: {} ({} requests)",
            mode,
            paths::test_prefix(mode, &args.input_path),
            config.model.model,
            config.judge.model,
            requests.len()
        );
    }

    let pipeline = Pipeline {
        mode,
        model,
        judge,
        options: args.run_options(&config),
        prompt,
        rules: config.verdict.clone(),
        quiet,
    };

    match pipeline.run(&requests, &run_paths).await? {
        Some(outcome) => {
            print_failures("model", &outcome.model_failures);
            print_failures("judge", &outcome.judge_failures);
            println!("{}", outcome.summary);
            if !quiet {
                eprintln!("report: {}", outcome.report_path.display());
            }
        }
        None => eprintln!("Nothing to sample: every request already has a cached response."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_requests_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.jsonl");
        std::fs::write(
            &path,
            "{\"serial_num\":1,\"messages\":[{\"role\":\"user\",\"content\":\"a\"}]}\n\n{\"serial_num\":2,\"messages\":[]}\n",
        )
        .unwrap();
        let requests = load_requests(&path).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].serial_num, 2);
    }

    #[test]
    fn test_load_requests_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.jsonl");
        std::fs::write(&path, "{\"serial_num\":1,\"messages\":[]}\n{\"serial_num\":\n").unwrap();
        let err = load_requests(&path).unwrap_err().to_string();
        assert!(err.contains("requests.jsonl:2: invalid request"));
    }

    #[test]
    fn test_load_requests_missing_file() {
        assert!(load_requests(Path::new("/nonexistent/requests.jsonl")).is_err());
    }
}
