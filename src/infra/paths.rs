// src/infra/paths.rs — Output file naming for an evaluation run
//
// Every run writes three files under the output directory:
//   {prefix}.{model}[.{tools_type}].output.jsonl      model responses (cache)
//   {prefix}.{model}[.{tools_type}].eval.jsonl        judge responses (cache)
//   {prefix}.{model}[.{tools_type}].eval_report.tsv   report

use std::path::{Path, PathBuf};

use crate::evaluator::report::EvalMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub predict: PathBuf,
    pub eval: PathBuf,
    pub report: PathBuf,
}

impl RunPaths {
    /// Judge cache and report for sample runs, kept apart from the full run's files.
    pub fn for_sample(&self) -> RunPaths {
        RunPaths {
            predict: self.predict.clone(),
            eval: with_sample_marker(&self.eval),
            report: with_sample_marker(&self.report),
        }
    }
}

fn with_sample_marker(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rsplit_once(".eval") {
        Some((head, tail)) => path.with_file_name(format!("{head}.sample.eval{tail}")),
        None => path.with_file_name(format!("{name}.sample")),
    }
}

/// File-name prefix for a mode. `common` runs are named after their input file.
pub fn test_prefix(mode: EvalMode, input_path: &Path) -> String {
    match mode {
        EvalMode::Common => input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "common".into()),
        EvalMode::Dialog => "FunctionChat-Dialog".into(),
        EvalMode::SingleCall => "FunctionChat-Singlecall".into(),
    }
}

/// Model names like `org/model` must not introduce subdirectories.
pub fn safe_model_name(model: &str) -> String {
    model.replace(['/', '\\', ':'], "_")
}

pub fn run_paths(
    output_dir: &Path,
    mode: EvalMode,
    input_path: &Path,
    model: &str,
    tools_type: Option<&str>,
) -> RunPaths {
    let mut stem = format!("{}.{}", test_prefix(mode, input_path), safe_model_name(model));
    if let Some(tt) = tools_type {
        stem.push('.');
        stem.push_str(tt);
    }

    RunPaths {
        predict: output_dir.join(format!("{stem}.output.jsonl")),
        eval: output_dir.join(format!("{stem}.eval.jsonl")),
        report: output_dir.join(format!("{stem}.eval_report.tsv")),
    }
}

pub async fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}
