// src/evaluator/report.rs — Per-case report records and TSV output

use std::fmt;
use std::path::Path;

use serde::Serialize;

use super::verdict::{extract_verdict, reasoning_text, Verdict, VerdictRules};
use crate::infra::errors::EvalError;
use crate::provider::{Request, Response};

/// Selects the report schema and the output file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Common,
    Dialog,
    SingleCall,
}

/// A report column. Each mode projects a fixed sequence of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    SerialNum,
    IsPass,
    Category,
    TypeOfOutput,
    ToolsType,
    GroundTruth,
    AcceptableArguments,
    ModelOutput,
    Reasoning,
    InputMessages,
    Query,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::SerialNum => "serial_num",
            Column::IsPass => "is_pass",
            Column::Category => "category",
            Column::TypeOfOutput => "type_of_output",
            Column::ToolsType => "tools_type",
            Column::GroundTruth => "ground_truth",
            Column::AcceptableArguments => "acceptable_arguments",
            Column::ModelOutput => "model_output",
            Column::Reasoning => "reasoning",
            Column::InputMessages => "input_messages",
            Column::Query => "query",
        }
    }
}

const COMMON_COLUMNS: &[Column] = &[
    Column::SerialNum,
    Column::IsPass,
    Column::Category,
    Column::TypeOfOutput,
    Column::GroundTruth,
    Column::AcceptableArguments,
    Column::ModelOutput,
    Column::Reasoning,
    Column::InputMessages,
];

const DIALOG_COLUMNS: &[Column] = &[
    Column::SerialNum,
    Column::IsPass,
    Column::TypeOfOutput,
    Column::GroundTruth,
    Column::AcceptableArguments,
    Column::ModelOutput,
    Column::Reasoning,
    Column::Query,
];

const SINGLE_CALL_COLUMNS: &[Column] = &[
    Column::SerialNum,
    Column::IsPass,
    Column::ToolsType,
    Column::GroundTruth,
    Column::AcceptableArguments,
    Column::ModelOutput,
    Column::Reasoning,
    Column::Query,
];

impl EvalMode {
    /// Column order of the report for this mode.
    pub fn columns(self) -> &'static [Column] {
        match self {
            EvalMode::Common => COMMON_COLUMNS,
            EvalMode::Dialog => DIALOG_COLUMNS,
            EvalMode::SingleCall => SINGLE_CALL_COLUMNS,
        }
    }

    pub fn keys(self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name()).collect()
    }
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMode::Common => write!(f, "common"),
            EvalMode::Dialog => write!(f, "dialog"),
            EvalMode::SingleCall => write!(f, "singlecall"),
        }
    }
}

/// One report row. Values are already rendered, in the mode's key order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub mode: EvalMode,
    pub serial_num: u64,
    pub verdict: Verdict,
    values: Vec<String>,
}

/// Compact JSON, non-ASCII kept as is.
fn json_text<T: Serialize + ?Sized>(value: &T) -> Result<String, EvalError> {
    Ok(serde_json::to_string(value)?)
}

/// Unresolved verdicts carry raw judge text; keep it on one TSV cell.
fn tsv_cell(text: &str) -> String {
    text.replace('\t', "\\t")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

fn descriptor(request: &Request, column: Column, value: &Option<String>) -> Result<String, EvalError> {
    value.clone().ok_or_else(|| EvalError::MissingField {
        serial_num: request.serial_num,
        field: column.name().to_string(),
    })
}

impl ReportRecord {
    /// Combine a request, its model response and the judge's response.
    pub fn build(
        mode: EvalMode,
        request: &Request,
        response: &Response,
        judge_response: &Response,
        rules: &VerdictRules,
    ) -> Result<Self, EvalError> {
        let verdict = extract_verdict(judge_response, rules);
        let reasoning = serde_json::json!({ "reasoning": reasoning_text(judge_response) });

        let mut values = Vec::with_capacity(mode.columns().len());
        for column in mode.columns() {
            let value = match column {
                Column::SerialNum => request.serial_num.to_string(),
                Column::IsPass => tsv_cell(&verdict.to_string()),
                Column::Category => descriptor(request, *column, &request.category)?,
                Column::TypeOfOutput => descriptor(request, *column, &request.type_of_output)?,
                Column::ToolsType => descriptor(request, *column, &request.tools_type)?,
                Column::GroundTruth => json_text(&request.ground_truth)?,
                Column::AcceptableArguments => json_text(&request.acceptable_arguments)?,
                Column::ModelOutput => json_text(response)?,
                Column::Reasoning => json_text(&reasoning)?,
                Column::InputMessages | Column::Query => json_text(&request.messages)?,
            };
            values.push(value);
        }

        Ok(Self {
            mode,
            serial_num: request.serial_num,
            verdict,
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.mode
            .columns()
            .iter()
            .position(|c| c.name() == key)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn to_tsv_row(&self) -> String {
        self.values.join("\t")
    }
}

pub fn tsv_header(mode: EvalMode) -> String {
    format!("#{}", mode.keys().join("\t"))
}

/// Build one record per case. All three slices must be aligned by position.
pub fn build_records(
    mode: EvalMode,
    requests: &[Request],
    responses: &[Response],
    judge_responses: &[Response],
    rules: &VerdictRules,
) -> Result<Vec<ReportRecord>, EvalError> {
    if requests.len() != responses.len() || requests.len() != judge_responses.len() {
        return Err(EvalError::Other(anyhow::anyhow!(
            "cannot build report: {} requests, {} model responses, {} judge responses",
            requests.len(),
            responses.len(),
            judge_responses.len()
        )));
    }
    requests
        .iter()
        .zip(responses)
        .zip(judge_responses)
        .map(|((req, resp), judge)| ReportRecord::build(mode, req, resp, judge, rules))
        .collect()
}

pub async fn write_report(path: &Path, mode: EvalMode, records: &[ReportRecord]) -> Result<(), EvalError> {
    let mut out = tsv_header(mode);
    out.push('\n');
    for record in records {
        out.push_str(&record.to_tsv_row());
        out.push('\n');
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, out).await?;
    tracing::debug!("Wrote {} report rows to {}", records.len(), path.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub unresolved: usize,
}

impl ReportSummary {
    pub fn from_records(records: &[ReportRecord]) -> Self {
        records.iter().fold(Self::default(), |mut s, r| {
            s.total += 1;
            match r.verdict {
                Verdict::Pass => s.passed += 1,
                Verdict::Fail => s.failed += 1,
                Verdict::Unresolved(_) => s.unresolved += 1,
            }
            s
        })
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} passed ({:.1}%), {} failed, {} unresolved",
            self.passed,
            self.total,
            self.accuracy() * 100.0,
            self.failed,
            self.unresolved
        )
    }
}
