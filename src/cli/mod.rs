// src/cli/mod.rs — CLI definition (clap derive)

pub mod evaluate;
pub mod progress;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::core::types::{FailurePolicy, RunOptions};
use crate::evaluator::report::EvalMode;
use crate::infra::config::{Config, ProviderKind};

#[derive(Parser)]
#[command(
    name = "funcchat-eval",
    about = "Evaluate LLM function calling against a golden set, graded by a judge model",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = "funcchat-eval.toml")]
    pub config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress progress output (only print the summary)
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a custom golden set; outputs are named after the input file
    Common {
        #[command(flatten)]
        args: EvalArgs,
    },
    /// Evaluate the multi-turn dialog set
    Dialog {
        #[command(flatten)]
        args: EvalArgs,
    },
    /// Evaluate the single-call set with a given tool catalog variant
    Singlecall {
        #[command(flatten)]
        args: EvalArgs,

        /// Tool catalog variant presented to the model
        #[arg(
            long,
            alias = "tools_type",
            value_parser = ["exact", "4_random", "4_close", "8_random", "8_close"]
        )]
        tools_type: String,
    },
}

impl Commands {
    pub fn mode(&self) -> EvalMode {
        match self {
            Commands::Common { .. } => EvalMode::Common,
            Commands::Dialog { .. } => EvalMode::Dialog,
            Commands::Singlecall { .. } => EvalMode::SingleCall,
        }
    }

    pub fn args(&self) -> &EvalArgs {
        match self {
            Commands::Common { args } | Commands::Dialog { args } | Commands::Singlecall { args, .. } => args,
        }
    }

    pub fn tools_type(&self) -> Option<&str> {
        match self {
            Commands::Singlecall { tools_type, .. } => Some(tools_type),
            _ => None,
        }
    }
}

/// Flags shared by every evaluation mode. Unset flags fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct EvalArgs {
    /// Model under test
    #[arg(long)]
    pub model: Option<String>,

    /// Pre-built request list (JSONL, one request per line)
    #[arg(long, alias = "input_path")]
    pub input_path: PathBuf,

    /// Discard cached responses and start over
    #[arg(long)]
    pub reset: bool,

    /// Run only the next uncached case
    #[arg(long)]
    pub sample: bool,

    #[arg(long, alias = "batch_size")]
    pub batch_size: Option<usize>,

    /// Issue the calls of a batch concurrently
    #[arg(long, alias = "use_async")]
    pub use_async: bool,

    /// isolate | abort
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    /// Per-call timeout in seconds
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// openai | inhouse | azure | gemini | bedrock
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    #[arg(long, alias = "api_key")]
    pub api_key: Option<String>,

    #[arg(long, alias = "base_url")]
    pub base_url: Option<String>,

    /// Checkpoint path sent to in-house servers
    #[arg(long, alias = "model_path")]
    pub model_path: Option<String>,

    /// Judge provider
    #[arg(long, alias = "judge_type")]
    pub judge_type: Option<ProviderKind>,

    #[arg(long)]
    pub judge_model: Option<String>,

    #[arg(long, alias = "judge_api_key")]
    pub judge_api_key: Option<String>,
}

impl EvalArgs {
    /// Layer the command-line flags over the loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        let model = &mut config.model;
        if let Some(ref v) = self.model {
            model.model = v.clone();
        }
        if let Some(v) = self.provider {
            model.provider = v;
        }
        if let Some(ref v) = self.api_key {
            model.api_key = v.clone();
        }
        if let Some(ref v) = self.base_url {
            model.base_url = v.clone();
        }
        if self.model_path.is_some() {
            model.model_path = self.model_path.clone();
        }

        let judge = &mut config.judge;
        if let Some(v) = self.judge_type {
            judge.provider = v;
        }
        if let Some(ref v) = self.judge_model {
            judge.model = v.clone();
        }
        if let Some(ref v) = self.judge_api_key {
            judge.api_key = v.clone();
        }

        let run = &mut config.run;
        if let Some(v) = self.batch_size {
            run.batch_size = v;
        }
        if self.use_async {
            run.use_async = true;
        }
        if let Some(v) = self.failure_policy {
            run.failure_policy = v;
        }
        if self.call_timeout_secs.is_some() {
            run.call_timeout_secs = self.call_timeout_secs;
        }
        if let Some(ref v) = self.output_dir {
            run.output_dir = v.clone();
        }
    }

    pub fn run_options(&self, config: &Config) -> RunOptions {
        RunOptions {
            reset: self.reset,
            sample: self.sample,
            batch_size: config.run.batch_size,
            use_async: config.run.use_async,
            failure_policy: config.run.failure_policy,
            call_timeout: config.run.call_timeout_secs.map(Duration::from_secs),
        }
    }
}
