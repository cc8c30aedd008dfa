// src/core/types.rs — Run options, progress events and outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::provider::Response;

/// What the orchestrator does when an executor call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Write a sentinel error response in the request's slot and keep going.
    #[default]
    Isolate,
    /// Stop the run. Concurrent groups are discarded as a whole.
    Abort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Isolate => write!(f, "isolate"),
            FailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isolate" => Ok(FailurePolicy::Isolate),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!(
                "unknown failure policy '{other}' (expected isolate or abort)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Sequential,
    Concurrent,
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Sequential => write!(f, "sequential"),
            Concurrency::Concurrent => write!(f, "concurrent"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Truncate the cache and start from the first request.
    pub reset: bool,
    /// Process only the request at the resume offset.
    pub sample: bool,
    pub batch_size: usize,
    /// Issue a group's calls concurrently. Ignored when `batch_size <= 1`.
    pub use_async: bool,
    pub failure_policy: FailurePolicy,
    pub call_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            reset: false,
            sample: false,
            batch_size: 1,
            use_async: false,
            failure_policy: FailurePolicy::Isolate,
            call_timeout: None,
        }
    }
}

impl RunOptions {
    pub fn concurrency(&self) -> Concurrency {
        if self.use_async && self.batch_size > 1 {
            Concurrency::Concurrent
        } else {
            Concurrency::Sequential
        }
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Real-time progress events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStart {
        label: String,
        total: usize,
        resume_offset: usize,
        batch_size: usize,
        concurrency: Concurrency,
    },
    AlreadyComplete {
        label: String,
        total: usize,
    },
    BatchDone {
        done: usize,
        total: usize,
    },
    RequestFailed {
        serial_num: u64,
        message: String,
    },
    Complete {
        label: String,
        fetched: usize,
        failures: usize,
    },
}

/// A request whose executor call failed under [`FailurePolicy::Isolate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub serial_num: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Cached plus fresh responses in request order, or only the fresh slice in sample mode.
    pub responses: Vec<Response>,
    /// Number of executor calls that produced a cache line in this run.
    pub fetched: usize,
    pub failures: Vec<FailureRecord>,
}

/// The response written in place of a failed call.
pub fn error_response(serial_num: u64, message: &str) -> Response {
    serde_json::json!({
        "error": {
            "serial_num": serial_num,
            "message": message,
        }
    })
}

/// Recover the failure carried by a sentinel error response, if it is one.
pub fn as_failure(response: &Response) -> Option<FailureRecord> {
    let error = response.get("error")?;
    Some(FailureRecord {
        serial_num: error.get("serial_num")?.as_u64()?,
        message: error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string(),
    })
}
