// src/core/orchestrator.rs — Drives an executor over a request list against a resumable cache

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::cache::{self, CacheWriter};
use super::types::*;
use crate::infra::errors::EvalError;
use crate::provider::{Executor, Request, Response};

/// Turns an ordered request list into an ordered response list.
///
/// Responses are appended to the cache file as they are produced, always in
/// request order, so an interrupted run resumes at the number of lines written.
/// The orchestrator only depends on [`Executor`], never on provider details.
pub struct Orchestrator {
    executor: Arc<dyn Executor>,
    options: RunOptions,
    /// Shown in progress output ("model", "judge", ...).
    label: String,
    on_progress: Option<Box<dyn Fn(ProgressEvent) + Send>>,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn Executor>, options: RunOptions) -> Self {
        let label = executor.id().to_string();
        Self {
            executor,
            options,
            label,
            on_progress: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Produce one response per request, reusing what `cache_path` already holds.
    ///
    /// Returns cached plus fresh responses in request order. In sample mode
    /// only the single freshly produced response is returned.
    pub async fn run(&self, requests: &[Request], cache_path: &Path) -> Result<RunOutcome, EvalError> {
        let total = requests.len();

        let cached = if !self.options.reset && cache::exists(cache_path) {
            cache::load(cache_path)?
        } else {
            Vec::new()
        };
        let offset = cached.len();
        cache::check_len(cache_path, offset, total)?;

        if offset == total && !self.options.reset {
            tracing::info!("{}: all {} responses already cached", self.label, total);
            self.emit(ProgressEvent::AlreadyComplete {
                label: self.label.clone(),
                total,
            });
            let responses = if self.options.sample { Vec::new() } else { cached };
            return Ok(RunOutcome {
                responses,
                fetched: 0,
                failures: Vec::new(),
            });
        }

        let batch_size = self.options.effective_batch_size();
        let concurrency = self.options.concurrency();
        tracing::info!(
            label = self.label.as_str(),
            resume_offset = offset,
            batch_size,
            %concurrency,
            "Starting run over {} requests",
            total
        );
        self.emit(ProgressEvent::RunStart {
            label: self.label.clone(),
            total,
            resume_offset: offset,
            batch_size,
            concurrency,
        });

        let end = if self.options.sample {
            (offset + 1).min(total)
        } else {
            total
        };
        let pending = &requests[offset..end];

        let mut writer = CacheWriter::open(cache_path, self.options.reset).await?;
        let mut fresh: Vec<Response> = Vec::with_capacity(pending.len());
        let mut failures: Vec<FailureRecord> = Vec::new();

        for group in pending.chunks(batch_size) {
            match concurrency {
                Concurrency::Concurrent if group.len() > 1 => {
                    self.run_concurrent(group, &mut writer, &mut fresh, &mut failures)
                        .await?
                }
                _ => {
                    self.run_sequential(group, &mut writer, &mut fresh, &mut failures)
                        .await?
                }
            }
            self.emit(ProgressEvent::BatchDone {
                done: offset + fresh.len(),
                total,
            });
        }

        tracing::info!(
            "{}: fetched {} responses ({} failed) into {}",
            self.label,
            fresh.len(),
            failures.len(),
            writer.path().display()
        );
        self.emit(ProgressEvent::Complete {
            label: self.label.clone(),
            fetched: fresh.len(),
            failures: failures.len(),
        });

        let fetched = fresh.len();
        let responses = if self.options.sample {
            fresh
        } else {
            let mut all = cached;
            all.extend(fresh);
            all
        };
        Ok(RunOutcome {
            responses,
            fetched,
            failures,
        })
    }

    /// One call at a time; each response is written before the next call starts.
    async fn run_sequential(
        &self,
        group: &[Request],
        writer: &mut CacheWriter,
        fresh: &mut Vec<Response>,
        failures: &mut Vec<FailureRecord>,
    ) -> Result<(), EvalError> {
        for request in group {
            let result = call_executor(self.executor.as_ref(), request, self.options.call_timeout).await;
            let response = self.settle(request, result, failures)?;
            writer.append(&response).await?;
            fresh.push(response);
        }
        Ok(())
    }

    /// All calls of the group in flight at once. Results are collected by index
    /// and written in request order once the whole group has finished.
    async fn run_concurrent(
        &self,
        group: &[Request],
        writer: &mut CacheWriter,
        fresh: &mut Vec<Response>,
        failures: &mut Vec<FailureRecord>,
    ) -> Result<(), EvalError> {
        let mut join_set = JoinSet::new();
        let mut task_slots: HashMap<tokio::task::Id, usize> = HashMap::with_capacity(group.len());
        for (idx, request) in group.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let request = request.clone();
            let limit = self.options.call_timeout;
            let handle = join_set.spawn(async move {
                let result = call_executor(executor.as_ref(), &request, limit).await;
                (idx, result)
            });
            task_slots.insert(handle.id(), idx);
        }

        let mut slots: Vec<Option<Result<Response, EvalError>>> =
            (0..group.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (idx, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!("Executor task did not complete: {}", e);
                    let Some(&idx) = task_slots.get(&e.id()) else {
                        continue;
                    };
                    let failed = Err(EvalError::Other(anyhow::anyhow!(
                        "executor task for request {} did not complete: {}",
                        group[idx].serial_num,
                        e
                    )));
                    (idx, failed)
                }
            };
            // Abort drops the whole group: nothing of it reaches the cache.
            if self.options.failure_policy == FailurePolicy::Abort {
                if let Err(e) = &result {
                    join_set.abort_all();
                    return Err(EvalError::BatchAborted {
                        serial_num: group[idx].serial_num,
                        message: e.to_string(),
                    });
                }
            }
            slots[idx] = Some(result);
        }

        // Every slot must be settled before anything of the group is written.
        if self.options.failure_policy == FailurePolicy::Abort {
            if let Some(idx) = slots.iter().position(Option::is_none) {
                return Err(EvalError::BatchAborted {
                    serial_num: group[idx].serial_num,
                    message: "executor task did not complete".into(),
                });
            }
        }

        for (request, slot) in group.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| {
                Err(EvalError::Other(anyhow::anyhow!(
                    "executor task for request {} did not complete",
                    request.serial_num
                )))
            });
            let response = self.settle(request, result, failures)?;
            writer.append(&response).await?;
            fresh.push(response);
        }
        Ok(())
    }

    /// Apply the failure policy to one call result.
    fn settle(
        &self,
        request: &Request,
        result: Result<Response, EvalError>,
        failures: &mut Vec<FailureRecord>,
    ) -> Result<Response, EvalError> {
        match result {
            Ok(response) => Ok(response),
            Err(e) => match self.options.failure_policy {
                FailurePolicy::Abort => Err(EvalError::BatchAborted {
                    serial_num: request.serial_num,
                    message: e.to_string(),
                }),
                FailurePolicy::Isolate => {
                    let message = e.to_string();
                    tracing::warn!(
                        serial_num = request.serial_num,
                        retriable = e.is_retriable(),
                        "{}: request failed: {}",
                        self.label,
                        message
                    );
                    self.emit(ProgressEvent::RequestFailed {
                        serial_num: request.serial_num,
                        message: message.clone(),
                    });
                    failures.push(FailureRecord {
                        serial_num: request.serial_num,
                        message: message.clone(),
                    });
                    Ok(error_response(request.serial_num, &message))
                }
            },
        }
    }
}

async fn call_executor(
    executor: &dyn Executor,
    request: &Request,
    limit: Option<Duration>,
) -> Result<Response, EvalError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, executor.predict(request))
            .await
            .map_err(|_| EvalError::Timeout {
                serial_num: request.serial_num,
                after_ms: limit.as_millis() as u64,
            })?,
        None => executor.predict(request).await,
    }
}
