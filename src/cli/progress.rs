// src/cli/progress.rs — Terminal progress renderer for evaluation runs

use crate::core::types::ProgressEvent;

/// Render one event as a single line.
pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::RunStart {
            label,
            total,
            resume_offset,
            batch_size,
            concurrency,
        } => format!(
            "[{}] start index {} of {} | batch size {} ({})",
            label, resume_offset, total, batch_size, concurrency,
        ),
        ProgressEvent::AlreadyComplete { label, total } => {
            format!("[{}] all {} responses already cached", label, total)
        }
        ProgressEvent::BatchDone { done, total } => {
            let pct = if *total == 0 {
                100.0
            } else {
                *done as f64 * 100.0 / *total as f64
            };
            format!("  {}/{} ({:.0}%)", done, total, pct)
        }
        ProgressEvent::RequestFailed {
            serial_num,
            message,
        } => format!("  ! request {} failed: {}", serial_num, message),
        ProgressEvent::Complete {
            label,
            fetched,
            failures,
        } => format!(
            "[{}] done: {} fetched, {} failed",
            label, fetched, failures
        ),
    }
}

/// Build a progress callback that writes to stderr, keeping stdout for the summary.
/// Returns a closure suitable for `Orchestrator::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + 'static {
    move |event| eprintln!("{}", format_event(&event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Concurrency;
    use std::sync::{Arc, Mutex};

    /// Captures formatted lines instead of writing to stderr.
    fn capturing_progress() -> (
        impl Fn(ProgressEvent) + Send + 'static,
        Arc<Mutex<Vec<String>>>,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let cb = move |event: ProgressEvent| {
            log_clone.lock().unwrap().push(format_event(&event));
        };
        (cb, log)
    }

    #[test]
    fn test_run_start_format() {
        let line = format_event(&ProgressEvent::RunStart {
            label: "model".into(),
            total: 120,
            resume_offset: 40,
            batch_size: 8,
            concurrency: Concurrency::Concurrent,
        });
        assert_eq!(line, "[model] start index 40 of 120 | batch size 8 (concurrent)");
    }

    #[test]
    fn test_batch_done_percentage() {
        let line = format_event(&ProgressEvent::BatchDone { done: 1, total: 4 });
        assert_eq!(line, "  1/4 (25%)");
    }

    #[test]
    fn test_batch_done_empty_total() {
        let line = format_event(&ProgressEvent::BatchDone { done: 0, total: 0 });
        assert!(line.contains("100%"));
    }

    #[test]
    fn test_request_failed_format() {
        let line = format_event(&ProgressEvent::RequestFailed {
            serial_num: 9,
            message: "HTTP 429".into(),
        });
        assert_eq!(line, "  ! request 9 failed: HTTP 429");
    }

    #[test]
    fn test_full_lifecycle_sequence() {
        let (cb, log) = capturing_progress();
        cb(ProgressEvent::RunStart {
            label: "judge".into(),
            total: 2,
            resume_offset: 0,
            batch_size: 1,
            concurrency: Concurrency::Sequential,
        });
        cb(ProgressEvent::BatchDone { done: 1, total: 2 });
        cb(ProgressEvent::RequestFailed {
            serial_num: 1,
            message: "timeout".into(),
        });
        cb(ProgressEvent::BatchDone { done: 2, total: 2 });
        cb(ProgressEvent::Complete {
            label: "judge".into(),
            fetched: 2,
            failures: 1,
        });

        let msgs = log.lock().unwrap();
        assert_eq!(msgs.len(), 5);
        assert!(msgs[0].starts_with("[judge] start index 0"));
        assert!(msgs[0].contains("sequential"));
        assert!(msgs[2].contains("request 1 failed"));
        assert_eq!(msgs[4], "[judge] done: 2 fetched, 1 failed");
    }
}
