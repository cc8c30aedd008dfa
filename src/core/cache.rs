// src/core/cache.rs — Append-only JSONL response cache
//
// One response per line, in request order. The number of lines is the resume
// offset, so a partially written run picks up where it stopped.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::infra::errors::EvalError;
use crate::provider::Response;

/// Whether a usable cache exists at `path`.
///
/// A zero-byte file is left behind when a run dies before its first write. It
/// is treated as absent and removed.
pub fn exists(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == 0 => {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Could not remove empty cache {}: {}", path.display(), e);
            } else {
                tracing::debug!("Removed empty cache {}", path.display());
            }
            false
        }
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}

/// Load every cached response. Any unparseable line is fatal.
pub fn load(path: &Path) -> Result<Vec<Response>, EvalError> {
    let content = std::fs::read_to_string(path)?;
    let mut responses = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|source| EvalError::MalformedCacheEntry {
            path: path.to_path_buf(),
            line: idx + 1,
            content: line.to_string(),
            source,
        })?;
        responses.push(value);
    }
    Ok(responses)
}

/// Number of responses already cached (0 when the cache is absent).
///
/// A result equal to `expected_count` means the run is already complete.
pub fn resume_offset(path: &Path, expected_count: usize) -> Result<usize, EvalError> {
    if !exists(path) {
        return Ok(0);
    }
    let cached = load(path)?.len();
    check_len(path, cached, expected_count)?;
    Ok(cached)
}

/// A cache never holds more responses than there are requests.
pub fn check_len(path: &Path, cached: usize, expected_count: usize) -> Result<(), EvalError> {
    if cached > expected_count {
        return Err(EvalError::Other(anyhow::anyhow!(
            "cache {} holds {} responses but there are only {} requests",
            path.display(),
            cached,
            expected_count
        )));
    }
    Ok(())
}

/// Single writer for a cache file. Every line is flushed as soon as it is written.
pub struct CacheWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl CacheWriter {
    /// Open for appending, or truncate first when `reset` is set.
    pub async fn open(path: &Path, reset: bool) -> Result<Self, EvalError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if reset {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub async fn append(&mut self, response: &Response) -> Result<(), EvalError> {
        let mut line = serde_json::to_string(response)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
