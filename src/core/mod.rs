// src/core/mod.rs — Response orchestration over a resumable cache

pub mod cache;
pub mod orchestrator;
pub mod types;
