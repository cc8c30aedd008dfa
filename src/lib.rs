// src/lib.rs — Library root for funcchat-eval

pub mod cli;
pub mod core;
pub mod evaluator;
pub mod infra;
pub mod provider;
