// src/evaluator/mod.rs — Judge prompting, verdict extraction and reporting

pub mod judge;
pub mod report;
pub mod verdict;
