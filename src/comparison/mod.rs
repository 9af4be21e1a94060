pub mod engine;
pub mod run;

pub use engine::{median, select_comparables, ComparisonEngine};
pub use run::{log_summary, run, RunSummary};
