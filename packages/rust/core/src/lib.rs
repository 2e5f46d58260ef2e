//! Topic annotation logic and pipeline orchestration for neurotopics.
//!
//! This crate ties together corpus fetching, dataset conversion, and snapshot
//! extraction into end-to-end workflows (e.g., `run_all`).

pub mod joiner;
pub mod pipeline;

pub use joiner::{ColumnOutcome, MismatchWarning, build_annotation_column};
pub use pipeline::{
    ANNOTATED_DATASET_FILE, AnnotateConfig, AnnotateResult, DATASET_FILE, OnParseError,
    ProgressReporter, RunConfig, RunResult, SilentProgress, SkippedTopic, annotate_dataset,
    run_all,
};
