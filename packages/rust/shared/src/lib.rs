//! Shared types, error model, and configuration for neurotopics.
//!
//! This crate is the foundation depended on by all other neurotopics crates.
//! It provides:
//! - [`NeurotopicsError`] — the unified error type
//! - Domain types ([`StudyId`], [`ScrapedWeights`], [`ExtractionSchema`])
//! - Configuration ([`AppConfig`], [`TopicConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, SourceConfig, TopicConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_archive_url,
};
pub use error::{NeurotopicsError, Result};
pub use types::{
    EXTRACTION_SCHEMA_VERSION, ExtractionSchema, ScrapedWeights, StudyId, feature_label,
    topic_label,
};
