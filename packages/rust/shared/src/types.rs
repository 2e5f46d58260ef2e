//! Core domain types shared by the dataset, snapshot, and joiner crates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NeurotopicsError;

/// Current version of the snapshot extraction schema.
pub const EXTRACTION_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// StudyId
// ---------------------------------------------------------------------------

/// Identifier of one study-experiment pair: `<paper-id>-<experiment-index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudyId(String);

impl StudyId {
    /// Build an identifier from its paper id and experiment index.
    pub fn new(paper_id: impl fmt::Display, experiment: impl fmt::Display) -> Self {
        Self(format!("{paper_id}-{experiment}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StudyId {
    type Err = NeurotopicsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.rsplit_once('-') {
            Some((paper, exp)) if !paper.is_empty() && !exp.is_empty() => Ok(Self(s.to_string())),
            _ => Err(NeurotopicsError::parse(format!(
                "study id '{s}' is not of the form <paper-id>-<experiment-index>"
            ))),
        }
    }
}

/// Raw weights scraped for one topic, keyed by study id.
///
/// Values are kept as the text found in the document; conversion to a number
/// happens when the annotation column is built.
pub type ScrapedWeights = HashMap<StudyId, String>;

// ---------------------------------------------------------------------------
// Annotation labels
// ---------------------------------------------------------------------------

/// Label of a topic annotation column, e.g. `Neurosynth_v5topic200__topic007`.
pub fn topic_label(source_prefix: &str, topic_set: &str, topic: usize) -> String {
    format!("{source_prefix}_{topic_set}__topic{topic:03}")
}

/// Label of a term-frequency feature column, e.g. `Neurosynth_TFIDF__memory`.
pub fn feature_label(source_prefix: &str, term: &str) -> String {
    format!("{source_prefix}_TFIDF__{term}")
}

// ---------------------------------------------------------------------------
// ExtractionSchema
// ---------------------------------------------------------------------------

/// Where the data lives inside a saved topic or summary page.
///
/// Selectors are CSS selectors understood by `scraper`. The defaults describe
/// the Neurosynth topic pages; bump `version` whenever the layout changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    /// Schema version for forward compatibility.
    #[serde(default = "default_schema_version")]
    pub version: u32,

    /// Body of the studies table on a topic page.
    #[serde(default = "default_study_table")]
    pub study_table: String,

    /// Study links inside `study_table`. The href carries the paper id.
    #[serde(default = "default_study_link")]
    pub study_link: String,

    /// Weight cells inside `study_table`, paired with links by position.
    #[serde(default = "default_study_weight")]
    pub study_weight: String,

    /// Container of the topic listing on a summary page.
    #[serde(default = "default_summary_table")]
    pub summary_table: String,

    /// Cells inside `summary_table`.
    #[serde(default = "default_summary_cell")]
    pub summary_cell: String,

    /// Number of cells per topic row on a summary page.
    #[serde(default = "default_summary_columns")]
    pub summary_columns: usize,

    /// Zero-based index of the study count cell within a row.
    #[serde(default = "default_summary_count_column")]
    pub summary_count_column: usize,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            study_table: default_study_table(),
            study_link: default_study_link(),
            study_weight: default_study_weight(),
            summary_table: default_summary_table(),
            summary_cell: default_summary_cell(),
            summary_columns: default_summary_columns(),
            summary_count_column: default_summary_count_column(),
        }
    }
}

fn default_schema_version() -> u32 {
    EXTRACTION_SCHEMA_VERSION
}
fn default_study_table() -> String {
    "div.row div.row div.col-md-10.content div.tab-content div#studies table tbody".into()
}
fn default_study_link() -> String {
    "a".into()
}
fn default_study_weight() -> String {
    "td.sorting_1".into()
}
fn default_summary_table() -> String {
    "div.row div.col-md-12.content".into()
}
fn default_summary_cell() -> String {
    "td".into()
}
fn default_summary_columns() -> usize {
    3
}
fn default_summary_count_column() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_id_format() {
        let id = StudyId::new("10022492", 1);
        assert_eq!(id.as_str(), "10022492-1");
        assert_eq!(id.to_string(), "10022492-1");
    }

    #[test]
    fn study_id_from_str() {
        let id: StudyId = "11-1".parse().expect("parse StudyId");
        assert_eq!(id, StudyId::new("11", "1"));

        assert!("11".parse::<StudyId>().is_err());
        assert!("-1".parse::<StudyId>().is_err());
        assert!("11-".parse::<StudyId>().is_err());
    }

    #[test]
    fn study_id_serializes_as_string() {
        let id = StudyId::new("12", "1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"12-1\"");
    }

    #[test]
    fn labels_are_zero_padded() {
        assert_eq!(
            topic_label("Neurosynth", "v5topic200", 7),
            "Neurosynth_v5topic200__topic007"
        );
        assert_eq!(
            topic_label("Neurosynth", "v5topic200", 199),
            "Neurosynth_v5topic200__topic199"
        );
        assert_eq!(feature_label("Neurosynth", "memory"), "Neurosynth_TFIDF__memory");
    }

    #[test]
    fn schema_defaults_fill_missing_fields() {
        let schema: ExtractionSchema =
            toml::from_str("study_weight = \"td.weight\"").expect("parse schema");
        assert_eq!(schema.version, EXTRACTION_SCHEMA_VERSION);
        assert_eq!(schema.study_weight, "td.weight");
        assert_eq!(schema.summary_columns, 3);
        assert_eq!(schema.summary_count_column, 2);
    }
}
