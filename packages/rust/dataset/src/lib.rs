//! The canonical study dataset: ids, coordinates, metadata, and annotations.
//!
//! A [`Dataset`] is built from the Neurosynth text files by [`convert_neurosynth`]
//! and persisted as a single JSON document. Its id order is the row order of
//! every annotation column.

mod annotations;
mod convert;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use neurotopics_shared::{NeurotopicsError, Result, StudyId};

pub use annotations::AnnotationTable;
pub use convert::{convert_neurosynth, parse_database, parse_features};

/// Current schema version for the persisted dataset format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Bibliographic metadata for one study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub id: StudyId,
    pub title: String,
    pub authors: String,
    pub journal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// A single reported activation peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub id: StudyId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Stereotactic space as reported by the source (e.g. `MNI`, `TAL`).
    pub space: String,
}

/// The canonical dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Name of the corpus the dataset was converted from.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Canonical study order. Unique and sorted.
    ids: Vec<StudyId>,
    /// Metadata, one entry per id, in id order.
    pub metadata: Vec<StudyMetadata>,
    /// All coordinates, grouped by study in id order.
    pub coordinates: Vec<Coordinate>,
    /// Annotation columns aligned to `ids`.
    pub annotations: AnnotationTable,
}

impl Dataset {
    /// Create a dataset over the given studies. Ids are sorted and must be unique.
    pub fn new(
        source: impl Into<String>,
        mut metadata: Vec<StudyMetadata>,
        coordinates: Vec<Coordinate>,
    ) -> Result<Self> {
        metadata.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = metadata.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(NeurotopicsError::validation(format!(
                "duplicate study id {}",
                pair[0].id
            )));
        }

        let ids: Vec<StudyId> = metadata.iter().map(|m| m.id.clone()).collect();
        let now = Utc::now();

        Ok(Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            source: source.into(),
            created_at: now,
            updated_at: now,
            annotations: AnnotationTable::new(ids.len()),
            ids,
            metadata,
            coordinates,
        })
    }

    /// The canonical identifier sequence.
    pub fn ids(&self) -> &[StudyId] {
        &self.ids
    }

    /// Number of studies (N).
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Position of a study in the canonical order.
    pub fn position(&self, id: &StudyId) -> Option<usize> {
        self.ids.binary_search(id).ok()
    }

    /// Add or replace an annotation column. Fails if its length is not N.
    pub fn annotate(&mut self, label: impl Into<String>, column: Vec<f64>) -> Result<()> {
        self.annotations.insert(label, column)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Write the dataset as pretty JSON, atomically (temp file, then rename).
    #[instrument(skip(self), fields(path = %path.display(), studies = self.len()))]
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| NeurotopicsError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| {
            NeurotopicsError::validation(format!("JSON serialization failed: {e}"))
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp = path.with_file_name(format!(".{name}.tmp"));

        std::fs::write(&temp, json).map_err(|e| NeurotopicsError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| NeurotopicsError::io(path, e))?;

        info!(annotations = self.annotations.len(), "dataset saved");
        Ok(())
    }

    /// Read a dataset written by [`Dataset::save`] and check its invariants.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NeurotopicsError::io(path, e))?;
        let dataset: Dataset = serde_json::from_str(&content).map_err(|e| {
            NeurotopicsError::validation(format!("invalid dataset {}: {e}", path.display()))
        })?;

        dataset.validate()?;
        debug!(path = %path.display(), studies = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    /// Verify that a deserialized dataset is well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(NeurotopicsError::validation(format!(
                "unsupported schema_version: {} (expected {})",
                self.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }

        if self.ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(NeurotopicsError::validation(
                "study ids must be unique and sorted",
            ));
        }

        if self.metadata.len() != self.ids.len() {
            return Err(NeurotopicsError::validation(format!(
                "{} metadata rows for {} studies",
                self.metadata.len(),
                self.ids.len()
            )));
        }

        if let Some((row, (m, id))) = self
            .metadata
            .iter()
            .zip(&self.ids)
            .enumerate()
            .find(|(_, (m, id))| m.id != **id)
        {
            return Err(NeurotopicsError::validation(format!(
                "metadata row {row} is for study {}, expected {id}",
                m.id
            )));
        }

        self.annotations.validate(self.ids.len())
    }
}
