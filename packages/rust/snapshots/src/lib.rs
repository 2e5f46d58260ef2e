//! Document source: reads hand-saved topic snapshots from disk.
//!
//! This crate provides:
//! - [`DocumentSource`] — what the annotation sweep needs from the documents
//! - [`SnapshotSource`] — reads saved HTML pages using an [`ExtractionSchema`]
//! - [`StaticSource`] — in-memory source for tests and programmatic use
//!
//! [`ExtractionSchema`]: neurotopics_shared::ExtractionSchema

mod extract;
mod files;

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, instrument};

use neurotopics_shared::{NeurotopicsError, Result, ScrapedWeights, TopicConfig};

pub use extract::{CompiledSchema, extract_summary_counts, extract_topic_page, paper_id_from_href};
pub use files::SnapshotLayout;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Supplies scraped weights and expected study counts per topic.
pub trait DocumentSource {
    /// Expected study count of every topic, indexed by topic.
    ///
    /// The outer error fails the whole source; an inner error only concerns
    /// the topic at that index.
    fn expected_counts(&self) -> Result<Vec<Result<usize>>>;

    /// Scraped `(study id → weight text)` map of one topic.
    fn scraped_weights(&self, topic: usize) -> Result<ScrapedWeights>;

    /// Human-readable source name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// SnapshotSource
// ---------------------------------------------------------------------------

/// Reads saved topic and summary pages of one topic set.
pub struct SnapshotSource {
    layout: SnapshotLayout,
    schema: CompiledSchema,
    experiment: String,
}

impl SnapshotSource {
    /// Source over `dir`, which holds the pages of `config.topic_set`.
    pub fn new(dir: impl Into<PathBuf>, config: &TopicConfig) -> Result<Self> {
        Ok(Self {
            layout: SnapshotLayout::new(dir, &config.source_prefix, &config.topic_set)?,
            schema: CompiledSchema::compile(&config.schema)?,
            experiment: config.experiment_index.clone(),
        })
    }
}

impl DocumentSource for SnapshotSource {
    #[instrument(skip(self), fields(dir = %self.layout.dir().display()))]
    fn expected_counts(&self) -> Result<Vec<Result<usize>>> {
        let mut counts = Vec::new();
        for page in self.layout.summary_pages()? {
            let html = read_page(&page)?;
            let page_counts =
                extract_summary_counts(&html, &self.schema, &page.display().to_string())?;
            debug!(page = %page.display(), topics = page_counts.len(), "summary page read");
            counts.extend(page_counts);
        }
        Ok(counts)
    }

    fn scraped_weights(&self, topic: usize) -> Result<ScrapedWeights> {
        let mut weights = ScrapedWeights::new();
        for page in self.layout.topic_pages(topic)? {
            let html = read_page(&page)?;
            let pairs = extract_topic_page(
                &html,
                &self.schema,
                &self.experiment,
                &page.display().to_string(),
            )?;

            for (id, weight) in pairs {
                // Last write wins; earlier values are only logged.
                if let Some(previous) = weights.insert(id.clone(), weight.clone()) {
                    if previous != weight {
                        debug!(topic, %id, %previous, current = %weight, "duplicate study weight");
                    }
                }
            }
        }
        Ok(weights)
    }

    fn name(&self) -> &str {
        "snapshots"
    }
}

fn read_page(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| NeurotopicsError::io(path, e))
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// Document source backed by in-memory maps.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    counts: Vec<usize>,
    unreadable: HashMap<usize, String>,
    weights: HashMap<usize, ScrapedWeights>,
}

impl StaticSource {
    pub fn new(counts: Vec<usize>) -> Self {
        Self {
            counts,
            unreadable: HashMap::new(),
            weights: HashMap::new(),
        }
    }

    /// Report the count of `topic` as the unparseable cell text `text`.
    pub fn with_unreadable_count(mut self, topic: usize, text: impl Into<String>) -> Self {
        self.unreadable.insert(topic, text.into());
        self
    }

    /// Set the scraped weights of one topic.
    pub fn with_topic(mut self, topic: usize, weights: ScrapedWeights) -> Self {
        self.weights.insert(topic, weights);
        self
    }
}

impl DocumentSource for StaticSource {
    fn expected_counts(&self) -> Result<Vec<Result<usize>>> {
        Ok(self
            .counts
            .iter()
            .enumerate()
            .map(|(topic, count)| match self.unreadable.get(&topic) {
                Some(text) => Err(NeurotopicsError::parse(format!(
                    "topic {topic}: study count '{text}' is not numeric"
                ))),
                None => Ok(*count),
            })
            .collect())
    }

    fn scraped_weights(&self, topic: usize) -> Result<ScrapedWeights> {
        Ok(self.weights.get(&topic).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "static"
    }
}
