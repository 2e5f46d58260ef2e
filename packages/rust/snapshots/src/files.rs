//! Snapshot file naming and discovery.
//!
//! Snapshots follow a fixed naming convention inside one directory per topic set:
//! - topic pages: `<prefix>_<topicset>_topic<NNN>_<NN>.htm`
//! - summary pages: `<prefix>_<topicset>_<NN>_topics.htm`
//!
//! Pages of one kind are always processed in file-name order.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use neurotopics_shared::{NeurotopicsError, Result};

/// Locates the saved pages of one topic set.
#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    dir: PathBuf,
    topic_re: Regex,
    summary_re: Regex,
}

impl SnapshotLayout {
    /// Layout for files named `<prefix>_<topic_set>_...` inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, topic_set: &str) -> Result<Self> {
        let stem = format!("{}_{}", regex::escape(prefix), regex::escape(topic_set));

        let topic_re = Regex::new(&format!(r"^{stem}_topic(\d+)_(\d+)\.html?$"))
            .map_err(|e| NeurotopicsError::config(format!("invalid snapshot prefix: {e}")))?;
        let summary_re = Regex::new(&format!(r"^{stem}_(\d+)_topics\.html?$"))
            .map_err(|e| NeurotopicsError::config(format!("invalid snapshot prefix: {e}")))?;

        Ok(Self {
            dir: dir.into(),
            topic_re,
            summary_re,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All saved result pages of `topic`, sorted by name. May be empty.
    ///
    /// The topic number must appear zero-padded to three digits, exactly as
    /// the page names are written (`topic007`, not `topic7` or `topic0007`).
    pub fn topic_pages(&self, topic: usize) -> Result<Vec<PathBuf>> {
        let wanted = format!("{topic:03}");
        let pages = self.matching(|name| {
            self.topic_re
                .captures(name)
                .is_some_and(|caps| caps[1] == *wanted)
        })?;
        debug!(topic, pages = pages.len(), "topic pages found");
        Ok(pages)
    }

    /// All saved summary pages, sorted by name.
    pub fn summary_pages(&self) -> Result<Vec<PathBuf>> {
        self.matching(|name| self.summary_re.is_match(name))
    }

    fn matching(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| NeurotopicsError::io(&self.dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| NeurotopicsError::io(&self.dir, e))?;
            let name = entry.file_name();
            if keep(&name.to_string_lossy()) {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }
}
