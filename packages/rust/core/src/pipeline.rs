//! Annotation sweep and the end-to-end `run` pipeline:
//! fetch → convert → save → annotate every topic → save.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, instrument, warn};

use neurotopics_dataset::Dataset;
use neurotopics_fetch::{FetchOptions, FetchResult};
use neurotopics_shared::{NeurotopicsError, Result, TopicConfig, topic_label};
use neurotopics_snapshots::{DocumentSource, SnapshotSource};

use crate::joiner::{MismatchWarning, build_annotation_column};

/// File name of the converted dataset.
pub const DATASET_FILE: &str = "neurosynth_dataset.json";

/// File name of the dataset with topic annotations.
pub const ANNOTATED_DATASET_FILE: &str = "neurosynth_dataset_annotation.json";

// ---------------------------------------------------------------------------
// Annotate config & result
// ---------------------------------------------------------------------------

/// What to do when a topic's weights or counts cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnParseError {
    /// Stop the sweep and return the error.
    #[default]
    Abort,
    /// Log the error, leave the topic without a column, continue.
    Skip,
}

/// Configuration for [`annotate_dataset`].
#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    pub topics: TopicConfig,
    pub on_parse_error: OnParseError,
}

/// A topic left out of the sweep because of a parse error.
#[derive(Debug, Clone)]
pub struct SkippedTopic {
    pub topic: usize,
    pub error: String,
}

/// Result of an annotation sweep.
#[derive(Debug, Default)]
pub struct AnnotateResult {
    /// Topics that received a column.
    pub topics_annotated: usize,
    /// Topics skipped under [`OnParseError::Skip`].
    pub skipped: Vec<SkippedTopic>,
    /// Every count mismatch, in topic order.
    pub mismatches: Vec<MismatchWarning>,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each topic has been joined (or skipped).
    fn topic_done(&self, topic: usize, current: usize, total: usize);
    /// Called when the sweep completes.
    fn done(&self, result: &AnnotateResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn topic_done(&self, _topic: usize, _current: usize, _total: usize) {}
    fn done(&self, _result: &AnnotateResult) {}
}

// ---------------------------------------------------------------------------
// Annotation sweep
// ---------------------------------------------------------------------------

/// Add one annotation column per topic to `dataset`.
///
/// Columns are labelled `<prefix>_<topicset>__topic<NNN>`. Count mismatches
/// never stop the sweep. Parse errors stop it unless `on_parse_error` is
/// [`OnParseError::Skip`]; any other error always stops it.
#[instrument(skip_all, fields(source = source.name(), topic_set = %config.topics.topic_set))]
pub fn annotate_dataset(
    config: &AnnotateConfig,
    dataset: &mut Dataset,
    source: &dyn DocumentSource,
    progress: &dyn ProgressReporter,
) -> Result<AnnotateResult> {
    let start = Instant::now();
    let topics = &config.topics;

    progress.phase("Reading topic summaries");
    let expected = source.expected_counts()?;
    if expected.len() < topics.topic_count {
        return Err(NeurotopicsError::validation(format!(
            "summary pages list {} topics, {} requested",
            expected.len(),
            topics.topic_count
        )));
    }

    info!(
        topics = topics.topic_count,
        studies = dataset.len(),
        "starting annotation sweep"
    );

    progress.phase("Joining topic weights");
    let mut result = AnnotateResult::default();

    for (topic, count) in expected.into_iter().take(topics.topic_count).enumerate() {
        let column = count.and_then(|expected_count| {
            let scraped = source.scraped_weights(topic)?;
            build_annotation_column(topic, dataset.ids(), &scraped, expected_count)
        });

        match column {
            Ok(outcome) => {
                result.mismatches.extend(outcome.mismatch);
                dataset.annotate(
                    topic_label(&topics.source_prefix, &topics.topic_set, topic),
                    outcome.column,
                )?;
                result.topics_annotated += 1;
            }
            Err(e) if e.is_parse() && config.on_parse_error == OnParseError::Skip => {
                warn!(topic, error = %e, "skipping topic");
                result.skipped.push(SkippedTopic {
                    topic,
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }

        progress.topic_done(topic, topic + 1, topics.topic_count);
    }

    result.elapsed = start.elapsed();
    progress.done(&result);

    info!(
        annotated = result.topics_annotated,
        skipped = result.skipped.len(),
        mismatches = result.mismatches.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "annotation sweep complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Configuration for [`run_all`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding corpus files and saved datasets.
    pub out_dir: PathBuf,
    /// Directory holding one snapshot sub-directory per topic set.
    pub snapshot_root: PathBuf,
    /// Download step; `None` uses whatever corpus files are already present.
    pub fetch: Option<FetchOptions>,
    /// Corpus peak table, relative to `out_dir`.
    pub database_file: String,
    /// Corpus term features, relative to `out_dir`. Skipped if absent.
    pub features_file: String,
    pub annotate: AnnotateConfig,
}

/// Result of [`run_all`].
#[derive(Debug)]
pub struct RunResult {
    pub fetch: Option<FetchResult>,
    pub dataset_path: PathBuf,
    pub annotated_path: PathBuf,
    pub studies: usize,
    pub annotate: AnnotateResult,
    pub elapsed: std::time::Duration,
}

/// Run the whole pipeline.
///
/// 1. Fetch the corpus files (if configured)
/// 2. Convert them to a dataset and save it
/// 3. Annotate every topic from the snapshots
/// 4. Save the annotated dataset
#[instrument(skip_all, fields(out_dir = %config.out_dir.display()))]
pub async fn run_all(config: &RunConfig, progress: &dyn ProgressReporter) -> Result<RunResult> {
    let start = Instant::now();

    std::fs::create_dir_all(&config.out_dir)
        .map_err(|e| NeurotopicsError::io(&config.out_dir, e))?;

    // --- Phase 1: Fetch ---
    let fetch = match &config.fetch {
        Some(opts) => {
            progress.phase("Downloading corpus");
            Some(neurotopics_fetch::fetch_corpus(opts).await?)
        }
        None => None,
    };

    // --- Phase 2: Convert ---
    progress.phase("Converting corpus");
    let database = config.out_dir.join(&config.database_file);
    let features = config.out_dir.join(&config.features_file);
    let features = features.exists().then_some(features);
    if features.is_none() {
        warn!(file = %config.features_file, "features file not found, converting without term features");
    }

    let prefix = &config.annotate.topics.source_prefix;
    let mut dataset =
        neurotopics_dataset::convert_neurosynth(&database, features.as_deref(), prefix)?;

    let dataset_path = config.out_dir.join(DATASET_FILE);
    dataset.save(&dataset_path)?;

    // --- Phase 3: Annotate ---
    let snapshot_dir = config
        .snapshot_root
        .join(&config.annotate.topics.topic_set);
    let source = SnapshotSource::new(snapshot_dir, &config.annotate.topics)?;
    let annotate = annotate_dataset(&config.annotate, &mut dataset, &source, progress)?;

    // --- Phase 4: Save ---
    progress.phase("Saving annotated dataset");
    let annotated_path = config.out_dir.join(ANNOTATED_DATASET_FILE);
    dataset.save(&annotated_path)?;

    let result = RunResult {
        fetch,
        dataset_path,
        annotated_path,
        studies: dataset.len(),
        annotate,
        elapsed: start.elapsed(),
    };

    info!(
        studies = result.studies,
        elapsed_ms = result.elapsed.as_millis(),
        "run complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use neurotopics_dataset::StudyMetadata;
    use neurotopics_shared::{AppConfig, ScrapedWeights, StudyId};
    use neurotopics_snapshots::StaticSource;

    fn temp_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("nt-pipeline-test-{nanos}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn annotate_config(topic_count: usize, on_parse_error: OnParseError) -> AnnotateConfig {
        let mut topics = TopicConfig::from(&AppConfig::default());
        topics.topic_count = topic_count;
        AnnotateConfig {
            topics,
            on_parse_error,
        }
    }

    fn small_dataset() -> Dataset {
        let meta = |paper: &str| StudyMetadata {
            id: StudyId::new(paper, 1),
            title: String::new(),
            authors: String::new(),
            journal: String::new(),
            year: None,
            doi: None,
        };
        Dataset::new("neurosynth", vec![meta("10"), meta("11"), meta("12")], vec![]).unwrap()
    }

    fn weights(pairs: &[(&str, &str)]) -> ScrapedWeights {
        pairs
            .iter()
            .map(|(id, w)| (id.parse().unwrap(), (*w).to_string()))
            .collect()
    }

    #[test]
    fn sweep_adds_one_column_per_topic() {
        let source = StaticSource::new(vec![1, 2, 0])
            .with_topic(0, weights(&[("11-1", "3.5")]))
            .with_topic(1, weights(&[("11-1", "1.0")]));
        let mut dataset = small_dataset();

        let result = annotate_dataset(
            &annotate_config(3, OnParseError::Abort),
            &mut dataset,
            &source,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(result.topics_annotated, 3);
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic000"),
            Some(&[0.0, 3.5, 0.0][..])
        );
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic002"),
            Some(&[0.0, 0.0, 0.0][..])
        );
        assert_eq!(
            result.mismatches,
            vec![MismatchWarning {
                topic: 1,
                found: 1,
                expected: 2
            }]
        );
    }

    #[test]
    fn parse_error_aborts_by_default() {
        let source = StaticSource::new(vec![1, 1])
            .with_topic(0, weights(&[("10-1", "oops")]))
            .with_topic(1, weights(&[("10-1", "1")]));
        let mut dataset = small_dataset();

        let err = annotate_dataset(
            &annotate_config(2, OnParseError::Abort),
            &mut dataset,
            &source,
            &SilentProgress,
        )
        .unwrap_err();

        assert!(err.is_parse());
        assert!(dataset.annotations.is_empty());
    }

    #[test]
    fn parse_error_skipped_on_request() {
        let source = StaticSource::new(vec![1, 1])
            .with_topic(0, weights(&[("10-1", "oops")]))
            .with_topic(1, weights(&[("10-1", "1")]));
        let mut dataset = small_dataset();

        let result = annotate_dataset(
            &annotate_config(2, OnParseError::Skip),
            &mut dataset,
            &source,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(result.topics_annotated, 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].topic, 0);
        assert!(!dataset.annotations.contains("Neurosynth_v5topic200__topic000"));
        assert!(dataset.annotations.contains("Neurosynth_v5topic200__topic001"));
    }

    #[test]
    fn unreadable_count_only_skips_its_topic() {
        let source = StaticSource::new(vec![1, 1])
            .with_topic(0, weights(&[("10-1", "2.5")]))
            .with_topic(1, weights(&[("11-1", "1")]))
            .with_unreadable_count(1, "many");
        let mut dataset = small_dataset();

        let result = annotate_dataset(
            &annotate_config(2, OnParseError::Skip),
            &mut dataset,
            &source,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(result.topics_annotated, 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].topic, 1);
        assert!(result.skipped[0].error.contains("'many'"));
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic000"),
            Some(&[2.5, 0.0, 0.0][..])
        );
        assert!(!dataset.annotations.contains("Neurosynth_v5topic200__topic001"));
    }

    #[test]
    fn too_few_summary_counts() {
        let source = StaticSource::new(vec![1]);
        let mut dataset = small_dataset();

        let err = annotate_dataset(
            &annotate_config(2, OnParseError::Abort),
            &mut dataset,
            &source,
            &SilentProgress,
        )
        .unwrap_err();
        assert!(err.to_string().contains("summary pages list 1 topics, 2 requested"));
    }

    #[test]
    fn sweep_over_snapshot_fixtures() {
        let dataset_path = Path::new("../../../fixtures/neurosynth/database.txt");
        let mut dataset =
            neurotopics_dataset::convert_neurosynth(dataset_path, None, "Neurosynth").unwrap();

        let config = annotate_config(3, OnParseError::Abort);
        let source =
            SnapshotSource::new("../../../fixtures/snapshots/v5topic200", &config.topics).unwrap();

        let result = annotate_dataset(&config, &mut dataset, &source, &SilentProgress).unwrap();

        assert_eq!(result.topics_annotated, 3);
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic000"),
            Some(&[1.2, 3.5, 0.0, 0.8][..])
        );
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic001"),
            Some(&[0.0, 0.0, 2.0, 0.0][..])
        );
        // Topic 1 lists a study missing from the local database.
        assert_eq!(
            result.mismatches,
            vec![MismatchWarning {
                topic: 1,
                found: 1,
                expected: 2
            }]
        );
    }

    #[test]
    fn unparseable_snapshot_aborts() {
        let config = annotate_config(1, OnParseError::Abort);
        let source =
            SnapshotSource::new("../../../fixtures/snapshots/broken", &config.topics).unwrap();
        let mut dataset = small_dataset();

        let err = annotate_dataset(&config, &mut dataset, &source, &SilentProgress).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn snapshot_bad_count_skipped_other_topics_annotated() {
        let dataset_path = Path::new("../../../fixtures/neurosynth/database.txt");
        let mut dataset =
            neurotopics_dataset::convert_neurosynth(dataset_path, None, "Neurosynth").unwrap();

        let config = annotate_config(3, OnParseError::Skip);
        let source =
            SnapshotSource::new("../../../fixtures/snapshots/partial", &config.topics).unwrap();

        let result = annotate_dataset(&config, &mut dataset, &source, &SilentProgress).unwrap();

        assert_eq!(result.topics_annotated, 2);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].topic, 1);
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic000"),
            Some(&[0.0, 3.5, 0.0, 0.8][..])
        );
        assert_eq!(
            dataset.annotations.get("Neurosynth_v5topic200__topic002"),
            Some(&[0.4, 0.0, 0.0, 0.0][..])
        );
        assert!(result.mismatches.is_empty());

        let mut dataset =
            neurotopics_dataset::convert_neurosynth(dataset_path, None, "Neurosynth").unwrap();
        let config = annotate_config(3, OnParseError::Abort);
        let err = annotate_dataset(&config, &mut dataset, &source, &SilentProgress).unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn run_all_without_fetch() {
        let out = temp_dir();
        for file in ["database.txt", "features.txt"] {
            std::fs::copy(
                Path::new("../../../fixtures/neurosynth").join(file),
                out.join(file),
            )
            .unwrap();
        }

        let config = RunConfig {
            out_dir: out.clone(),
            snapshot_root: PathBuf::from("../../../fixtures/snapshots"),
            fetch: None,
            database_file: "database.txt".into(),
            features_file: "features.txt".into(),
            annotate: annotate_config(3, OnParseError::Abort),
        };

        let result = run_all(&config, &SilentProgress).await.unwrap();
        assert_eq!(result.studies, 4);
        assert_eq!(result.annotate.topics_annotated, 3);

        let plain = Dataset::load(&result.dataset_path).unwrap();
        assert_eq!(plain.annotations.len(), 3);

        let annotated = Dataset::load(&result.annotated_path).unwrap();
        assert_eq!(annotated.annotations.len(), 6);
        assert_eq!(
            annotated
                .annotations
                .labels_with_prefix("Neurosynth_v5topic200__")
                .count(),
            3
        );

        let _ = std::fs::remove_dir_all(&out);
    }
}
