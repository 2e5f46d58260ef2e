//! Topic annotation joiner.
//!
//! Aligns one topic's scraped `(study id → weight)` map to the canonical study
//! order and checks the number of annotated studies against the count the
//! topic summary reports.

use std::fmt;

use tracing::warn;

use neurotopics_shared::{NeurotopicsError, Result, ScrapedWeights, StudyId};

/// Non-zero entry count of a topic column differs from the expected count.
///
/// Advisory only: the column is still produced and used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MismatchWarning {
    pub topic: usize,
    pub found: usize,
    pub expected: usize,
}

impl fmt::Display for MismatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "only {} out of {} studies found in topic {}",
            self.found, self.expected, self.topic
        )
    }
}

/// One topic's annotation column plus its count check.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOutcome {
    /// Weight per canonical study, 0 where the topic has no weight for it.
    pub column: Vec<f64>,
    pub mismatch: Option<MismatchWarning>,
}

/// Build the annotation column of `topic`.
///
/// The column has one entry per `canonical_ids` element, in the same order.
/// Scraped ids that are not canonical are ignored. Weight text is trimmed
/// and must parse as a finite number; otherwise a parse error is returned and
/// no column is produced. A mismatch between the non-zero count and
/// `expected_count` is logged at warn level and returned in the outcome.
pub fn build_annotation_column(
    topic: usize,
    canonical_ids: &[StudyId],
    scraped: &ScrapedWeights,
    expected_count: usize,
) -> Result<ColumnOutcome> {
    let mut column = vec![0.0; canonical_ids.len()];

    for (slot, id) in column.iter_mut().zip(canonical_ids) {
        if let Some(text) = scraped.get(id) {
            *slot = parse_weight(topic, id, text)?;
        }
    }

    let found = column.iter().filter(|w| **w != 0.0).count();
    let mismatch = (found != expected_count).then(|| MismatchWarning {
        topic,
        found,
        expected: expected_count,
    });

    if let Some(m) = &mismatch {
        warn!(topic, found = m.found, expected = m.expected, "{m}");
    }

    Ok(ColumnOutcome { column, mismatch })
}

fn parse_weight(topic: usize, id: &StudyId, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .ok_or_else(|| {
            NeurotopicsError::parse(format!(
                "topic {topic}: weight '{text}' for study {id} is not numeric"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<StudyId> {
        raw.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn weights(pairs: &[(&str, &str)]) -> ScrapedWeights {
        pairs
            .iter()
            .map(|(id, w)| (id.parse().unwrap(), (*w).to_string()))
            .collect()
    }

    #[test]
    fn single_match_without_mismatch() {
        let canonical = ids(&["10-1", "11-1", "12-1"]);
        let outcome =
            build_annotation_column(0, &canonical, &weights(&[("11-1", "3.5")]), 1).unwrap();
        assert_eq!(outcome.column, vec![0.0, 3.5, 0.0]);
        assert!(outcome.mismatch.is_none());
    }

    #[test]
    fn single_match_with_mismatch() {
        let canonical = ids(&["10-1", "11-1", "12-1"]);
        let outcome =
            build_annotation_column(4, &canonical, &weights(&[("11-1", "3.5")]), 2).unwrap();
        assert_eq!(outcome.column, vec![0.0, 3.5, 0.0]);
        assert_eq!(
            outcome.mismatch,
            Some(MismatchWarning {
                topic: 4,
                found: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn empty_weights_zero_expected() {
        let canonical = ids(&["10-1", "11-1"]);
        let outcome = build_annotation_column(0, &canonical, &ScrapedWeights::new(), 0).unwrap();
        assert_eq!(outcome.column, vec![0.0, 0.0]);
        assert!(outcome.mismatch.is_none());
    }

    #[test]
    fn empty_weights_nonzero_expected() {
        let canonical = ids(&["10-1", "11-1"]);
        let outcome = build_annotation_column(9, &canonical, &ScrapedWeights::new(), 5).unwrap();
        assert_eq!(outcome.column, vec![0.0, 0.0]);
        assert_eq!(outcome.mismatch.map(|m| (m.found, m.expected)), Some((0, 5)));
    }

    #[test]
    fn column_length_always_matches_canonical() {
        let scraped = weights(&[("10-1", "1"), ("11-1", "2"), ("77-1", "3"), ("78-1", "4")]);
        for n in 0..4 {
            let canonical: Vec<StudyId> =
                ids(&["10-1", "11-1", "12-1"]).into_iter().take(n).collect();
            let outcome = build_annotation_column(0, &canonical, &scraped, 0).unwrap();
            assert_eq!(outcome.column.len(), n);
        }
    }

    #[test]
    fn unknown_ids_ignored() {
        let canonical = ids(&["10-1", "11-1"]);
        let scraped = weights(&[("999-1", "4.1"), ("11-1", "0.5"), ("10-2", "7")]);
        let outcome = build_annotation_column(0, &canonical, &scraped, 1).unwrap();
        assert_eq!(outcome.column, vec![0.0, 0.5]);
        assert!(outcome.mismatch.is_none());
    }

    #[test]
    fn zero_weights_do_not_count() {
        let canonical = ids(&["10-1", "11-1"]);
        let scraped = weights(&[("10-1", "0.0"), ("11-1", " 2.25 ")]);
        let outcome = build_annotation_column(0, &canonical, &scraped, 2).unwrap();
        assert_eq!(outcome.column, vec![0.0, 2.25]);
        assert_eq!(outcome.mismatch.map(|m| m.found), Some(1));
    }

    #[test]
    fn non_numeric_weight_is_parse_error() {
        let canonical = ids(&["10-1", "11-1"]);
        let scraped = weights(&[("10-1", "1.0"), ("11-1", "n/a")]);
        let err = build_annotation_column(3, &canonical, &scraped, 2).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("'n/a' for study 11-1"));

        let scraped = weights(&[("10-1", "NaN")]);
        assert!(build_annotation_column(3, &canonical, &scraped, 1).is_err());
    }

    #[test]
    fn non_numeric_weight_on_unknown_id_is_ignored() {
        let canonical = ids(&["10-1"]);
        let scraped = weights(&[("55-1", "garbage")]);
        let outcome = build_annotation_column(0, &canonical, &scraped, 0).unwrap();
        assert_eq!(outcome.column, vec![0.0]);
    }

    #[test]
    fn mismatch_message() {
        let m = MismatchWarning {
            topic: 7,
            found: 1,
            expected: 2,
        };
        assert_eq!(m.to_string(), "only 1 out of 2 studies found in topic 7");
    }
}
