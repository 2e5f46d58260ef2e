//! Label-keyed annotation columns aligned to the dataset's study order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use neurotopics_shared::{NeurotopicsError, Result};

/// Dense numeric columns keyed by label, each of length `rows`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTable {
    rows: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

impl AnnotationTable {
    /// An empty table for `rows` studies.
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            columns: BTreeMap::new(),
        }
    }

    /// Insert a column, replacing any column with the same label.
    /// Returns the replaced column.
    pub fn insert(&mut self, label: impl Into<String>, column: Vec<f64>) -> Result<Option<Vec<f64>>> {
        let label = label.into();
        if column.len() != self.rows {
            return Err(NeurotopicsError::validation(format!(
                "annotation '{label}' has {} rows, dataset has {}",
                column.len(),
                self.rows
            )));
        }
        Ok(self.columns.insert(label, column))
    }

    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.columns.get(label).map(Vec::as_slice)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.columns.contains_key(label)
    }

    /// Labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Labels starting with `prefix`, e.g. all topics of one topic set.
    pub fn labels_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.labels().filter(move |l| l.starts_with(prefix))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check that the table matches a dataset of `rows` studies.
    pub(crate) fn validate(&self, rows: usize) -> Result<()> {
        if self.rows != rows {
            return Err(NeurotopicsError::validation(format!(
                "annotation table has {} rows, dataset has {rows}",
                self.rows
            )));
        }
        if let Some((label, col)) = self.columns.iter().find(|(_, c)| c.len() != rows) {
            return Err(NeurotopicsError::validation(format!(
                "annotation '{label}' has {} rows, dataset has {rows}",
                col.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_same_label() {
        let mut table = AnnotationTable::new(2);
        assert!(table.insert("a", vec![1.0, 0.0]).unwrap().is_none());
        let old = table.insert("a", vec![2.0, 0.0]).unwrap();
        assert_eq!(old, Some(vec![1.0, 0.0]));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a"), Some(&[2.0, 0.0][..]));
    }

    #[test]
    fn labels_are_ordered_and_filterable() {
        let mut table = AnnotationTable::new(1);
        table.insert("Neurosynth_v5topic200__topic001", vec![0.0]).unwrap();
        table.insert("Neurosynth_TFIDF__pain", vec![0.2]).unwrap();
        table.insert("Neurosynth_v5topic200__topic000", vec![1.0]).unwrap();

        let topics: Vec<&str> = table.labels_with_prefix("Neurosynth_v5topic200__").collect();
        assert_eq!(
            topics,
            vec![
                "Neurosynth_v5topic200__topic000",
                "Neurosynth_v5topic200__topic001"
            ]
        );
        assert!(table.contains("Neurosynth_TFIDF__pain"));
    }

    #[test]
    fn wrong_length_rejected() {
        let mut table = AnnotationTable::new(3);
        let err = table.insert("short", vec![1.0]).unwrap_err();
        assert!(err.to_string().contains("has 1 rows, dataset has 3"));
        assert!(table.is_empty());
    }
}
