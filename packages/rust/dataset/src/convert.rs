//! Conversion of the Neurosynth text files into a [`Dataset`].
//!
//! `database.txt` holds one row per activation peak; consecutive rows with the
//! same `id` belong to one paper. Neurosynth does not split papers into
//! experiments, so every paper becomes study `<id>-1`.
//!
//! `features.txt` holds one row per paper (`pmid` first) and one column per
//! term; each term becomes an annotation column.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use neurotopics_shared::{NeurotopicsError, Result, StudyId, feature_label};

use crate::{Coordinate, Dataset, StudyMetadata};

/// Experiment index assigned to every Neurosynth paper.
const EXPERIMENT_INDEX: u32 = 1;

/// Columns `database.txt` must provide.
const REQUIRED_COLUMNS: [&str; 9] = [
    "id", "x", "y", "z", "space", "title", "authors", "year", "journal",
];

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Build a dataset from `database.txt` and, optionally, `features.txt`.
///
/// Feature columns are labelled `<source_prefix>_TFIDF__<term>`; studies with no
/// feature row get 0 and feature rows for unknown papers are ignored.
#[instrument(skip_all, fields(database = %database.display()))]
pub fn convert_neurosynth(
    database: &Path,
    features: Option<&Path>,
    source_prefix: &str,
) -> Result<Dataset> {
    let content =
        std::fs::read_to_string(database).map_err(|e| NeurotopicsError::io(database, e))?;
    let (metadata, coordinates) = parse_database(&content, &database.display().to_string())?;

    let mut dataset = Dataset::new(source_prefix.to_lowercase(), metadata, coordinates)?;
    info!(
        studies = dataset.len(),
        coordinates = dataset.coordinates.len(),
        "database converted"
    );

    if let Some(features) = features {
        let content =
            std::fs::read_to_string(features).map_err(|e| NeurotopicsError::io(features, e))?;
        let table = parse_features(&content, &features.display().to_string())?;

        let mut columns = vec![vec![0.0; dataset.len()]; table.terms.len()];
        let mut unmatched = 0usize;
        for (id, values) in &table.rows {
            match dataset.position(id) {
                Some(row) => {
                    for (col, value) in columns.iter_mut().zip(values) {
                        col[row] = *value;
                    }
                }
                None => unmatched += 1,
            }
        }
        if unmatched > 0 {
            warn!(unmatched, "feature rows without a matching study were ignored");
        }

        for (term, column) in table.terms.iter().zip(columns) {
            dataset.annotate(feature_label(source_prefix, term), column)?;
        }
        info!(terms = table.terms.len(), "features converted");
    }

    Ok(dataset)
}

// ---------------------------------------------------------------------------
// database.txt
// ---------------------------------------------------------------------------

/// Parse the tab-separated peak table into per-study metadata and coordinates.
///
/// `origin` names the input in error messages.
pub fn parse_database(
    content: &str,
    origin: &str,
) -> Result<(Vec<StudyMetadata>, Vec<Coordinate>)> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| NeurotopicsError::parse(format!("{origin}: file is empty")))?;
    let columns = HeaderIndex::new(header);
    for name in REQUIRED_COLUMNS {
        columns.require(name, origin)?;
    }

    let mut studies: BTreeMap<StudyId, StudyMetadata> = BTreeMap::new();
    let mut coordinates = Vec::new();

    for (idx, line) in lines {
        let line_no = idx + 1;
        let cells: Vec<&str> = line.split('\t').collect();
        let cell = |name: &str| columns.cell(&cells, name).unwrap_or("").trim();

        let paper = cell("id");
        if paper.is_empty() {
            return Err(NeurotopicsError::parse(format!(
                "{origin}:{line_no}: missing study id"
            )));
        }
        let id = StudyId::new(paper, EXPERIMENT_INDEX);

        coordinates.push(Coordinate {
            id: id.clone(),
            x: parse_number(cell("x"), origin, line_no, "x")?,
            y: parse_number(cell("y"), origin, line_no, "y")?,
            z: parse_number(cell("z"), origin, line_no, "z")?,
            space: cell("space").to_string(),
        });

        studies.entry(id.clone()).or_insert_with(|| StudyMetadata {
            id,
            title: cell("title").to_string(),
            authors: cell("authors").to_string(),
            journal: cell("journal").to_string(),
            year: parse_year(cell("year")),
            doi: Some(cell("doi"))
                .filter(|d| !d.is_empty())
                .map(String::from),
        });
    }

    // Keep coordinates grouped by study in canonical order; stable within a study.
    coordinates.sort_by(|a, b| a.id.cmp(&b.id));

    debug!(studies = studies.len(), peaks = coordinates.len(), "database parsed");
    Ok((studies.into_values().collect(), coordinates))
}

// ---------------------------------------------------------------------------
// features.txt
// ---------------------------------------------------------------------------

/// Term weights per study, as read from `features.txt`.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    /// Term names in file order.
    pub terms: Vec<String>,
    /// One value per term, keyed by study.
    pub rows: HashMap<StudyId, Vec<f64>>,
}

/// Parse the tab-separated term feature matrix.
pub fn parse_features(content: &str, origin: &str) -> Result<FeatureTable> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| NeurotopicsError::parse(format!("{origin}: file is empty")))?;
    let mut header = header.split('\t').map(str::trim);
    match header.next() {
        Some("pmid") | Some("id") => {}
        other => {
            return Err(NeurotopicsError::parse(format!(
                "{origin}: first column must be 'pmid', found {:?}",
                other.unwrap_or("")
            )));
        }
    }
    let terms: Vec<String> = header.map(String::from).collect();

    let mut rows = HashMap::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let mut cells = line.split('\t');
        let paper = cells.next().unwrap_or("").trim();
        let values = cells
            .map(|c| parse_number(c.trim(), origin, line_no, "feature"))
            .collect::<Result<Vec<f64>>>()?;

        if values.len() != terms.len() {
            return Err(NeurotopicsError::parse(format!(
                "{origin}:{line_no}: {} values for {} terms",
                values.len(),
                terms.len()
            )));
        }
        rows.insert(StudyId::new(paper, EXPERIMENT_INDEX), values);
    }

    Ok(FeatureTable { terms, rows })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Column positions looked up from a header row.
struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(header: &str) -> Self {
        let positions = header
            .split('\t')
            .enumerate()
            .map(|(i, name)| (name.trim().to_ascii_lowercase(), i))
            .collect();
        Self { positions }
    }

    fn require(&self, name: &str, origin: &str) -> Result<()> {
        if self.positions.contains_key(name) {
            Ok(())
        } else {
            Err(NeurotopicsError::parse(format!(
                "{origin}: missing required column '{name}'"
            )))
        }
    }

    fn cell<'a>(&self, cells: &[&'a str], name: &str) -> Option<&'a str> {
        self.positions.get(name).and_then(|&i| cells.get(i).copied())
    }
}

fn parse_number(text: &str, origin: &str, line_no: usize, column: &str) -> Result<f64> {
    text.parse::<f64>().map_err(|_| {
        NeurotopicsError::parse(format!(
            "{origin}:{line_no}: {column} value '{text}' is not numeric"
        ))
    })
}

/// Years are sometimes written as floats (`2010.0`); anything else is dropped.
fn parse_year(text: &str) -> Option<u32> {
    text.parse::<u32>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|y| *y >= 0.0).map(|y| y as u32))
}
