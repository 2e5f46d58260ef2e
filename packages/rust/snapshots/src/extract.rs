//! HTML extraction of study weights and topic study counts.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use neurotopics_shared::{
    EXTRACTION_SCHEMA_VERSION, ExtractionSchema, NeurotopicsError, Result, StudyId,
};

/// Base used to resolve relative study links.
const LINK_BASE: &str = "https://neurosynth.org/";

/// Path segment that precedes the paper id in a study link.
const STUDIES_SEGMENT: &str = "studies";

/// [`ExtractionSchema`] with its selectors parsed.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    study_table: Selector,
    study_link: Selector,
    study_weight: Selector,
    summary_table: Selector,
    summary_cell: Selector,
    summary_columns: usize,
    summary_count_column: usize,
}

impl CompiledSchema {
    pub fn compile(schema: &ExtractionSchema) -> Result<Self> {
        if schema.version != EXTRACTION_SCHEMA_VERSION {
            return Err(NeurotopicsError::config(format!(
                "unsupported extraction schema version {} (expected {EXTRACTION_SCHEMA_VERSION})",
                schema.version
            )));
        }
        if schema.summary_columns == 0 || schema.summary_count_column >= schema.summary_columns {
            return Err(NeurotopicsError::config(format!(
                "schema v{}: summary_count_column {} must be below summary_columns {}",
                schema.version, schema.summary_count_column, schema.summary_columns
            )));
        }

        Ok(Self {
            study_table: selector(&schema.study_table)?,
            study_link: selector(&schema.study_link)?,
            study_weight: selector(&schema.study_weight)?,
            summary_table: selector(&schema.summary_table)?,
            summary_cell: selector(&schema.summary_cell)?,
            summary_columns: schema.summary_columns,
            summary_count_column: schema.summary_count_column,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| NeurotopicsError::config(format!("invalid selector '{css}': {e}")))
}

/// Extract `(study id, weight text)` pairs from one saved topic page.
///
/// The i-th study link is paired with the i-th weight cell. `origin` names the
/// page in error messages.
pub fn extract_topic_page(
    html: &str,
    schema: &CompiledSchema,
    experiment: &str,
    origin: &str,
) -> Result<Vec<(StudyId, String)>> {
    let doc = Html::parse_document(html);
    let table = doc.select(&schema.study_table).next().ok_or_else(|| {
        NeurotopicsError::parse(format!("{origin}: studies table not found"))
    })?;

    let links: Vec<ElementRef> = table.select(&schema.study_link).collect();
    let weights: Vec<String> = table
        .select(&schema.study_weight)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    if links.len() != weights.len() {
        return Err(NeurotopicsError::parse(format!(
            "{origin}: {} study links but {} weights",
            links.len(),
            weights.len()
        )));
    }

    links
        .iter()
        .zip(weights)
        .map(|(link, weight)| {
            let href = link.value().attr("href").unwrap_or_default();
            let paper = paper_id_from_href(href).ok_or_else(|| {
                NeurotopicsError::parse(format!("{origin}: no paper id in link '{href}'"))
            })?;
            Ok((StudyId::new(paper, experiment), weight))
        })
        .collect()
}

/// Extract the per-topic study counts listed on one saved summary page.
///
/// A missing summary table fails the whole page. A count cell that is not a
/// number only fails its own topic: it becomes an `Err` entry in the list.
pub fn extract_summary_counts(
    html: &str,
    schema: &CompiledSchema,
    origin: &str,
) -> Result<Vec<Result<usize>>> {
    let doc = Html::parse_document(html);
    let container = doc.select(&schema.summary_table).next().ok_or_else(|| {
        NeurotopicsError::parse(format!("{origin}: topic summary table not found"))
    })?;

    let cells: Vec<String> = container
        .select(&schema.summary_cell)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    let remainder = cells.len() % schema.summary_columns;
    if remainder != 0 {
        warn!(origin, remainder, "trailing summary cells ignored");
    }

    Ok(cells
        .chunks_exact(schema.summary_columns)
        .map(|row| {
            let text = &row[schema.summary_count_column];
            text.parse::<usize>().map_err(|_| {
                NeurotopicsError::parse(format!("{origin}: study count '{text}' is not numeric"))
            })
        })
        .collect())
}

/// The path segment following `studies/` in a study link, e.g.
/// `https://neurosynth.org/studies/10022492/` → `10022492`.
pub fn paper_id_from_href(href: &str) -> Option<String> {
    let base = Url::parse(LINK_BASE).ok()?;
    let url = base.join(href.trim()).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == STUDIES_SEGMENT)?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CompiledSchema {
        CompiledSchema::compile(&ExtractionSchema::default()).unwrap()
    }

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/snapshots/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn paper_id_variants() {
        assert_eq!(
            paper_id_from_href("https://neurosynth.org/studies/10022492/").as_deref(),
            Some("10022492")
        );
        assert_eq!(paper_id_from_href("/studies/17/").as_deref(), Some("17"));
        assert_eq!(paper_id_from_href("studies/17").as_deref(), Some("17"));
        assert_eq!(paper_id_from_href("https://neurosynth.org/studies/"), None);
        assert_eq!(paper_id_from_href("https://neurosynth.org/analyses/terms/"), None);
    }

    #[test]
    fn topic_page_pairs_links_with_weights() {
        let html = fixture("v5topic200/Neurosynth_v5topic200_topic000_00.htm");
        let pairs = extract_topic_page(&html, &schema(), "1", "topic000_00").unwrap();
        assert_eq!(
            pairs,
            vec![
                (StudyId::new("11", "1"), "3.5".to_string()),
                (StudyId::new("13", "1"), "0.8".to_string()),
            ]
        );
    }

    #[test]
    fn navigation_links_outside_table_ignored() {
        // The fixture's navbar links to /studies/ too; only table links count.
        let html = fixture("v5topic200/Neurosynth_v5topic200_topic001_00.htm");
        let pairs = extract_topic_page(&html, &schema(), "1", "topic001_00").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0.as_str(), "999-1");
    }

    #[test]
    fn weight_text_is_kept_verbatim() {
        let html = fixture("broken/Neurosynth_v5topic200_topic000_00.htm");
        let pairs = extract_topic_page(&html, &schema(), "1", "broken").unwrap();
        assert_eq!(pairs[0].1, "n/a");
    }

    #[test]
    fn missing_table_is_parse_error() {
        let err = extract_topic_page("<html><body><p>empty</p></body></html>", &schema(), "1", "x")
            .unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("studies table not found"));
    }

    #[test]
    fn unpaired_weights_are_parse_error() {
        let html = r#"<div class="row"><div class="row"><div class="col-md-10 content">
            <div class="tab-content"><div id="studies"><table><tbody>
            <tr><td><a href="/studies/1/">A</a></td><td class="sorting_1">1.0</td></tr>
            <tr><td><a href="/studies/2/">B</a></td><td>no weight</td></tr>
            </tbody></table></div></div></div></div></div>"#;
        let err = extract_topic_page(html, &schema(), "1", "x").unwrap_err();
        assert!(err.to_string().contains("2 study links but 1 weights"));
    }

    #[test]
    fn summary_counts() {
        let html = fixture("v5topic200/Neurosynth_v5topic200_00_topics.htm");
        let counts = extract_summary_counts(&html, &schema(), "00_topics").unwrap();
        let counts: Vec<usize> = counts.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(counts, vec![3, 2]);
    }

    #[test]
    fn summary_non_numeric_count() {
        let html = fixture("broken/Neurosynth_v5topic200_00_topics.htm");
        let counts = extract_summary_counts(&html, &schema(), "broken").unwrap();
        assert_eq!(counts.len(), 1);
        let err = counts.into_iter().next().unwrap().unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("'many'"));
    }

    #[test]
    fn summary_bad_count_is_per_row() {
        let html = fixture("partial/Neurosynth_v5topic200_00_topics.htm");
        let counts = extract_summary_counts(&html, &schema(), "partial").unwrap();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[0].as_ref().ok(), Some(&2));
        assert!(counts[1].as_ref().is_err_and(|e| e.is_parse()));
        assert_eq!(counts[2].as_ref().ok(), Some(&1));
    }

    #[test]
    fn summary_without_table_fails_page() {
        let err = extract_summary_counts("<html><body></body></html>", &schema(), "x").unwrap_err();
        assert!(err.to_string().contains("topic summary table not found"));
    }

    #[test]
    fn schema_rejects_bad_selector_and_columns() {
        let mut bad = ExtractionSchema::default();
        bad.study_link = "a[".into();
        assert!(CompiledSchema::compile(&bad).is_err());

        let mut bad = ExtractionSchema::default();
        bad.summary_count_column = 3;
        assert!(CompiledSchema::compile(&bad).is_err());
    }

    #[test]
    fn schema_rejects_unknown_version() {
        let mut future = ExtractionSchema::default();
        future.version = 7;
        let err = CompiledSchema::compile(&future).unwrap_err();
        assert!(matches!(err, NeurotopicsError::Config { .. }));
        assert!(err.to_string().contains("version 7"));
    }
}
