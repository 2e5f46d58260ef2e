//! Application configuration for neurotopics.
//!
//! User config lives at `~/.neurotopics/neurotopics.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NeurotopicsError, Result};
use crate::types::ExtractionSchema;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "neurotopics.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".neurotopics";

// ---------------------------------------------------------------------------
// Config structs (matching neurotopics.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Where the raw corpus is downloaded from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Snapshot extraction schema.
    #[serde(default)]
    pub schema: ExtractionSchema,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the corpus files and the saved datasets.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of topics in the topic set.
    #[serde(default = "default_topic_count")]
    pub topic_count: usize,

    /// Topic set name; also the snapshot sub-directory name.
    #[serde(default = "default_topic_set")]
    pub topic_set: String,

    /// Prefix of snapshot file names and annotation labels.
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,

    /// Experiment index appended to every scraped paper id.
    #[serde(default = "default_experiment_index")]
    pub experiment_index: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            topic_count: default_topic_count(),
            topic_set: default_topic_set(),
            source_prefix: default_source_prefix(),
            experiment_index: default_experiment_index(),
        }
    }
}

fn default_output_dir() -> String {
    "neurosynth".into()
}
fn default_topic_count() -> usize {
    200
}
fn default_topic_set() -> String {
    "v5topic200".into()
}
fn default_source_prefix() -> String {
    "Neurosynth".into()
}
fn default_experiment_index() -> String {
    "1".into()
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Gzipped tarball holding the corpus files.
    #[serde(default = "default_archive_url")]
    pub archive_url: String,

    /// Corpus files to extract from the archive. The download is skipped
    /// when all of them already exist.
    #[serde(default = "default_files")]
    pub files: Vec<String>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            archive_url: default_archive_url(),
            files: default_files(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_archive_url() -> String {
    "https://github.com/neurosynth/neurosynth-data/raw/master/current_data.tar.gz".into()
}
fn default_files() -> Vec<String> {
    vec!["database.txt".into(), "features.txt".into()]
}
fn default_timeout_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Topic config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime topic-set configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Number of topics to annotate (`0..topic_count`).
    pub topic_count: usize,
    /// Topic set name, e.g. `v5topic200`.
    pub topic_set: String,
    /// Snapshot file and label prefix, e.g. `Neurosynth`.
    pub source_prefix: String,
    /// Experiment index for scraped study ids.
    pub experiment_index: String,
    /// Snapshot extraction schema.
    pub schema: ExtractionSchema,
}

impl From<&AppConfig> for TopicConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            topic_count: config.defaults.topic_count,
            topic_set: config.defaults.topic_set.clone(),
            source_prefix: config.defaults.source_prefix.clone(),
            experiment_index: config.defaults.experiment_index.clone(),
            schema: config.schema.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.neurotopics/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NeurotopicsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.neurotopics/neurotopics.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NeurotopicsError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        NeurotopicsError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NeurotopicsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NeurotopicsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NeurotopicsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the corpus archive URL, preferring an explicit override.
pub fn resolve_archive_url(config: &AppConfig, override_url: Option<&str>) -> Result<Url> {
    let raw = override_url
        .unwrap_or(config.source.archive_url.as_str())
        .trim();
    if raw.is_empty() {
        return Err(NeurotopicsError::config(
            "empty corpus archive URL. Set `archive_url` under [source] in \
             ~/.neurotopics/neurotopics.toml or pass --archive-url",
        ));
    }

    Url::parse(raw)
        .map_err(|e| NeurotopicsError::config(format!("invalid archive URL '{raw}': {e}")))
}
