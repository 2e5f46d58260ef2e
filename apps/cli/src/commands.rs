//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use neurotopics_core::{
    ANNOTATED_DATASET_FILE, AnnotateConfig, AnnotateResult, DATASET_FILE, OnParseError,
    ProgressReporter, RunConfig,
};
use neurotopics_dataset::Dataset;
use neurotopics_fetch::{FetchOptions, FetchResult};
use neurotopics_shared::{AppConfig, TopicConfig, init_config, load_config, resolve_archive_url};
use neurotopics_snapshots::SnapshotSource;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// neurotopics — annotate the Neurosynth dataset with topic weights.
#[derive(Parser)]
#[command(
    name = "neurotopics",
    version,
    about = "Convert the Neurosynth database and annotate it with topic weights from saved pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Download and unpack the corpus archive.
    Fetch {
        /// Output directory (defaults to config output_dir).
        #[arg(short, long)]
        out: Option<String>,

        /// Corpus archive URL (overrides config).
        #[arg(long)]
        archive_url: Option<String>,

        /// Download even if the files already exist.
        #[arg(long)]
        force: bool,
    },

    /// Convert the corpus files into a dataset.
    Convert {
        /// Peak table (defaults to <output_dir>/database.txt).
        #[arg(long)]
        database: Option<String>,

        /// Term features (defaults to <output_dir>/features.txt when present).
        #[arg(long)]
        features: Option<String>,

        /// Dataset file to write.
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Annotate a saved dataset with topic weights from snapshots.
    Annotate {
        /// Dataset file to annotate.
        #[arg(long)]
        dataset: String,

        /// Snapshot root; pages are read from <snapshots>/<topic-set>/.
        #[arg(long)]
        snapshots: String,

        /// Annotated dataset file to write (defaults next to the input).
        #[arg(short, long)]
        out: Option<String>,

        /// Number of topics (overrides config).
        #[arg(long)]
        topics: Option<usize>,

        /// Topic set name (overrides config).
        #[arg(long)]
        topic_set: Option<String>,

        /// Skip topics with unparseable weights instead of stopping.
        #[arg(long)]
        skip_unparseable: bool,
    },

    /// Fetch, convert, and annotate in one go.
    Run {
        /// Output directory (defaults to config output_dir).
        #[arg(short, long)]
        out: Option<String>,

        /// Snapshot root (defaults to the output directory).
        #[arg(long)]
        snapshots: Option<String>,

        /// Corpus archive URL, used only when corpus files are missing.
        #[arg(long)]
        archive_url: Option<String>,

        /// Never download; use the corpus files already in the output directory.
        #[arg(long)]
        skip_fetch: bool,

        /// Skip topics with unparseable weights instead of stopping.
        #[arg(long)]
        skip_unparseable: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "neurotopics=info",
        1 => "neurotopics=debug",
        _ => "neurotopics=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch {
            out,
            archive_url,
            force,
        } => cmd_fetch(out.as_deref(), archive_url.as_deref(), force).await,
        Command::Convert {
            database,
            features,
            out,
        } => cmd_convert(database.as_deref(), features.as_deref(), out.as_deref()),
        Command::Annotate {
            dataset,
            snapshots,
            out,
            topics,
            topic_set,
            skip_unparseable,
        } => cmd_annotate(
            &dataset,
            &snapshots,
            out.as_deref(),
            topics,
            topic_set,
            skip_unparseable,
        ),
        Command::Run {
            out,
            snapshots,
            archive_url,
            skip_fetch,
            skip_unparseable,
        } => {
            cmd_run(
                out.as_deref(),
                snapshots.as_deref(),
                archive_url.as_deref(),
                skip_fetch,
                skip_unparseable,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_fetch(out: Option<&str>, archive_url: Option<&str>, force: bool) -> Result<()> {
    let config = load_config()?;
    let mut opts = fetch_options(&config, &output_dir(&config, out), archive_url)?;
    opts.force = force;

    info!(archive_url = %opts.archive_url, out = %opts.out_dir.display(), "fetching corpus");
    let result = neurotopics_fetch::fetch_corpus(&opts).await?;

    println!();
    print_fetch_summary(&result);
    println!();
    Ok(())
}

fn cmd_convert(database: Option<&str>, features: Option<&str>, out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let out_dir = output_dir(&config, None);

    let database = database
        .map(PathBuf::from)
        .unwrap_or_else(|| out_dir.join(corpus_file(&config, 0, "database.txt")));
    let features = match features {
        Some(f) => Some(PathBuf::from(f)),
        None => Some(out_dir.join(corpus_file(&config, 1, "features.txt"))).filter(|p| p.exists()),
    };
    let out = out
        .map(PathBuf::from)
        .unwrap_or_else(|| out_dir.join(DATASET_FILE));

    info!(database = %database.display(), "converting corpus");
    let dataset = neurotopics_dataset::convert_neurosynth(
        &database,
        features.as_deref(),
        &config.defaults.source_prefix,
    )?;
    dataset.save(&out)?;

    println!();
    println!("  Dataset converted!");
    println!("  Studies:     {}", dataset.len());
    println!("  Coordinates: {}", dataset.coordinates.len());
    println!("  Annotations: {}", dataset.annotations.len());
    println!("  Path:        {}", out.display());
    println!();
    Ok(())
}

fn cmd_annotate(
    dataset_path: &str,
    snapshots: &str,
    out: Option<&str>,
    topics: Option<usize>,
    topic_set: Option<String>,
    skip_unparseable: bool,
) -> Result<()> {
    let config = load_config()?;
    let mut topic_config = TopicConfig::from(&config);
    if let Some(n) = topics {
        topic_config.topic_count = n;
    }
    if let Some(set) = topic_set {
        topic_config.topic_set = set;
    }

    let dataset_path = PathBuf::from(dataset_path);
    let out = match out {
        Some(p) => PathBuf::from(p),
        None => dataset_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(ANNOTATED_DATASET_FILE),
    };

    let mut dataset = Dataset::load(&dataset_path)?;
    let snapshot_dir = Path::new(snapshots).join(&topic_config.topic_set);
    if !snapshot_dir.is_dir() {
        return Err(eyre!(
            "snapshot directory '{}' not found. Save the topic pages there first.",
            snapshot_dir.display()
        ));
    }
    let source = SnapshotSource::new(&snapshot_dir, &topic_config)?;

    let annotate_config = AnnotateConfig {
        topics: topic_config,
        on_parse_error: on_parse_error(skip_unparseable),
    };

    info!(
        dataset = %dataset_path.display(),
        snapshots = %snapshot_dir.display(),
        topics = annotate_config.topics.topic_count,
        "annotating dataset"
    );

    let reporter = CliProgress::new();
    let result = neurotopics_core::annotate_dataset(
        &annotate_config,
        &mut dataset,
        &source,
        &reporter,
    )?;
    dataset.save(&out)?;

    println!();
    println!("  Dataset annotated!");
    print_annotate_summary(&result, &annotate_config.topics.topic_set);
    println!("  Path:      {}", out.display());
    println!();
    Ok(())
}

async fn cmd_run(
    out: Option<&str>,
    snapshots: Option<&str>,
    archive_url: Option<&str>,
    skip_fetch: bool,
    skip_unparseable: bool,
) -> Result<()> {
    let config = load_config()?;
    let out_dir = output_dir(&config, out);

    let missing = neurotopics_fetch::missing_files(&out_dir, &config.source.files);
    let fetch = if skip_fetch || missing.is_empty() {
        None
    } else {
        info!(?missing, "corpus files missing, will download");
        Some(fetch_options(&config, &out_dir, archive_url)?)
    };

    let run_config = RunConfig {
        snapshot_root: snapshots
            .map(PathBuf::from)
            .unwrap_or_else(|| out_dir.clone()),
        out_dir,
        fetch,
        database_file: corpus_file(&config, 0, "database.txt"),
        features_file: corpus_file(&config, 1, "features.txt"),
        annotate: AnnotateConfig {
            topics: TopicConfig::from(&config),
            on_parse_error: on_parse_error(skip_unparseable),
        },
    };

    info!(out = %run_config.out_dir.display(), skip_fetch, "starting full run");

    let reporter = CliProgress::new();
    let result = neurotopics_core::run_all(&run_config, &reporter).await?;

    println!();
    println!("  Run complete!");
    if let Some(fetch) = &result.fetch {
        print_fetch_summary(fetch);
    }
    println!("  Studies:   {}", result.studies);
    print_annotate_summary(&result.annotate, &run_config.annotate.topics.topic_set);
    println!("  Dataset:   {}", result.dataset_path.display());
    println!("  Annotated: {}", result.annotated_path.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn output_dir(config: &AppConfig, out: Option<&str>) -> PathBuf {
    PathBuf::from(out.unwrap_or(&config.defaults.output_dir))
}

/// Configured corpus file at `index`, or `fallback` if the list is shorter.
fn corpus_file(config: &AppConfig, index: usize, fallback: &str) -> String {
    config
        .source
        .files
        .get(index)
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

fn fetch_options(
    config: &AppConfig,
    out_dir: &Path,
    archive_url: Option<&str>,
) -> Result<FetchOptions> {
    let url = resolve_archive_url(config, archive_url)?;
    let mut opts = FetchOptions::new(url, config.source.files.clone(), out_dir);
    opts.timeout_secs = config.source.timeout_secs;
    Ok(opts)
}

fn on_parse_error(skip: bool) -> OnParseError {
    if skip {
        OnParseError::Skip
    } else {
        OnParseError::Abort
    }
}

fn print_fetch_summary(result: &FetchResult) {
    if let Some(archive) = &result.archive {
        println!("  Archive:   {} ({} bytes)", archive.url, archive.bytes);
        println!("  SHA-256:   {}", archive.sha256);
    }
    for file in &result.files {
        let status = if file.skipped { "present" } else { "extracted" };
        println!(
            "  {:<10} {} ({} bytes)",
            status,
            file.path.display(),
            file.bytes
        );
    }
}

fn print_annotate_summary(result: &AnnotateResult, topic_set: &str) {
    println!("  Topics:    {}", result.topics_annotated);
    println!("  Skipped:   {}", result.skipped.len());
    println!("  Mismatch:  {}", result.mismatches.len());
    for m in &result.mismatches {
        println!(
            "    Only {} out of {} studies found in topic {} from {}. Check the local html files.",
            m.found, m.expected, m.topic, topic_set
        );
    }
    for s in &result.skipped {
        println!("    Topic {} skipped: {}", s.topic, s.error);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn topic_done(&self, topic: usize, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Joining [{current}/{total}] topic {topic:03}"));
    }

    fn done(&self, _result: &AnnotateResult) {
        self.spinner.finish_and_clear();
    }
}
