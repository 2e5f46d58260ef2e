//! Corpus acquisition: downloads and unpacks the Neurosynth data archive.
//!
//! The corpus ships as one gzipped tarball. It is fetched only when a
//! configured corpus file is missing from the output directory (or `force` is
//! set), so re-running a full sweep does not hit the network again.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use neurotopics_shared::{NeurotopicsError, Result};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

/// Maximum number of redirects to follow. The default archive is served
/// through a redirect.
const MAX_REDIRECTS: usize = 5;

/// Default timeout in seconds for the archive download.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!("neurotopics/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options & results
// ---------------------------------------------------------------------------

/// Configuration for a corpus download.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// URL of the gzipped corpus tarball.
    pub archive_url: Url,
    /// File names to extract. Matched against the last path component of
    /// each archive entry.
    pub files: Vec<String>,
    /// Directory the files are written to.
    pub out_dir: PathBuf,
    /// Download and overwrite even if every file exists.
    pub force: bool,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl FetchOptions {
    /// Options with the default timeout and no forced re-download.
    pub fn new(archive_url: Url, files: Vec<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_url,
            files,
            out_dir: out_dir.into(),
            force: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// One corpus file handled by [`fetch_corpus`].
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// Local path of the file.
    pub path: PathBuf,
    /// Size in bytes (of the existing file when skipped).
    pub bytes: u64,
    /// Whether the file already existed and was left alone.
    pub skipped: bool,
}

/// The downloaded archive.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub url: Url,
    pub bytes: u64,
    pub sha256: String,
}

/// Outcome of a corpus download.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Every configured file, in configuration order.
    pub files: Vec<FetchedFile>,
    /// `None` when nothing had to be downloaded.
    pub archive: Option<ArchiveInfo>,
}

impl FetchResult {
    /// Number of files written from the archive.
    pub fn extracted(&self) -> usize {
        self.files.iter().filter(|f| !f.skipped).count()
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Configured corpus files that do not exist in `out_dir`.
pub fn missing_files(out_dir: &Path, files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|f| !out_dir.join(f).is_file())
        .cloned()
        .collect()
}

/// Make sure every configured corpus file exists in `opts.out_dir`.
///
/// When files are missing (or `force` is set) the archive is downloaded and
/// the wanted entries are unpacked, each written atomically (temp file, then
/// rename). Files already present are left untouched unless `force` is set.
#[instrument(skip_all, fields(archive_url = %opts.archive_url, out_dir = %opts.out_dir.display()))]
pub async fn fetch_corpus(opts: &FetchOptions) -> Result<FetchResult> {
    let wanted = if opts.force {
        opts.files.clone()
    } else {
        missing_files(&opts.out_dir, &opts.files)
    };

    if wanted.is_empty() {
        info!("corpus already present, skipping download");
        return Ok(FetchResult {
            files: existing_files(opts)?,
            archive: None,
        });
    }

    std::fs::create_dir_all(&opts.out_dir)
        .map_err(|e| NeurotopicsError::io(&opts.out_dir, e))?;

    let client = build_client(opts.timeout_secs)?;
    info!(url = %opts.archive_url, missing = ?wanted, "downloading corpus archive");
    let body = download(&client, &opts.archive_url).await?;

    let archive = ArchiveInfo {
        url: opts.archive_url.clone(),
        bytes: body.len() as u64,
        sha256: format!("{:x}", Sha256::digest(&body)),
    };
    debug!(bytes = archive.bytes, sha256 = %archive.sha256, "archive downloaded");

    let extracted = unpack(&body, &wanted, &opts.out_dir, &opts.archive_url)?;

    let mut files = Vec::with_capacity(opts.files.len());
    for name in &opts.files {
        let path = opts.out_dir.join(name);
        let file = match extracted.iter().find(|(n, _)| n == name) {
            Some((_, bytes)) => FetchedFile {
                path,
                bytes: *bytes,
                skipped: false,
            },
            None => FetchedFile {
                bytes: file_size(&path)?,
                path,
                skipped: true,
            },
        };
        files.push(file);
    }

    let result = FetchResult {
        files,
        archive: Some(archive),
    };

    info!(
        extracted = result.extracted(),
        total = result.files.len(),
        "corpus fetch complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn existing_files(opts: &FetchOptions) -> Result<Vec<FetchedFile>> {
    opts.files
        .iter()
        .map(|name| {
            let path = opts.out_dir.join(name);
            Ok(FetchedFile {
                bytes: file_size(&path)?,
                path,
                skipped: true,
            })
        })
        .collect()
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .map_err(|e| NeurotopicsError::io(path, e))?
        .len())
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NeurotopicsError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET a URL and return its body, failing on any non-success status.
async fn download(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| NeurotopicsError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NeurotopicsError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| NeurotopicsError::Network(format!("{url}: failed to read body: {e}")))?;

    Ok(body.to_vec())
}

/// Extract the `wanted` files from a gzipped tarball into `out_dir`.
/// Returns `(name, bytes)` per written file. Every wanted file must be present.
fn unpack(
    archive: &[u8],
    wanted: &[String],
    out_dir: &Path,
    origin: &Url,
) -> Result<Vec<(String, u64)>> {
    let corrupt =
        |e: std::io::Error| NeurotopicsError::parse(format!("{origin}: corrupt archive: {e}"));

    let mut reader = tar::Archive::new(GzDecoder::new(archive));
    let mut written: Vec<(String, u64)> = Vec::new();

    for entry in reader.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(corrupt)?;
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if !wanted.contains(&name) || written.iter().any(|(n, _)| *n == name) {
            continue;
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(corrupt)?;

        let target = out_dir.join(&name);
        write_atomic(&target, &content)?;
        debug!(path = %target.display(), bytes = content.len(), "extracted");
        written.push((name, content.len() as u64));
    }

    if let Some(absent) = wanted.iter().find(|w| !written.iter().any(|(n, _)| n == *w)) {
        return Err(NeurotopicsError::validation(format!(
            "{origin}: archive has no '{absent}'"
        )));
    }

    Ok(written)
}

fn write_atomic(target: &Path, body: &[u8]) -> Result<()> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{name}.tmp"));

    std::fs::write(&temp, body).map_err(|e| NeurotopicsError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| NeurotopicsError::io(target, e))?;
    Ok(())
}
