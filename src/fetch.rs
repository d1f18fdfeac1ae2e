//! Downloads remote assets to local paths.
//!
//! Each fetch is a single blocking GET driven on a current-thread Tokio
//! runtime. There is no retry and no content verification. The body is
//! streamed into `<destination>.part` and renamed into place once complete,
//! so a file at the destination is always a whole download.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BootstrapError, Result};
use crate::output;

/// User-Agent header sent with every download.
const USER_AGENT: &str = concat!("tinyllm-bootstrap/", env!("CARGO_PKG_VERSION"));

/// Whether an existing destination file satisfies the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// A file already at the destination is trusted as-is.
    SkipIfExists,
    /// Always download, overwriting whatever is there.
    AlwaysRefetch,
}

/// One asset to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    pub url: String,
    pub destination: PathBuf,
    pub policy: FetchPolicy,
}

impl AssetSpec {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, policy: FetchPolicy) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            policy,
        }
    }
}

/// What [`Fetcher::fetch_asset`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
}

/// HTTP(S) downloader with an optional whole-request timeout.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    timeout: Option<Duration>,
}

impl Fetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Applies the asset's idempotency policy, downloading only when needed.
    pub fn fetch_asset(&self, asset: &AssetSpec) -> Result<FetchOutcome> {
        if asset.policy == FetchPolicy::SkipIfExists && asset.destination.exists() {
            return Ok(FetchOutcome::AlreadyPresent);
        }
        let bytes = self.fetch(&asset.url, &asset.destination)?;
        Ok(FetchOutcome::Downloaded { bytes })
    }

    /// Downloads `url` to `destination`, overwriting it. Returns the byte count.
    ///
    /// The destination's parent directory is created if missing. On failure
    /// the destination is untouched and the partial file is removed.
    pub fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BootstrapError::io(parent, e))?;
        }

        let partial = partial_path(destination);
        let result = self
            .download(url, &partial)
            .and_then(|bytes| {
                std::fs::rename(&partial, destination)
                    .map_err(|e| BootstrapError::io(destination, e))?;
                Ok(bytes)
            });
        if result.is_err() && partial.exists() {
            if let Err(e) = std::fs::remove_file(&partial) {
                output::detail(&format!("could not remove {}: {e}", partial.display()));
            }
        }
        result
    }

    fn download(&self, url: &str, partial: &Path) -> Result<u64> {
        let client = self.build_http_client(url)?;
        let runtime = crate::current_thread_runtime().map_err(|e| BootstrapError::Fetch {
            url: url.to_string(),
            reason: format!("failed to start HTTP runtime: {e}"),
        })?;

        runtime.block_on(async {
            let mut response = client
                .get(url)
                .send()
                .await
                .map_err(|e| fetch_error(url, "request failed", &e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(BootstrapError::Fetch {
                    url: url.to_string(),
                    reason: format!("HTTP {status}"),
                });
            }

            let mut file = File::create(partial).map_err(|e| BootstrapError::io(partial, e))?;
            let mut written: u64 = 0;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| fetch_error(url, "failed to read response body", &e))?
            {
                file.write_all(&chunk)
                    .map_err(|e| BootstrapError::io(partial, e))?;
                written += chunk.len() as u64;
            }
            file.sync_all().map_err(|e| BootstrapError::io(partial, e))?;

            Ok(written)
        })
    }

    fn build_http_client(&self, url: &str) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| fetch_error(url, "failed to build HTTP client", &e))
    }
}

/// Sibling path the body is streamed into: `stories15M.bin` → `stories15M.bin.part`.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Flattens a reqwest error and its sources into one line, so the root cause
/// (DNS failure, connection refused, ...) reaches the user.
fn fetch_error(url: &str, what: &str, err: &reqwest::Error) -> BootstrapError {
    let mut reason = format!("{what}: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        reason.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    BootstrapError::Fetch {
        url: url.to_string(),
        reason,
    }
}
