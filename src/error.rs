//! Error taxonomy shared by the bootstrap and build components.
//!
//! Every variant is fatal to the operation that produced it. Nothing is
//! retried or downgraded; the binaries print the error and exit non-zero.

use std::io;
use std::path::PathBuf;

/// Errors produced by platform detection, asset acquisition, extraction and
/// child-process handling.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The host identifier matched none of the supported platform families.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A network fetch failed (DNS, connection, non-2xx status, truncated body).
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// The URL being fetched.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The archive was malformed, an entry could not be written, or an entry
    /// tried to escape the destination directory.
    #[error("failed to extract {}: {reason}", archive.display())]
    Extraction {
        /// The archive being extracted.
        archive: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The toolchain's post-install script could not run or exited non-zero.
    #[error("post-install script {} failed: {reason}", script.display())]
    PostInstall {
        /// The script that was run.
        script: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A generator or executor exited with a non-zero status.
    #[error("{program} exited with status {code}")]
    ChildProcess {
        /// The program that was run.
        program: String,
        /// Its exit code.
        code: i32,
    },

    /// A child process could not be started at all.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// The program that was launched.
        program: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Local filesystem failure outside of archive extraction.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl BootstrapError {
    /// Operator guidance for failures that leave state a re-run will not repair.
    ///
    /// The toolchain directory's existence is the only "already installed"
    /// signal, so a half-extracted or half-configured toolchain would otherwise
    /// be trusted on the next run.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            Self::Extraction { .. } | Self::PostInstall { .. } => Some(
                "remove third_party/build-gn before re-running bootstrap; it may be incomplete",
            ),
            Self::Fetch { .. } => {
                Some("check network access and re-run; a partially downloaded file is not reused")
            }
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for bootstrap and build operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;
