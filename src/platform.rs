//! Host platform detection.
//!
//! The platform decides two things: which toolchain archive to download and
//! whether executables carry an `.exe` suffix. It is resolved once per process
//! and stored in [`crate::context::Context`].

use crate::error::{BootstrapError, Result};

/// The platform families the toolchain is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformId {
    Linux,
    Windows,
    MacOs,
}

impl PlatformId {
    /// Maps a host identifier string to a platform.
    ///
    /// Accepts `linux*`, `win*` and exactly `darwin`, the same spellings a
    /// Python `sys.platform` check would see. Everything else is rejected.
    pub fn from_host_identifier(host: &str) -> Result<Self> {
        if host.starts_with("linux") {
            Ok(Self::Linux)
        } else if host.starts_with("win") {
            Ok(Self::Windows)
        } else if host == "darwin" {
            Ok(Self::MacOs)
        } else {
            Err(BootstrapError::UnsupportedPlatform(host.to_string()))
        }
    }

    /// OS token used in toolchain release archive names.
    pub fn release_token(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "win",
            Self::MacOs => "mac",
        }
    }

    /// Suffix appended to executable names inside the toolchain.
    pub fn exe_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::Linux | Self::MacOs => "",
        }
    }

    /// Default Python interpreter for running toolchain helper scripts.
    pub fn default_python(self) -> &'static str {
        match self {
            Self::Windows => "python",
            Self::Linux | Self::MacOs => "python3",
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.release_token())
    }
}

/// Returns the host identifier for the running process.
///
/// Rust reports `macos`/`windows`; these are translated to the `darwin`/`win32`
/// spellings so a single table in [`PlatformId::from_host_identifier`] applies.
pub fn host_identifier() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Resolves the running host to a [`PlatformId`].
pub fn resolve() -> Result<PlatformId> {
    PlatformId::from_host_identifier(host_identifier())
}
