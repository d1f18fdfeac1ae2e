//! Optional project settings for the bootstrapper.
//!
//! Settings live in `<root>/bootstrap.toml`. Every key is optional; a missing
//! file means "use the built-in defaults". The two download locations can also
//! be overridden through environment variables, which is how mirrors and
//! air-gapped setups point the bootstrapper elsewhere without editing files.
//!
//! Precedence for a URL value (highest wins):
//! 1. environment variable
//! 2. value from `bootstrap.toml`
//! 3. built-in default
//!
//! Empty or whitespace-only values at any layer fall through to the next one.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::PlatformId;

/// Settings file name, relative to the project root.
pub const SETTINGS_FILE_NAME: &str = "bootstrap.toml";

/// Where the default weights file is hosted. The filename is appended.
pub const DEFAULT_WEIGHTS_BASE_URL: &str = "https://huggingface.co/karpathy/tinyllamas/resolve/main";

/// Repository publishing the GN toolchain releases.
pub const DEFAULT_TOOLCHAIN_REPO_URL: &str = "https://github.com/yue/build-gn";

/// Pinned toolchain release tag.
pub const DEFAULT_TOOLCHAIN_VERSION: &str = "v0.10.0";

const WEIGHTS_BASE_URL_ENV_VAR: &str = "TINYLLM_WEIGHTS_BASE_URL";
const TOOLCHAIN_REPO_URL_ENV_VAR: &str = "TINYLLM_TOOLCHAIN_REPO_URL";

/// Contents of `bootstrap.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Base URL the weights filename is appended to.
    pub weights_base_url: Option<String>,
    /// Repository URL the toolchain release path is appended to.
    pub toolchain_repo_url: Option<String>,
    /// Toolchain release tag, e.g. "v0.10.0".
    pub toolchain_version: Option<String>,
    /// Interpreter for the toolchain's post-install script.
    pub python: Option<String>,
    /// Total time allowed per download, e.g. "90s", "10m", "1h".
    pub fetch_timeout: Option<String>,
}

impl Settings {
    /// Path of the settings file for a project root.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(SETTINGS_FILE_NAME)
    }

    /// Loads `<root>/bootstrap.toml`, or defaults when the file does not exist.
    ///
    /// Parse errors and I/O errors other than not-found are hard failures.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(&Self::path_in(root))
    }

    /// Loads settings from a specific file. Returns defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse settings file at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to read settings file at {}", path.display())),
        }
    }

    pub fn weights_base_url(&self) -> String {
        self.weights_base_url_with_env(std::env::var(WEIGHTS_BASE_URL_ENV_VAR).ok())
    }

    fn weights_base_url_with_env(&self, env_value: Option<String>) -> String {
        layered(env_value, &self.weights_base_url, DEFAULT_WEIGHTS_BASE_URL)
    }

    pub fn toolchain_repo_url(&self) -> String {
        self.toolchain_repo_url_with_env(std::env::var(TOOLCHAIN_REPO_URL_ENV_VAR).ok())
    }

    fn toolchain_repo_url_with_env(&self, env_value: Option<String>) -> String {
        layered(env_value, &self.toolchain_repo_url, DEFAULT_TOOLCHAIN_REPO_URL)
    }

    pub fn toolchain_version(&self) -> String {
        non_empty_trimmed(self.toolchain_version.clone())
            .unwrap_or_else(|| DEFAULT_TOOLCHAIN_VERSION.to_string())
    }

    pub fn python(&self, platform: PlatformId) -> String {
        non_empty_trimmed(self.python.clone())
            .unwrap_or_else(|| platform.default_python().to_string())
    }

    /// Download timeout. `None` means downloads may take as long as they need.
    pub fn fetch_timeout(&self) -> Result<Option<Duration>> {
        match non_empty_trimmed(self.fetch_timeout.clone()) {
            Some(s) => parse_duration_string(&s).map(Some),
            None => Ok(None),
        }
    }
}

/// Parses a human-readable duration string into a `Duration`.
///
/// Accepted formats: `<positive-integer>s`, `<positive-integer>m` or
/// `<positive-integer>h`. Zero is rejected. Only lowercase suffixes are accepted.
pub fn parse_duration_string(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("Duration string is empty");
    }

    let unit_start = s.char_indices().last().map_or(0, |(i, _)| i);
    let (num_str, unit) = s.split_at(unit_start);
    let multiplier: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => bail!(
            "Invalid duration unit '{unit}' in '{s}'. Expected 's' (seconds), 'm' (minutes) or 'h' (hours)"
        ),
    };

    if num_str.is_empty() {
        bail!("Missing numeric value in duration '{s}'");
    }

    let value: u64 = num_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid numeric value in duration '{s}': {e}"))?;

    if value == 0 {
        bail!("Duration must be positive, got '{s}'");
    }

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            anyhow::anyhow!("Duration overflow: '{s}' exceeds maximum representable duration")
        })
}

fn layered(env_value: Option<String>, file_value: &Option<String>, default: &str) -> String {
    non_empty_trimmed(env_value)
        .or_else(|| non_empty_trimmed(file_value.clone()))
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

/// Return the trimmed value if non-empty after trimming, otherwise `None`.
fn non_empty_trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
