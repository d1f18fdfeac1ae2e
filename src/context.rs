//! Immutable per-process context: the project root and the host platform.
//!
//! Computed once at startup by [`Context::detect`] and passed by reference to
//! the orchestrator and the build driver, so neither re-reads the process
//! environment.

use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, Result};
use crate::platform::{self, PlatformId};

/// Toolchain directory, relative to the project root.
pub const TOOLCHAIN_DIR: &str = "third_party/build-gn";

/// Default build configuration directory, relative to the project root.
pub const DEFAULT_OUT_DIR: &str = "out/Release";

/// Project root and platform, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    root: PathBuf,
    platform: PlatformId,
}

impl Context {
    pub fn new(root: impl Into<PathBuf>, platform: PlatformId) -> Self {
        Self {
            root: root.into(),
            platform,
        }
    }

    /// Builds the context from the current working directory and host.
    pub fn detect() -> Result<Self> {
        let platform = platform::resolve()?;
        let root = std::env::current_dir().map_err(|e| BootstrapError::io(".", e))?;
        Ok(Self::new(root, platform))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> PlatformId {
        self.platform
    }

    /// Where the GN distribution is extracted.
    pub fn toolchain_dir(&self) -> PathBuf {
        self.root.join(TOOLCHAIN_DIR)
    }

    /// Path of an executable shipped in the toolchain, with the platform suffix.
    pub fn tool_path(&self, name: &str) -> PathBuf {
        self.toolchain_dir()
            .join(format!("{name}{}", self.platform.exe_suffix()))
    }

    /// Absolute path of the default build configuration directory.
    pub fn default_out_dir(&self) -> PathBuf {
        self.root.join(DEFAULT_OUT_DIR)
    }
}
