//! Bootstrap sequence: model weights, GN toolchain, then `gn gen`.
//!
//! Every step is idempotent at a coarse level. The default weights file is
//! downloaded only if missing, and the toolchain is downloaded, extracted and
//! set up only if its directory is missing. There is no version check on an
//! existing toolchain directory: moving to a new pinned release requires
//! deleting `third_party/build-gn` by hand.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Settings;
use crate::context::Context;
use crate::driver;
use crate::error::{BootstrapError, Result};
use crate::extract;
use crate::fetch::{AssetSpec, FetchOutcome, FetchPolicy, Fetcher};
use crate::output;

/// Weights file used when `--weights` is not given.
pub const DEFAULT_WEIGHTS: &str = "stories15M.bin";

/// Architecture token in toolchain archive names. Only x64 builds are published.
const TOOLCHAIN_ARCH: &str = "x64";

/// Setup script shipped inside the toolchain, relative to its root.
pub const POST_INSTALL_SCRIPT: &str = "tools/clang/scripts/update.py";

/// Everything the generator was configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Weights path as passed to GN, relative to the project root.
    pub weights: String,
    pub toolchain_dir: PathBuf,
    pub out_dir: PathBuf,
    /// `key=value` GN build arguments, in order.
    pub gn_args: Vec<String>,
}

impl BootstrapConfig {
    /// The arguments joined into the single `--args=` value GN expects.
    pub fn args_string(&self) -> String {
        self.gn_args.join(" ")
    }
}

/// Whether [`Bootstrapper::ensure_toolchain`] had to install anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainStatus {
    Installed,
    AlreadyPresent,
}

/// GN arguments for a weights path.
///
/// The build flags are fixed release policy: non-debug, static, official.
/// `llama2_c_weigets` is spelled the way the project's `BUILD.gn` declares it.
pub fn gn_args(weights: &str) -> Vec<String> {
    vec![
        format!("llama2_c_weigets=\"//{weights}\""),
        "is_component_build=false".to_string(),
        "is_debug=false".to_string(),
        "is_official_build=true".to_string(),
    ]
}

/// Runs the bootstrap steps against one project root.
pub struct Bootstrapper<'a> {
    ctx: &'a Context,
    settings: Settings,
    fetcher: Fetcher,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(ctx: &'a Context, settings: Settings, fetcher: Fetcher) -> Self {
        Self {
            ctx,
            settings,
            fetcher,
        }
    }

    /// Runs the whole sequence and returns the configuration GN was given.
    pub fn bootstrap(&self, weights_override: Option<&str>) -> Result<BootstrapConfig> {
        let weights = self.resolve_weights(weights_override)?;
        self.ensure_toolchain()?;

        let config = BootstrapConfig {
            gn_args: gn_args(&weights),
            weights,
            toolchain_dir: self.ctx.toolchain_dir(),
            out_dir: self.ctx.default_out_dir(),
        };
        self.generate(&config)?;
        Ok(config)
    }

    /// Download URL for a weights file.
    pub fn weights_url(&self, filename: &str) -> String {
        format!("{}/{filename}", self.settings.weights_base_url())
    }

    /// Returns the weights path to configure.
    ///
    /// An explicit override is used verbatim and not checked here; GN reports
    /// a missing file itself. Without one, the default weights file is fetched
    /// into the project root unless it is already there.
    pub fn resolve_weights(&self, weights_override: Option<&str>) -> Result<String> {
        if let Some(weights) = weights_override {
            output::detail(&format!("using weights {weights}"));
            return Ok(weights.to_string());
        }

        let asset = AssetSpec::new(
            self.weights_url(DEFAULT_WEIGHTS),
            self.ctx.root().join(DEFAULT_WEIGHTS),
            FetchPolicy::SkipIfExists,
        );
        if !asset.destination.exists() {
            output::fetching(&asset.url);
        }
        match self.fetcher.fetch_asset(&asset)? {
            FetchOutcome::Downloaded { bytes } => {
                output::fetched(DEFAULT_WEIGHTS, bytes);
            }
            FetchOutcome::AlreadyPresent => {
                output::detail(&format!("{DEFAULT_WEIGHTS} already present"));
            }
        }
        Ok(DEFAULT_WEIGHTS.to_string())
    }

    /// Release archive URL for the pinned toolchain on this platform.
    pub fn toolchain_url(&self) -> String {
        let repo = self.settings.toolchain_repo_url();
        let tag = self.settings.toolchain_version();
        let os = self.ctx.platform().release_token();
        format!("{repo}/releases/download/{tag}/gn_{tag}_{os}_{TOOLCHAIN_ARCH}.zip")
    }

    /// Where the toolchain archive is downloaded before extraction.
    pub fn toolchain_archive_path(&self) -> PathBuf {
        self.ctx.toolchain_dir().with_extension("zip")
    }

    /// Downloads, extracts and sets up the toolchain unless its directory
    /// already exists.
    pub fn ensure_toolchain(&self) -> Result<ToolchainStatus> {
        let dir = self.ctx.toolchain_dir();
        if dir.is_dir() {
            output::detail(&format!("{} already present", dir.display()));
            return Ok(ToolchainStatus::AlreadyPresent);
        }

        let url = self.toolchain_url();
        let archive = self.toolchain_archive_path();
        output::fetching(&url);
        self.fetcher.fetch_asset(&AssetSpec::new(
            url,
            &archive,
            FetchPolicy::AlwaysRefetch,
        ))?;

        output::status("Extracting", &archive.display().to_string());
        let entries = extract::extract_and_remove(&archive, &dir)?;
        output::extracted(entries, &dir);

        self.run_post_install()?;
        output::finished("Installed", &format!("GN toolchain in {}", dir.display()));
        Ok(ToolchainStatus::Installed)
    }

    pub fn post_install_script(&self) -> PathBuf {
        self.ctx.toolchain_dir().join(POST_INSTALL_SCRIPT)
    }

    /// Runs the toolchain's setup script once with the configured interpreter.
    pub fn run_post_install(&self) -> Result<()> {
        let script = self.post_install_script();
        let python = self.settings.python(self.ctx.platform());
        output::status("Running", &format!("{python} {}", script.display()));

        let status = Command::new(&python)
            .arg(&script)
            .current_dir(self.ctx.root())
            .status()
            .map_err(|e| BootstrapError::PostInstall {
                script: script.clone(),
                reason: format!("failed to launch {python}: {e}"),
            })?;

        if !status.success() {
            return Err(BootstrapError::PostInstall {
                script,
                reason: format!("exited with status {}", driver::exit_code(status)),
            });
        }
        Ok(())
    }

    /// Runs `gn gen <out_dir> --args=<args>` with the toolchain's generator.
    pub fn generate(&self, config: &BootstrapConfig) -> Result<()> {
        let gn = self.ctx.tool_path("gn");
        let args = format!("--args={}", config.args_string());
        output::status("Generating", &config.out_dir.display().to_string());
        output::detail(&args);

        run_checked(
            Command::new(&gn)
                .arg("gen")
                .arg(&config.out_dir)
                .arg(&args)
                .current_dir(self.ctx.root()),
            &gn,
        )
    }
}

/// Runs a command with inherited stdio and fails on a non-zero exit.
fn run_checked(command: &mut Command, program: &Path) -> Result<()> {
    let program = program.display().to_string();
    let status = command.status().map_err(|source| BootstrapError::Spawn {
        program: program.clone(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(BootstrapError::ChildProcess {
            program,
            code: driver::exit_code(status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformId;

    fn settings_with_repo(repo: &str) -> Settings {
        Settings {
            weights_base_url: Some("http://127.0.0.1:1/weights".to_string()),
            toolchain_repo_url: Some(repo.to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn gn_args_encode_weights_and_release_flags() {
        assert_eq!(
            gn_args("stories15M.bin"),
            vec![
                "llama2_c_weigets=\"//stories15M.bin\"",
                "is_component_build=false",
                "is_debug=false",
                "is_official_build=true",
            ]
        );
    }

    #[test]
    fn args_string_is_space_joined() {
        let config = BootstrapConfig {
            weights: "w.bin".to_string(),
            toolchain_dir: PathBuf::from("tc"),
            out_dir: PathBuf::from("out/Release"),
            gn_args: gn_args("w.bin"),
        };
        assert_eq!(
            config.args_string(),
            "llama2_c_weigets=\"//w.bin\" is_component_build=false is_debug=false is_official_build=true"
        );
    }

    #[test]
    fn toolchain_url_per_platform() {
        let settings = settings_with_repo("https://github.com/yue/build-gn");
        let cases = [
            (PlatformId::Linux, "linux"),
            (PlatformId::Windows, "win"),
            (PlatformId::MacOs, "mac"),
        ];
        for (platform, os) in cases {
            let ctx = Context::new("/repo", platform);
            let bootstrapper = Bootstrapper::new(&ctx, settings.clone(), Fetcher::default());
            assert_eq!(
                bootstrapper.toolchain_url(),
                format!(
                    "https://github.com/yue/build-gn/releases/download/v0.10.0/gn_v0.10.0_{os}_x64.zip"
                )
            );
        }
    }

    #[test]
    fn weights_url_appends_filename() {
        let ctx = Context::new("/repo", PlatformId::Linux);
        let bootstrapper = Bootstrapper::new(&ctx, settings_with_repo("x"), Fetcher::default());
        assert_eq!(
            bootstrapper.weights_url(DEFAULT_WEIGHTS),
            "http://127.0.0.1:1/weights/stories15M.bin"
        );
    }

    #[test]
    fn archive_sits_next_to_toolchain_dir() {
        let ctx = Context::new("/repo", PlatformId::Linux);
        let bootstrapper = Bootstrapper::new(&ctx, Settings::default(), Fetcher::default());
        assert_eq!(
            bootstrapper.toolchain_archive_path(),
            PathBuf::from("/repo/third_party/build-gn.zip")
        );
    }

    #[test]
    fn weights_override_is_used_verbatim_without_fetching() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Context::new(tmp.path(), PlatformId::Linux);
        let bootstrapper =
            Bootstrapper::new(&ctx, settings_with_repo("http://127.0.0.1:1"), Fetcher::default());

        let weights = bootstrapper.resolve_weights(Some("models/missing.bin")).unwrap();

        assert_eq!(weights, "models/missing.bin");
        assert!(!tmp.path().join(DEFAULT_WEIGHTS).exists());
    }

    #[test]
    fn existing_default_weights_are_trusted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(DEFAULT_WEIGHTS), b"local").unwrap();
        let ctx = Context::new(tmp.path(), PlatformId::Linux);
        let bootstrapper =
            Bootstrapper::new(&ctx, settings_with_repo("http://127.0.0.1:1"), Fetcher::default());

        assert_eq!(bootstrapper.resolve_weights(None).unwrap(), DEFAULT_WEIGHTS);
        assert_eq!(
            std::fs::read(tmp.path().join(DEFAULT_WEIGHTS)).unwrap(),
            b"local"
        );
    }

    #[test]
    fn existing_toolchain_dir_skips_install() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Context::new(tmp.path(), PlatformId::Linux);
        std::fs::create_dir_all(ctx.toolchain_dir()).unwrap();
        // Nothing listens on port 1; any download attempt would fail.
        let bootstrapper =
            Bootstrapper::new(&ctx, settings_with_repo("http://127.0.0.1:1"), Fetcher::default());

        assert_eq!(
            bootstrapper.ensure_toolchain().unwrap(),
            ToolchainStatus::AlreadyPresent
        );
        assert!(!bootstrapper.toolchain_archive_path().exists());
    }

    #[test]
    fn post_install_launch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Context::new(tmp.path(), PlatformId::Linux);
        let settings = Settings {
            python: Some("/nonexistent/python3".to_string()),
            ..Settings::default()
        };
        let bootstrapper = Bootstrapper::new(&ctx, settings, Fetcher::default());

        let err = bootstrapper.run_post_install().unwrap_err();
        assert!(matches!(err, BootstrapError::PostInstall { .. }), "got {err:?}");
        assert!(err.to_string().contains("failed to launch"), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn post_install_nonzero_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Context::new(tmp.path(), PlatformId::Linux);
        let settings = Settings {
            python: Some("false".to_string()),
            ..Settings::default()
        };
        let bootstrapper = Bootstrapper::new(&ctx, settings, Fetcher::default());

        let err = bootstrapper.run_post_install().unwrap_err();
        assert!(matches!(err, BootstrapError::PostInstall { .. }), "got {err:?}");
        assert!(err.to_string().contains("status 1"), "got: {err}");
    }

    #[test]
    fn missing_generator_is_a_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Context::new(tmp.path(), PlatformId::Linux);
        let bootstrapper = Bootstrapper::new(&ctx, Settings::default(), Fetcher::default());
        let config = BootstrapConfig {
            weights: DEFAULT_WEIGHTS.to_string(),
            toolchain_dir: ctx.toolchain_dir(),
            out_dir: ctx.default_out_dir(),
            gn_args: gn_args(DEFAULT_WEIGHTS),
        };

        let err = bootstrapper.generate(&config).unwrap_err();
        assert!(matches!(err, BootstrapError::Spawn { .. }), "got {err:?}");
    }
}
