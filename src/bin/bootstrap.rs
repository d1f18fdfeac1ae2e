//! `bootstrap`: fetch the model weights and the GN toolchain, then generate
//! ninja files into `out/Release`.

use anyhow::{Context as _, Result};
use clap::Parser;
use std::process;

use tinyllm_bootstrap::bootstrap::Bootstrapper;
use tinyllm_bootstrap::config::Settings;
use tinyllm_bootstrap::context::Context;
use tinyllm_bootstrap::error::BootstrapError;
use tinyllm_bootstrap::fetch::Fetcher;
use tinyllm_bootstrap::output;

/// Fetch the model weights and GN toolchain, then generate ninja files.
#[derive(Parser, Debug)]
#[command(name = "bootstrap", version, about)]
struct Cli {
    /// Path to model weights, relative to the project root.
    #[arg(long)]
    weights: Option<String>,
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context::detect()?;
    let settings = Settings::load(ctx.root())?;
    let timeout = settings
        .fetch_timeout()
        .context("invalid fetch_timeout in bootstrap.toml")?;

    let bootstrapper = Bootstrapper::new(&ctx, settings, Fetcher::new(timeout));
    let config = bootstrapper.bootstrap(cli.weights.as_deref())?;

    output::finished(
        "Ready",
        &format!("ninja files generated in {}", config.out_dir.display()),
    );
    Ok(())
}

fn main() {
    output::init_from_env();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        output::error(&format!("{e:#}"));
        if let Some(hint) = e
            .downcast_ref::<BootstrapError>()
            .and_then(BootstrapError::recovery_hint)
        {
            output::hint(hint);
        }
        process::exit(1);
    }
}
