//! `tinyllm-build`: run ninja from the bootstrapped toolchain.
//!
//! Exits with ninja's own status, or 1 if the build is interrupted.

use anyhow::Result;
use std::process;

use tinyllm_bootstrap::context::Context;
use tinyllm_bootstrap::driver::{self, BuildArgs, BuildInvocation, ParsedArgs};
use tinyllm_bootstrap::output;

/// Exit status for command-line usage errors.
const USAGE_EXIT_CODE: i32 = 2;

fn run(args: BuildArgs) -> Result<i32> {
    let ctx = Context::detect()?;
    let invocation = BuildInvocation::new(&ctx, args);
    output::detail(&format!(
        "{} {}",
        invocation.executor.display(),
        invocation.args().join(" ")
    ));
    Ok(invocation.run()?)
}

fn main() {
    output::init_from_env();

    let args = match driver::parse_os_args(std::env::args_os().skip(1)) {
        Ok(ParsedArgs::Run(args)) => args,
        Ok(ParsedArgs::Help) => {
            println!("{}", driver::USAGE);
            return;
        }
        Err(e) => {
            eprintln!("{}", driver::USAGE);
            output::error(&e.to_string());
            process::exit(USAGE_EXIT_CODE);
        }
    };

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{e:#}"));
            1
        }
    };
    process::exit(code);
}
