//! Build driver: runs ninja from the toolchain against a generated output
//! directory and turns its exit status into the driver's own.
//!
//! Exit status rules:
//! - ninja exits with code `n` → the driver exits with `n` (0 stays 0)
//! - the user interrupts the build (Ctrl-C) → 1, even when ninja handles the
//!   signal and exits with a code of its own
//! - ninja is killed by SIGINT → 1; by any other signal `s` → `128 + s`

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::ExitStatus;
use std::task::Poll;

use crate::context::{Context, DEFAULT_OUT_DIR};
use crate::error::{BootstrapError, Result};
use crate::output;

/// Target built when none is given.
pub const DEFAULT_TARGET: &str = "all";

/// Exit status reported when the build is interrupted.
pub const INTERRUPTED_EXIT_CODE: i32 = 1;

#[cfg(unix)]
const SIGINT: i32 = 2;

/// ninja short options whose value may follow as a separate argument.
const VALUE_OPTIONS: &[&str] = &["-j", "-k", "-l", "-d", "-t", "-w", "-f"];

pub const USAGE: &str = "\
usage: tinyllm-build [-h] [-C OUT_DIR] [targets ...]

Builds targets with ninja from third_party/build-gn.

positional arguments:
  targets      The targets to build (default: all)

options:
  -h, --help   show this help message and exit
  -C OUT_DIR   Which config to build (default: out/Release)

Any other option is passed to ninja unchanged.";

/// Parsed command line of the build driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArgs {
    pub targets: Vec<String>,
    pub out_dir: String,
    /// Options not recognised by the driver, forwarded to ninja in order.
    pub extra_args: Vec<String>,
}

impl Default for BuildArgs {
    fn default() -> Self {
        Self {
            targets: vec![DEFAULT_TARGET.to_string()],
            out_dir: DEFAULT_OUT_DIR.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Outcome of parsing the driver's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    Run(BuildArgs),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("argument -C: expected one argument")]
    MissingOutDir,
    #[error("argument is not valid UTF-8: {0}")]
    NotUnicode(String),
}

/// [`parse_args`] over raw OS arguments. Arguments that are not valid UTF-8
/// are refused rather than rewritten.
pub fn parse_os_args<I>(args: I) -> std::result::Result<ParsedArgs, UsageError>
where
    I: IntoIterator<Item = OsString>,
{
    let args = args
        .into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|arg| UsageError::NotUnicode(arg.to_string_lossy().into_owned()))
        })
        .collect::<std::result::Result<Vec<String>, _>>()?;
    parse_args(args)
}

/// Splits the command line into output directory, targets and pass-through
/// options.
///
/// `-C DIR`, `-CDIR` and `-C=DIR` set the output directory (last one wins).
/// `--` ends option parsing. Tokens starting with `-` go to ninja untouched,
/// together with the value of ninja's value-taking short options. All other
/// tokens are targets.
pub fn parse_args<I, S>(args: I) -> std::result::Result<ParsedArgs, UsageError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out_dir = None;
    let mut targets = Vec::new();
    let mut extra_args = Vec::new();

    let mut iter = args.into_iter().map(Into::into);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            targets.extend(iter.by_ref());
            break;
        }
        if arg == "-h" || arg == "--help" {
            return Ok(ParsedArgs::Help);
        }
        if arg == "-C" {
            out_dir = Some(iter.next().ok_or(UsageError::MissingOutDir)?);
            continue;
        }
        if let Some(rest) = arg.strip_prefix("-C") {
            let dir = rest.strip_prefix('=').unwrap_or(rest);
            if dir.is_empty() {
                return Err(UsageError::MissingOutDir);
            }
            out_dir = Some(dir.to_string());
            continue;
        }
        if arg.len() > 1 && arg.starts_with('-') {
            let takes_value = VALUE_OPTIONS.contains(&arg.as_str());
            extra_args.push(arg);
            if takes_value {
                extra_args.extend(iter.next());
            }
            continue;
        }
        targets.push(arg);
    }

    let mut parsed = BuildArgs::default();
    if let Some(dir) = out_dir {
        parsed.out_dir = dir;
    }
    if !targets.is_empty() {
        parsed.targets = targets;
    }
    parsed.extra_args = extra_args;
    Ok(ParsedArgs::Run(parsed))
}

/// One ninja run: `<executor> -C <out_dir> <extra args...> <targets...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    pub executor: PathBuf,
    pub out_dir: String,
    pub extra_args: Vec<String>,
    pub targets: Vec<String>,
}

impl BuildInvocation {
    /// Targets the toolchain's ninja for the context's platform.
    pub fn new(ctx: &Context, args: BuildArgs) -> Self {
        Self::with_executor(ctx.tool_path("ninja"), args)
    }

    pub fn with_executor(executor: impl Into<PathBuf>, args: BuildArgs) -> Self {
        Self {
            executor: executor.into(),
            out_dir: args.out_dir,
            extra_args: args.extra_args,
            targets: args.targets,
        }
    }

    /// Arguments passed to the executor, in order.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2 + self.extra_args.len() + self.targets.len());
        args.push("-C".to_string());
        args.push(self.out_dir.clone());
        args.extend(self.extra_args.iter().cloned());
        args.extend(self.targets.iter().cloned());
        args
    }

    /// Runs the executor until it exits or the user presses Ctrl-C.
    ///
    /// The Ctrl-C listener is in place before the executor starts.
    pub fn run(&self) -> Result<i32> {
        self.block_on(async {
            let interrupt = interrupt_signal();
            self.supervise(interrupt).await
        })
    }

    /// Runs the executor until it exits or `interrupt` completes, whichever
    /// comes first. On interrupt the child is killed and
    /// [`INTERRUPTED_EXIT_CODE`] is returned.
    pub fn run_until<F>(&self, interrupt: F) -> Result<i32>
    where
        F: Future<Output = ()>,
    {
        self.block_on(self.supervise(interrupt))
    }

    fn block_on<T>(&self, task: impl Future<Output = Result<T>>) -> Result<T> {
        let runtime = crate::current_thread_runtime().map_err(|source| BootstrapError::Spawn {
            program: self.program(),
            source,
        })?;
        runtime.block_on(task)
    }

    fn program(&self) -> String {
        self.executor.display().to_string()
    }

    async fn supervise<F>(&self, interrupt: F) -> Result<i32>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let mut child = tokio::process::Command::new(&self.executor)
            .args(self.args())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BootstrapError::Spawn {
                program: self.program(),
                source,
            })?;

        tokio::select! {
            biased;
            () = &mut interrupt => {
                if let Err(e) = child.kill().await {
                    output::detail(&stop_failed(&self.executor, &e));
                }
                Ok(INTERRUPTED_EXIT_CODE)
            }
            status = child.wait() => {
                let status = status.map_err(|e| BootstrapError::io(&self.executor, e))?;
                // A Ctrl-C reaches ninja too; it may exit before the
                // interrupt is seen here.
                if already_fired(interrupt.as_mut()).await {
                    return Ok(INTERRUPTED_EXIT_CODE);
                }
                Ok(exit_code(status))
            }
        }
    }
}

fn stop_failed(executor: &Path, err: &io::Error) -> String {
    format!("failed to stop {} after interrupt: {err}", executor.display())
}

/// Lets the runtime deliver pending signals, then polls `interrupt` once.
async fn already_fired<F>(mut interrupt: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::task::yield_now().await;
    std::future::poll_fn(|cx| Poll::Ready(interrupt.as_mut().poll(cx).is_ready())).await
}

/// Resolves on Ctrl-C received after this call. Never resolves if the
/// listener cannot be installed.
fn interrupt_signal() -> Pin<Box<dyn Future<Output = ()>>> {
    match listen_for_interrupt() {
        Ok(interrupt) => interrupt,
        Err(e) => {
            output::detail(&format!("cannot listen for Ctrl-C: {e}"));
            Box::pin(std::future::pending::<()>())
        }
    }
}

#[cfg(unix)]
fn listen_for_interrupt() -> io::Result<Pin<Box<dyn Future<Output = ()>>>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(Box::pin(async move {
        if sigint.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }))
}

#[cfg(windows)]
fn listen_for_interrupt() -> io::Result<Pin<Box<dyn Future<Output = ()>>>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(Box::pin(async move {
        if ctrl_c.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }))
}

/// Maps a child's exit status onto the driver's exit code.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return if signal == SIGINT {
                INTERRUPTED_EXIT_CODE
            } else {
                128 + signal
            };
        }
    }
    1
}
