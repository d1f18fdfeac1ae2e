//! Status lines on stderr for the bootstrap and build steps.
//!
//! Labels are coloured when stderr is a terminal and plain otherwise, so logs
//! captured by CI stay readable. Child processes write to the inherited
//! stdio directly and never pass through here.

use console::{Color, Term, style};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Environment variable that turns on `detail` lines when set to "1".
pub const VERBOSE_ENV_VAR: &str = "TINYLLM_VERBOSE";

fn stderr_is_tty() -> bool {
    Term::stderr().is_term()
}

fn render(label: &str, color: Color, msg: &str, is_tty: bool) -> String {
    let label = if is_tty {
        style(label).bold().fg(color).to_string()
    } else {
        label.to_string()
    };
    if msg.is_empty() {
        label
    } else {
        format!("{label} {msg}")
    }
}

fn emit(label: &str, color: Color, msg: &str) {
    eprintln!("{}", render(label, color, msg, stderr_is_tty()));
}

/// A step that is starting: "Fetching", "Extracting", "Generating".
pub fn status(label: &str, msg: &str) {
    emit(label, Color::Cyan, msg);
}

/// A step that completed.
pub fn finished(label: &str, msg: &str) {
    emit(label, Color::Green, msg);
}

pub fn error(msg: &str) {
    emit("error:", Color::Red, msg);
}

pub fn hint(msg: &str) {
    emit("hint:", Color::Yellow, msg);
}

/// Prints an indented, dimmed line, only in verbose mode.
pub fn detail(msg: &str) {
    if !is_verbose() {
        return;
    }
    let line = format!("  {msg}");
    if stderr_is_tty() {
        eprintln!("{}", style(line).dim());
    } else {
        eprintln!("{line}");
    }
}

pub fn fetching(url: &str) {
    status("Fetching", url);
}

pub fn fetched(what: &str, bytes: u64) {
    finished("Fetched", &format!("{what} ({})", human_size(bytes)));
}

pub fn extracted(entries: usize, destination: &Path) {
    detail(&format!(
        "{entries} {} into {}",
        if entries == 1 { "entry" } else { "entries" },
        destination.display()
    ));
}

/// Byte count in the largest binary unit that keeps the value at or above 1.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Enables verbose output if `TINYLLM_VERBOSE=1` is set.
pub fn init_from_env() {
    let enabled = verbose_from_env_value(std::env::var(VERBOSE_ENV_VAR).ok().as_deref());
    VERBOSE.store(enabled, Ordering::Relaxed);
}

fn verbose_from_env_value(value: Option<&str>) -> bool {
    value.map(str::trim) == Some("1")
}
