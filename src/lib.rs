//! Bootstrapper and build driver for the tinyllm native build.
//!
//! `bootstrap` fetches the model weights and the GN toolchain, then generates
//! ninja files; `build` forwards targets to ninja. This library exposes the
//! pieces both binaries are made of, so integration tests can drive them.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod platform;

/// Single-threaded runtime for the blocking network and process calls.
pub(crate) fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
