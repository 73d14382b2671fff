//! Plumbing shared by killtracer modules: access to tracefs control files,
//! the `trace_pipe` event stream and process information from procfs.

pub mod parsing;
pub mod toggle;
pub mod trace_pipe;
pub mod tracefs;

pub use parsing::procfs::{IdentityResolver, ProcFs, ProcessStatus, ProcfsError};
pub use toggle::ToggleError;
pub use trace_pipe::{LineSource, PipeReader};

/// Utility function to log an error with all its sources as a warning.
///
/// By default Rust won't print the source of an error message, making it much
/// less useful. Instead of re-implementing that, we'll just use anyhow as an
/// error pretty-printer.
pub fn log_warning<E: std::error::Error + Send + Sync + 'static>(msg: &str, err: E) {
    log::warn!("{}: {:#}", msg, anyhow::Error::from(err));
}

pub use nix::unistd::Pid;
