//! Killtracer logs every `kill(2)` call made on the machine, with the user
//! behind it.
//!
//! It enables the `sys_enter_kill` and `sys_exit_kill` syscall tracepoints,
//! reads the kernel `trace_pipe` and pairs entry and exit records into
//! [events](kill_monitor::TraceEvent). A background task makes sure nobody
//! turns the tracepoints off while we run; on exit the tracepoints are put
//! back the way we found them.
//!
//! ```sh
//! # Needs root to write tracefs
//! killtracer -v
//! ```
//!
//! ## Configuration
//!
//! An optional `INI` file (`/etc/killtracer/killtracer.ini`, or the one
//! passed with `--config-file`) with a `[killtracer]` section:
//!
//! - `tracefs_dir`: tracefs mount point, detected by default.
//! - `proc_dir`: procfs mount point, `/proc` by default.
//! - `watch_interval`: seconds between tracepoint checks, `10` by default.
//! - `output_format`: `plaintext` or `json`.
//! - `console`: print events on stdout, `true` by default.

pub mod cli;
pub mod killtracerd;
pub mod utils;

pub mod metadata {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Init logger. We log from info level and above.
/// If RUST_LOG is set, we assume the user wants to debug something
/// and use env_logger default behaviour.
pub fn init_logger(override_log_level: Option<log::LevelFilter>) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    } else {
        let level_filter = override_log_level.unwrap_or(log::LevelFilter::Info);

        env_logger::builder().filter_level(level_filter).init();
    }
}
