//! Monitor `kill(2)` calls through the kernel syscall tracepoints.
//!
//! - [`enabler`] turns on the `sys_enter_kill`/`sys_exit_kill` tracepoints
//!   and keeps them on.
//! - [`correlator`] pairs the entry and exit records read from `trace_pipe`
//!   into [`TraceEvent`]s.
//! - [`sender`] forwards the events.

pub mod correlator;
pub mod enabler;
pub mod event;
pub mod sender;

pub use correlator::{Correlation, Correlator};
pub use enabler::{EnabledTracing, KillToggles, WatchHandle};
pub use event::{EventKind, TraceEvent};
pub use sender::{ConsoleSender, EventSender, OutputFormat};
