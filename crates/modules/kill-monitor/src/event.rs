use std::fmt;

use serde::{Serialize, Serializer};
use tracefs_common::Pid;

/// One `kill(2)` invocation, built from a `sys_kill` entry record and the
/// matching exit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    #[serde(serialize_with = "serialize_pid")]
    pub source_pid: Pid,
    pub source_name: String,
    /// Real user id of the sender, `None` when unknown.
    pub source_uid: Option<u32>,
    /// Effective user id of the sender, `None` when unknown.
    pub source_euid: Option<u32>,
    #[serde(serialize_with = "serialize_opt_pid")]
    pub source_ppid: Option<Pid>,
    /// Process (or process group, when negative) receiving the signal.
    pub target_pid: i64,
    pub signal: i64,
    /// Return value of the syscall: 0 on success, -1 on failure.
    pub exit_value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Signal 0: only checks that the target exists, nothing is delivered.
    LivenessProbe,
    Signal,
}

impl TraceEvent {
    pub fn kind(&self) -> EventKind {
        if self.signal == 0 {
            EventKind::LivenessProbe
        } else {
            EventKind::Signal
        }
    }
}

impl EventKind {
    pub fn log_level(self) -> log::Level {
        match self {
            EventKind::LivenessProbe => log::Level::Debug,
            EventKind::Signal => log::Level::Info,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::LivenessProbe => write!(f, "liveness probe"),
            EventKind::Signal => write!(f, "signal detected"),
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signal[{}] exit[0x{:X}] target[{}] source[{}-{}]",
            self.signal, self.exit_value, self.target_pid, self.source_name, self.source_pid
        )?;
        match (self.source_uid, self.source_euid) {
            (Some(uid), Some(euid)) => write!(f, " sourceUid[{uid}] sourceEuid[{euid}]"),
            _ => write!(f, " sourceUid[??] sourceEuid[??]"),
        }
    }
}

fn serialize_pid<S: Serializer>(pid: &Pid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i32(pid.as_raw())
}

fn serialize_opt_pid<S: Serializer>(pid: &Option<Pid>, serializer: S) -> Result<S::Ok, S::Error> {
    match pid {
        Some(pid) => serializer.serialize_some(&pid.as_raw()),
        None => serializer.serialize_none(),
    }
}
