//! Turn the `trace_pipe` text stream into [`TraceEvent`]s.
//!
//! With `sys_enter_kill` and `sys_exit_kill` enabled, the kernel writes two
//! lines per `kill(2)` call:
//!
//! ```text
//!            who-21651 [001] .... 1299466.655190: sys_kill(pid: 45db, sig: 0)
//!            who-21651 [001] .... 1299466.655197: sys_kill -> 0x0
//! ```
//!
//! The entry line carries the sender task name and pid (decimal), the target
//! pid and the signal (hex). The exit line repeats the sender and carries the
//! return value (hex). We expect the exit line right after its entry line:
//! calls interleaved from other CPUs are reported as mismatches and dropped.

use std::io;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracefs_common::{IdentityResolver, LineSource, Pid};

use crate::{event::TraceEvent, sender::EventSender};

lazy_static! {
    static ref RE_ENTRY: Regex = Regex::new(
        r"^\s*(?P<comm>.+?)-(?P<pid>\d+)\s.*?: sys_kill\(pid: (?P<target>[0-9a-f]+), sig: (?P<sig>[0-9a-f]+)\)"
    )
    .unwrap();
    static ref RE_EXIT: Regex =
        Regex::new(r"^\s*(?P<comm>.+?)-(?P<pid>\d+)\s.*?: sys_kill -> 0x(?P<ret>[0-9a-f]+)").unwrap();
}

/// The entry half of a `kill(2)` call, waiting for its exit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillEntry {
    pub source_pid: Pid,
    pub source_name: String,
    pub source_uid: Option<u32>,
    pub source_euid: Option<u32>,
    pub source_ppid: Option<Pid>,
    pub target_pid: i64,
    pub signal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KillExit {
    source_pid: Pid,
    source_name: String,
    exit_value: i64,
}

impl KillEntry {
    fn complete(self, exit_value: i64) -> TraceEvent {
        TraceEvent {
            source_pid: self.source_pid,
            source_name: self.source_name,
            source_uid: self.source_uid,
            source_euid: self.source_euid,
            source_ppid: self.source_ppid,
            target_pid: self.target_pid,
            signal: self.signal,
            exit_value,
        }
    }
}

#[derive(Debug)]
enum State {
    AwaitingEntry,
    AwaitingExit { pending: KillEntry, entry_line: String },
}

/// Outcome of feeding a line which completed (or broke) a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Event(TraceEvent),
    /// The line after an entry record was not its exit record.
    Mismatch { entry_line: String, line: String },
}

pub struct Correlator<R> {
    resolver: R,
    state: State,
}

impl<R: IdentityResolver> Correlator<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            state: State::AwaitingEntry,
        }
    }

    /// Whether an entry record is waiting for its exit record.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::AwaitingExit { .. })
    }

    /// Process one line of the trace stream.
    pub fn feed(&mut self, line: &str) -> Option<Correlation> {
        match std::mem::replace(&mut self.state, State::AwaitingEntry) {
            State::AwaitingEntry => {
                let Some(mut pending) = parse_entry(line) else {
                    return None;
                };
                log::debug!("Looks like a sys_kill entry line");
                // Signal 0 never reaches the target, don't bother looking up the sender.
                if pending.signal != 0 {
                    self.resolve_identity(&mut pending);
                }
                self.state = State::AwaitingExit {
                    pending,
                    entry_line: line.to_string(),
                };
                None
            }
            State::AwaitingExit {
                pending,
                entry_line,
            } => match parse_exit(line) {
                Some(exit)
                    if exit.source_name == pending.source_name
                        && exit.source_pid == pending.source_pid =>
                {
                    log::debug!("Looks like the matching sys_kill exit line");
                    Some(Correlation::Event(pending.complete(exit.exit_value)))
                }
                _ => Some(Correlation::Mismatch {
                    entry_line,
                    line: line.to_string(),
                }),
            },
        }
    }

    /// Read the stream until it fails, handing every event to `sender`.
    pub fn run<S, T>(&mut self, source: &mut S, sender: &mut T) -> io::Result<()>
    where
        S: LineSource,
        T: EventSender,
    {
        loop {
            let line = source.read_line()?;
            match self.feed(&line) {
                None => {}
                Some(Correlation::Event(event)) => {
                    let kind = event.kind();
                    log::log!(kind.log_level(), "{}: {}", kind, event);
                    sender.send(event);
                }
                Some(Correlation::Mismatch { entry_line, line }) => {
                    log::warn!(
                        "sys_kill exit record does not match its entry: {:?} followed by {:?}",
                        entry_line,
                        line
                    );
                }
            }
        }
    }

    fn resolve_identity(&self, entry: &mut KillEntry) {
        match self.resolver.resolve(entry.source_pid) {
            Ok(status) => {
                entry.source_uid = status.uid;
                entry.source_euid = status.euid;
                entry.source_ppid = status.ppid;
            }
            Err(e) => log::debug!(
                "Unknown identity for {}-{}: {}",
                entry.source_name,
                entry.source_pid,
                e
            ),
        }
    }
}

fn parse_entry(line: &str) -> Option<KillEntry> {
    let caps = RE_ENTRY.captures(line)?;
    let (source_name, source_pid) = parse_source(&caps)?;
    Some(KillEntry {
        source_pid,
        source_name,
        source_uid: None,
        source_euid: None,
        source_ppid: None,
        target_pid: parse_hex(&caps["target"])?,
        signal: parse_hex(&caps["sig"])?,
    })
}

fn parse_exit(line: &str) -> Option<KillExit> {
    let caps = RE_EXIT.captures(line)?;
    let (source_name, source_pid) = parse_source(&caps)?;
    Some(KillExit {
        source_pid,
        source_name,
        exit_value: parse_hex(&caps["ret"])?,
    })
}

fn parse_source(caps: &Captures<'_>) -> Option<(String, Pid)> {
    let pid = caps["pid"].parse().ok().map(Pid::from_raw)?;
    Some((caps["comm"].trim().to_string(), pid))
}

/// The kernel prints syscall arguments and return values as unsigned longs:
/// negative values show up in two's complement.
fn parse_hex(value: &str) -> Option<i64> {
    u64::from_str_radix(value, 16).ok().map(|v| v as i64)
}
