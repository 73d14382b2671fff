//! The [`EventSender`] trait is used by the [`crate::Correlator`] to hand
//! over completed events.
//!
//! [`EventSender::send`] must not block: the trace pipe keeps filling up
//! while we wait.

use std::{
    io::{self, Write},
    str::FromStr,
};

use thiserror::Error;

use crate::event::TraceEvent;

pub trait EventSender: Send {
    fn send(&mut self, event: TraceEvent);
}

impl EventSender for Vec<TraceEvent> {
    fn send(&mut self, event: TraceEvent) {
        self.push(event);
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("output format must be one of [plaintext, json], got {0:?}")]
pub struct OutputFormatError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Plaintext,
    Json,
}

impl FromStr for OutputFormat {
    type Err = OutputFormatError;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "plaintext" => Ok(OutputFormat::Plaintext),
            "json" => Ok(OutputFormat::Json),
            _ => Err(OutputFormatError(format.to_string())),
        }
    }
}

impl OutputFormat {
    pub fn format(self, event: &TraceEvent) -> String {
        match self {
            OutputFormat::Plaintext => event.to_string(),
            OutputFormat::Json => serde_json::to_string(event).unwrap_or_else(|e| {
                log::warn!("Error serializing event: {e}");
                event.to_string()
            }),
        }
    }
}

/// Prints every event on a writer, one per line.
pub struct ConsoleSender<W = io::Stdout> {
    format: OutputFormat,
    out: W,
}

impl ConsoleSender {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, io::stdout())
    }
}

impl<W: Write + Send> ConsoleSender<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self { format, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> EventSender for ConsoleSender<W> {
    fn send(&mut self, event: TraceEvent) {
        let line = self.format.format(&event);
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            log::warn!("Error writing event: {e}");
        }
    }
}

/// `None` discards events.
impl<S: EventSender> EventSender for Option<S> {
    fn send(&mut self, event: TraceEvent) {
        if let Some(sender) = self {
            sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracefs_common::Pid;

    fn event() -> TraceEvent {
        TraceEvent {
            source_pid: Pid::from_raw(7),
            source_name: "kill".to_string(),
            source_uid: Some(0),
            source_euid: Some(0),
            source_ppid: None,
            target_pid: 8,
            signal: 9,
            exit_value: 0,
        }
    }

    #[test]
    fn parse_output_format() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("plaintext".parse::<OutputFormat>(), Ok(OutputFormat::Plaintext));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn console_plaintext() {
        let mut sender = ConsoleSender::new(OutputFormat::Plaintext, Vec::<u8>::new());
        sender.send(event());
        assert_eq!(
            String::from_utf8(sender.into_inner()).unwrap(),
            "signal[9] exit[0x0] target[8] source[kill-7] sourceUid[0] sourceEuid[0]\n"
        );
    }

    #[test]
    fn console_json() {
        let mut sender = ConsoleSender::new(OutputFormat::Json, Vec::<u8>::new());
        sender.send(event());
        let out = String::from_utf8(sender.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["signal"], 9);
        assert_eq!(value["source_name"], "kill");
    }

    #[test]
    fn optional_sender() {
        let mut none: Option<Vec<TraceEvent>> = None;
        none.send(event());
        assert_eq!(none, None);

        let mut some = Some(Vec::<TraceEvent>::new());
        some.send(event());
        assert_eq!(some, Some(vec![event()]));
    }
}
