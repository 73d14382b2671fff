use std::ffi::OsString;

use clap::{ArgAction, Parser};

pub const NAME: &str = "killtracer";

#[derive(Parser, Debug, Clone)]
#[clap(name = NAME)]
#[clap(about = "Log every kill(2) call seen by the kernel")]
#[clap(version = crate::metadata::VERSION)]
#[clap(disable_help_subcommand = true)]
pub struct KillTracerOpts {
    #[clap(long)]
    pub config_file: Option<String>,

    /// Pass many times for a more verbose output. Passing `-v` adds debug logs, `-vv` enables trace logging
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl KillTracerOpts {
    pub fn log_level(&self) -> log::LevelFilter {
        log_level_from_verbosity_flag_count(self.verbose)
    }
}

pub fn parse_from_args() -> KillTracerOpts {
    parse_from(std::env::args_os())
}

pub fn parse_from<I, T>(args: I) -> KillTracerOpts
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    try_parse_from(args).unwrap_or_else(|e| e.exit())
}

pub fn try_parse_from<I, T>(args: I) -> Result<KillTracerOpts, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    KillTracerOpts::try_parse_from(args)
}

fn log_level_from_verbosity_flag_count(num: u8) -> log::LevelFilter {
    match num {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        2..=u8::MAX => log::LevelFilter::Trace,
    }
}
