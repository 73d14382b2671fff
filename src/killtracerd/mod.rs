use std::io;

use anyhow::{Context, Result};
use kill_monitor::{ConsoleSender, Correlator, KillToggles};
use nix::sys::signal::{SigHandler, Signal, signal as set_signal_handler};
use tokio::signal::unix::{SignalKind, signal};
use tracefs_common::{PipeReader, ProcFs, trace_pipe::TRACE_PIPE, tracefs};

use crate::cli::KillTracerOpts;

mod config;

pub use config::{ConfigError, KillTracerConfig, SectionConfig};

pub async fn killtracer_run(options: &KillTracerOpts) -> Result<()> {
    log::trace!("Kill tracer options: {:?}", options);

    ignore_signals()?;

    let config = KillTracerConfig::load(options.config_file.as_deref())?;

    run_with_config(config).await
}

/// Terminal resizes and hangups must not stop the tracer.
fn ignore_signals() -> Result<()> {
    for sig in [Signal::SIGWINCH, Signal::SIGHUP] {
        // SAFETY: SigIgn installs no handler code.
        unsafe { set_signal_handler(sig, SigHandler::SigIgn) }
            .with_context(|| format!("Error ignoring {sig}"))?;
    }
    Ok(())
}

pub async fn run_with_config(config: KillTracerConfig) -> Result<()> {
    let tracefs_dir = config
        .tracefs_dir
        .clone()
        .unwrap_or_else(tracefs::tracefs_dir);
    log::debug!("Using tracefs at {}", tracefs_dir.display());

    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut sig_term = signal(SignalKind::terminate())?;

    // Restored when dropped, so every early return below puts the old values back.
    let enabled = KillToggles::new(&tracefs_dir)
        .enable()
        .context("Could not enable sys_kill tracing; are you root?")?;

    let mut pipe = PipeReader::new(tracefs_dir.join(TRACE_PIPE));
    pipe.open()
        .with_context(|| format!("Could not open {}", pipe.path().display()))?;

    let watcher = enabled.watch(config.watch_interval);

    log::info!("Watching trace pipe for kill signals");
    let resolver = ProcFs::new(&config.proc_dir);
    let mut sender = config
        .console
        .then(|| ConsoleSender::stdout(config.output_format));
    // Reads on the trace pipe block: keep them off the async workers.
    let mut reader_task = tokio::task::spawn_blocking(move || -> io::Result<()> {
        Correlator::new(resolver).run(&mut pipe, &mut sender)
    });

    let result = tokio::select! {
        res = &mut reader_task => match res {
            Ok(res) => res.context("Error reading trace pipe"),
            Err(err) => Err(err).context("Trace pipe reader failed"),
        },
        _ = sig_int.recv() => {
            log::trace!("SIGINT received");
            Ok(())
        }
        _ = sig_term.recv() => {
            log::trace!("SIGTERM received");
            Ok(())
        }
    };

    log::info!("Terminating kill tracer...");
    watcher.stop().await;
    enabled.disable();

    result
}
