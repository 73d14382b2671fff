//! Keep the `sys_enter_kill` and `sys_exit_kill` tracepoints enabled.
//!
//! [`KillToggles::enable`] turns both on and returns an [`EnabledTracing`]
//! guard remembering what was there before. The previous values are put back
//! when the guard is disabled or dropped. While the guard is alive,
//! [`EnabledTracing::watch`] starts a background task which turns tracing on
//! again if somebody else turns it off.
//!
//! The entry toggle is always handled before the exit toggle.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    task::JoinHandle,
    time,
};
use tracefs_common::{
    ToggleError, log_warning,
    toggle::{disable_toggle, enable_toggle, read_toggle},
    tracefs::syscall_event_toggle,
};

pub const SYS_ENTER_KILL: &str = "sys_enter_kill";
pub const SYS_EXIT_KILL: &str = "sys_exit_kill";

/// How often the watcher checks that tracing is still enabled.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct KillToggles {
    entry: PathBuf,
    exit: PathBuf,
}

impl KillToggles {
    pub fn new(tracefs: &Path) -> Self {
        Self {
            entry: syscall_event_toggle(tracefs, SYS_ENTER_KILL),
            exit: syscall_event_toggle(tracefs, SYS_EXIT_KILL),
        }
    }

    pub fn entry(&self) -> &Path {
        &self.entry
    }

    pub fn exit(&self) -> &Path {
        &self.exit
    }

    /// Enable kill(2) tracing, both entry and exit, remembering the old values.
    ///
    /// If the exit toggle can't be enabled the entry toggle is put back
    /// before returning the error.
    pub fn enable(self) -> Result<EnabledTracing, ToggleError> {
        log::info!("Enabling kernel sys_kill tracing");

        let mut old_entry = 0;
        let mut old_exit = 0;
        enable_toggle(&self.entry, Some(&mut old_entry))?;
        if let Err(err) = enable_toggle(&self.exit, Some(&mut old_exit)) {
            if let Err(restore_err) = disable_toggle(&self.entry, old_entry) {
                log_warning("Failed to restore sys_kill entry tracing", restore_err);
            }
            return Err(err);
        }

        Ok(EnabledTracing {
            toggles: self,
            old_entry,
            old_exit,
            restored: false,
        })
    }

    /// Read both toggles and enable them again if either is off.
    /// Returns `true` if tracing had to be re-enabled.
    pub fn check(&self) -> Result<bool, ToggleError> {
        let entry = read_toggle(&self.entry)?;
        let exit = read_toggle(&self.exit)?;
        if entry != 0 && exit != 0 {
            return Ok(false);
        }

        log::warn!(
            "Something disabled sys_kill tracing! (entry = {entry}, exit = {exit}) Re-enabling"
        );
        let entry_result = enable_toggle(&self.entry, None);
        let exit_result = enable_toggle(&self.exit, None);
        entry_result.and(exit_result)?;
        Ok(true)
    }
}

/// Kill tracing enabled by us. Dropping it restores the previous state.
#[derive(Debug)]
pub struct EnabledTracing {
    toggles: KillToggles,
    old_entry: i64,
    old_exit: i64,
    restored: bool,
}

impl EnabledTracing {
    /// Values found in the (entry, exit) toggles before we enabled them.
    pub fn old_values(&self) -> (i64, i64) {
        (self.old_entry, self.old_exit)
    }

    /// Start watching the toggles. The returned handle must be stopped
    /// before tracing is disabled, or the watcher could turn it on again.
    pub fn watch(&self, interval: Duration) -> WatchHandle {
        watch(self.toggles.clone(), interval)
    }

    /// Restore the toggles to the values they had before we enabled them.
    pub fn disable(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        log::info!("Restoring kernel sys_kill tracing");
        if let Err(err) = disable_toggle(&self.toggles.entry, self.old_entry) {
            log_warning(
                &format!(
                    "Failed to restore sys_kill entry tracing to old value ({})",
                    self.old_entry
                ),
                err,
            );
        }
        if let Err(err) = disable_toggle(&self.toggles.exit, self.old_exit) {
            log_warning(
                &format!(
                    "Failed to restore sys_kill exit tracing to old value ({})",
                    self.old_exit
                ),
                err,
            );
        }
    }
}

impl Drop for EnabledTracing {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Handle to the watcher task started by [`EnabledTracing::watch`].
pub struct WatchHandle {
    tx_stop: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl WatchHandle {
    /// Signal the watcher to exit and wait until it did.
    pub async fn stop(self) {
        let _ = self.tx_stop.send(());
        if let Err(e) = self.join_handle.await {
            log::warn!("Watcher task failed: {e}");
        }
    }
}

fn watch(toggles: KillToggles, interval: Duration) -> WatchHandle {
    let (tx_stop, mut rx_stop) = oneshot::channel();
    let join_handle = tokio::spawn(async move {
        loop {
            // exit when stopped or when the handle is dropped
            if !matches!(rx_stop.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            let current = toggles.clone();
            match tokio::task::spawn_blocking(move || current.check()).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => log::debug!("Watcher: sys_kill enter/exit tracing still enabled"),
                Ok(Err(err)) => log_warning("Watcher can't keep sys_kill tracing enabled", err),
                Err(err) => log::warn!("Watcher check failed: {err}"),
            }

            log::debug!("Watcher: sleeping {} seconds", interval.as_secs());
            tokio::select! {
                _ = time::sleep(interval) => {}
                _ = &mut rx_stop => break,
            }
        }
        log::debug!("Watcher stopped");
    });

    WatchHandle {
        tx_stop,
        join_handle,
    }
}
