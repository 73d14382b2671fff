use std::path::{Path, PathBuf};

use procfs::process::Process;

/// Where tracefs lived before it got its own mount point.
pub const LEGACY_TRACEFS_PATH: &str = "/sys/kernel/debug/tracing";
const TRACEFS: &str = "tracefs";

/// Locate the tracefs mount point of the current mount namespace, falling
/// back to the debugfs location if none is found.
pub fn tracefs_dir() -> PathBuf {
    match mounted_tracefs() {
        Ok(Some(path)) => path,
        Ok(None) => {
            log::debug!("No {TRACEFS} mount found, using {LEGACY_TRACEFS_PATH}");
            PathBuf::from(LEGACY_TRACEFS_PATH)
        }
        Err(e) => {
            log::warn!("Error reading mount info, using {LEGACY_TRACEFS_PATH}: {e}");
            PathBuf::from(LEGACY_TRACEFS_PATH)
        }
    }
}

fn mounted_tracefs() -> procfs::ProcResult<Option<PathBuf>> {
    let p_self = Process::myself()?;
    let mount_info = p_self.mountinfo()?;
    Ok(mount_info
        .into_iter()
        .find(|mount| mount.fs_type == TRACEFS && mount.root == "/")
        .map(|mount| mount.mount_point))
}

/// Path of the `enable` toggle of a syscall tracepoint.
pub fn syscall_event_toggle(tracefs: &Path, event: &str) -> PathBuf {
    tracefs
        .join("events")
        .join("syscalls")
        .join(event)
        .join("enable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_path() {
        assert_eq!(
            syscall_event_toggle(Path::new(LEGACY_TRACEFS_PATH), "sys_enter_kill"),
            PathBuf::from("/sys/kernel/debug/tracing/events/syscalls/sys_enter_kill/enable")
        );
    }
}
