//! Read and write tracefs control files holding a single integer, like
//! `events/syscalls/sys_enter_kill/enable`.

use std::{fs, io, num::ParseIntError, path::Path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToggleError {
    #[error("reading {path} failed")]
    Read {
        #[source]
        source: io::Error,
        path: String,
    },
    #[error("content of {path} is not an integer: {value:?}")]
    Parse {
        #[source]
        source: ParseIntError,
        path: String,
        value: String,
    },
    #[error("writing {value} to {path} failed")]
    Write {
        #[source]
        source: io::Error,
        path: String,
        value: i64,
    },
}

/// Read the current value of a toggle.
pub fn read_toggle(path: &Path) -> Result<i64, ToggleError> {
    let content = fs::read_to_string(path).map_err(|source| ToggleError::Read {
        source,
        path: path.display().to_string(),
    })?;
    let value = content.trim();
    value.parse().map_err(|source| ToggleError::Parse {
        source,
        path: path.display().to_string(),
        value: value.to_string(),
    })
}

/// Overwrite a toggle with the given value, newline terminated.
pub fn write_toggle(path: &Path, value: i64) -> Result<(), ToggleError> {
    log::debug!("Writing {} to {}", value, path.display());
    fs::write(path, format!("{value}\n")).map_err(|source| ToggleError::Write {
        source,
        path: path.display().to_string(),
        value,
    })
}

/// Set a toggle to `1`. When `old` is given the previous value is read into
/// it first; failing to read it aborts before anything is written.
pub fn enable_toggle(path: &Path, old: Option<&mut i64>) -> Result<(), ToggleError> {
    if let Some(old) = old {
        *old = read_toggle(path)?;
        log::info!("Old value of {} was {}", path.display(), old);
    }
    write_toggle(path, 1)
}

/// Put back a value previously captured by [`enable_toggle`].
pub fn disable_toggle(path: &Path, old: i64) -> Result<(), ToggleError> {
    write_toggle(path, old)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn toggle_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enable");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn read_trims_whitespace() {
        let (_dir, path) = toggle_file("  1\n");
        assert_eq!(read_toggle(&path).unwrap(), 1);
    }

    #[test]
    fn read_garbage_is_an_error() {
        let (_dir, path) = toggle_file("on\n");
        assert!(matches!(
            read_toggle(&path),
            Err(ToggleError::Parse { value, .. }) if value == "on"
        ));
    }

    #[test]
    fn read_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_toggle(&dir.path().join("enable")),
            Err(ToggleError::Read { .. })
        ));
    }

    #[test]
    fn enable_without_capture() {
        let (_dir, path) = toggle_file("0\n");
        enable_toggle(&path, None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\n");
    }

    #[test]
    fn enable_capture_failure_writes_nothing() {
        let (_dir, path) = toggle_file("garbage");
        let mut old = -1;
        assert!(enable_toggle(&path, Some(&mut old)).is_err());
        assert_eq!(old, -1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
    }

    #[test]
    fn enable_then_disable_restores_content() {
        for original in ["0\n", "1\n", "7\n", "-3\n"] {
            let (_dir, path) = toggle_file(original);
            let mut old = -1;
            enable_toggle(&path, Some(&mut old)).unwrap();
            assert_eq!(fs::read_to_string(&path).unwrap(), "1\n");
            disable_toggle(&path, old).unwrap();
            assert_eq!(fs::read_to_string(&path).unwrap(), original);
        }
    }
}
