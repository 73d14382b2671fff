//! Utility functions used to extract process identity from procfs

use lazy_static::lazy_static;
use nix::unistd::Pid;
use regex::Regex;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};
use thiserror::Error;

const DEFAULT_PROC_DIR: &str = "/proc";

lazy_static! {
    /// Uid line of `/proc/<pid>/status`: real and effective user id.
    static ref RE_UID: Regex = Regex::new(r"^Uid:\s+(?P<uid>\d+)\s+(?P<euid>\d+)").unwrap();
    /// Task name line of `/proc/<pid>/status`.
    static ref RE_NAME: Regex = Regex::new(r"^Name:\s*(?P<name>\S+)").unwrap();
    /// Parent pid line of `/proc/<pid>/status`.
    static ref RE_PPID: Regex = Regex::new(r"^PPid:\s*(?P<ppid>\d+)").unwrap();
}

#[derive(Error, Debug)]
pub enum ProcfsError {
    #[error("process {pid} not found")]
    NotFound { pid: Pid },

    #[error("reading file failed {path}")]
    Unreadable {
        #[source]
        source: io::Error,
        path: String,
    },
}

/// Point-in-time snapshot of `/proc/<pid>/status`.
///
/// Fields which could not be found or parsed are left as `None` (or an empty
/// name). A snapshot is never cached: the processes we query are usually
/// about to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub name: String,
    pub uid: Option<u32>,
    pub euid: Option<u32>,
}

impl ProcessStatus {
    fn empty(pid: Pid) -> Self {
        Self {
            pid,
            ppid: None,
            name: String::new(),
            uid: None,
            euid: None,
        }
    }
}

/// Something able to tell who a process is.
pub trait IdentityResolver {
    fn resolve(&self, pid: Pid) -> Result<ProcessStatus, ProcfsError>;
}

/// Handle on a mounted procfs.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_DIR)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the status of the given process.
    ///
    /// Possible, but not exhaustive, reasons for failure:
    /// - the process went away before we got here
    /// - procfs is mounted with `hidepid=`
    /// - we are not allowed to read the file
    pub fn process_status(&self, pid: Pid) -> Result<ProcessStatus, ProcfsError> {
        let path = self.root.join(pid.to_string()).join("status");
        let file = File::open(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ProcfsError::NotFound { pid },
            _ => ProcfsError::Unreadable {
                source,
                path: path.display().to_string(),
            },
        })?;

        parse_status(pid, BufReader::new(file)).map_err(|source| ProcfsError::Unreadable {
            source,
            path: path.display().to_string(),
        })
    }
}

impl IdentityResolver for ProcFs {
    fn resolve(&self, pid: Pid) -> Result<ProcessStatus, ProcfsError> {
        self.process_status(pid)
    }
}

/// Parse the content of a status file. Lines can come in any order, unknown
/// lines are skipped and missing fields are not an error.
pub fn parse_status<R: BufRead>(pid: Pid, reader: R) -> io::Result<ProcessStatus> {
    let mut status = ProcessStatus::empty(pid);

    // Task names are raw bytes: a bad name must not hide the uid line.
    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);

        if let Some(caps) = RE_UID.captures(&line) {
            status.uid = caps["uid"].parse().ok();
            status.euid = caps["euid"].parse().ok();
            continue;
        }

        if let Some(caps) = RE_NAME.captures(&line) {
            status.name = caps["name"].to_string();
            continue;
        }

        if let Some(caps) = RE_PPID.captures(&line) {
            status.ppid = caps["ppid"].parse().ok().map(Pid::from_raw);
        }
    }

    Ok(status)
}

#[cfg(test)]
mod test {
    use super::*;

    const STATUS: &str = "Name:\tbash
Umask:\t0022
State:\tS (sleeping)
Tgid:\t4242
Ngid:\t0
Pid:\t4242
PPid:\t4100
TracerPid:\t0
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
";

    fn parse(content: &str) -> ProcessStatus {
        parse_status(Pid::from_raw(4242), content.as_bytes()).unwrap()
    }

    #[test]
    fn parse_full_status() {
        assert_eq!(
            parse(STATUS),
            ProcessStatus {
                pid: Pid::from_raw(4242),
                ppid: Some(Pid::from_raw(4100)),
                name: "bash".to_string(),
                uid: Some(1000),
                euid: Some(1000),
            }
        );
    }

    #[test]
    fn parse_uid_line_only() {
        let status = parse("Uid:\t1000\t1000\n");
        assert_eq!(status.uid, Some(1000));
        assert_eq!(status.euid, Some(1000));
        assert_eq!(status.ppid, None);
        assert_eq!(status.name, "");
    }

    #[test]
    fn parse_non_utf8_name() {
        let status = parse_status(
            Pid::from_raw(7),
            b"Name:\t\xffevil\nUid:\t1000\t1000\nPPid:\t1\n".as_slice(),
        )
        .unwrap();
        assert_eq!(status.uid, Some(1000));
        assert_eq!(status.euid, Some(1000));
        assert_eq!(status.ppid, Some(Pid::from_raw(1)));
        assert_eq!(status.name, "\u{FFFD}evil");
    }

    #[test]
    fn parse_different_real_and_effective_uid() {
        let status = parse("Uid:   1000    0   0   0");
        assert_eq!(status.uid, Some(1000));
        assert_eq!(status.euid, Some(0));
    }

    #[test]
    fn missing_uid_is_not_an_error() {
        let status = parse("Name:\tsleep\nPPid:\t1\n");
        assert_eq!(status.uid, None);
        assert_eq!(status.euid, None);
        assert_eq!(status.name, "sleep");
        assert_eq!(status.ppid, Some(Pid::from_raw(1)));
    }

    #[test]
    fn order_independent() {
        let status = parse("PPid:\t7\nUid:\t5\t6\t6\t6\nName:\tcron\n");
        assert_eq!(status.ppid, Some(Pid::from_raw(7)));
        assert_eq!(status.uid, Some(5));
        assert_eq!(status.euid, Some(6));
        assert_eq!(status.name, "cron");
    }

    #[test]
    fn overflowing_uid_is_left_unset() {
        let status = parse("Uid:\t99999999999\t1\n");
        assert_eq!(status.uid, None);
        assert_eq!(status.euid, Some(1));
    }

    #[test]
    fn read_from_custom_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("4242")).unwrap();
        std::fs::write(dir.path().join("4242/status"), STATUS).unwrap();

        let procfs = ProcFs::new(dir.path());
        let status = procfs.resolve(Pid::from_raw(4242)).unwrap();
        assert_eq!(status.name, "bash");
        assert_eq!(status.uid, Some(1000));
    }

    #[test]
    fn missing_process() {
        let dir = tempfile::tempdir().unwrap();
        let procfs = ProcFs::new(dir.path());
        assert!(matches!(
            procfs.process_status(Pid::from_raw(4242)),
            Err(ProcfsError::NotFound { pid }) if pid == Pid::from_raw(4242)
        ));
    }

    #[test]
    fn read_ourself() {
        let procfs = ProcFs::default();
        if !procfs.root().join("self").exists() {
            return;
        }
        let status = procfs.process_status(nix::unistd::getpid()).unwrap();
        assert_eq!(status.uid, Some(nix::unistd::getuid().as_raw()));
        assert_eq!(status.euid, Some(nix::unistd::geteuid().as_raw()));
    }
}
