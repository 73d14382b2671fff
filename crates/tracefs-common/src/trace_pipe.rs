//! Line reader for the tracefs `trace_pipe` file.
//!
//! Reads on `trace_pipe` block until the kernel has something to say and
//! sometimes fail with transient errors (e.g. `EINTR`). [`PipeReader`] hides
//! those by reopening the file once and trying again. A second failure is
//! returned to the caller: if tracefs went away we must not spin forever.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

/// Name of the trace pipe file inside a tracefs mount.
pub const TRACE_PIPE: &str = "trace_pipe";

/// A source of text lines, without the trailing newline.
pub trait LineSource {
    fn read_line(&mut self) -> io::Result<String>;
}

type Opener<R> = Box<dyn FnMut(&Path) -> io::Result<R> + Send>;

pub struct PipeReader<R = File> {
    path: PathBuf,
    opener: Opener<R>,
    reader: Option<BufReader<R>>,
}

impl PipeReader<File> {
    /// Returns a new, unopened reader on the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_opener(path, |path: &Path| File::open(path))
    }
}

impl<R: Read> PipeReader<R> {
    /// Returns a new, unopened reader which uses `opener` every time the
    /// underlying file has to be (re)opened.
    pub fn with_opener<F>(path: impl Into<PathBuf>, opener: F) -> Self
    where
        F: FnMut(&Path) -> io::Result<R> + Send + 'static,
    {
        Self {
            path: path.into(),
            opener: Box::new(opener),
            reader: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn open(&mut self) -> io::Result<()> {
        let file = (self.opener)(&self.path)?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    pub fn close(&mut self) {
        self.reader = None;
    }

    /// Read one line. On failure the file is closed, reopened and the read
    /// is attempted a second time. If that fails too the reader is left
    /// closed and the error is returned: a closed reader is never reopened
    /// here, call [`PipeReader::open`] first.
    pub fn read_line(&mut self) -> io::Result<String> {
        if self.reader.is_none() {
            return Err(not_open());
        }
        let line = match self.try_read_line() {
            Ok(line) => line,
            Err(e) => {
                log::warn!(
                    "Error reading {}; will try to reopen: {}",
                    self.path.display(),
                    e
                );
                self.close();
                if let Err(e) = self.open() {
                    log::warn!("Could not re-open {}: {}", self.path.display(), e);
                    return Err(e);
                }
                match self.try_read_line() {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("Error reading {} after re-open: {}", self.path.display(), e);
                        self.close();
                        return Err(e);
                    }
                }
            }
        };
        log::trace!("Got {} line: {}", TRACE_PIPE, line);
        Ok(line)
    }

    fn try_read_line(&mut self) -> io::Result<String> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(not_open)?;

        let mut buf = Vec::with_capacity(256);
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "pipe is not open")
}

impl<R: Read> LineSource for PipeReader<R> {
    fn read_line(&mut self) -> io::Result<String> {
        PipeReader::read_line(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    /// Reader yielding a scripted sequence of chunks and errors.
    struct Scripted(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    fn interrupted() -> io::Result<Vec<u8>> {
        Err(io::Error::other("interrupted read"))
    }

    /// Build a reader whose n-th open returns the n-th script. Opening more
    /// times than scripted fails with NotFound.
    fn scripted_reader(
        scripts: Vec<Vec<io::Result<Vec<u8>>>>,
    ) -> (PipeReader<Scripted>, Arc<Mutex<usize>>) {
        let opens = Arc::new(Mutex::new(0));
        let counter = opens.clone();
        let mut scripts: VecDeque<_> = scripts.into();
        let reader = PipeReader::with_opener("trace_pipe", move |_: &Path| {
            *counter.lock().unwrap() += 1;
            scripts
                .pop_front()
                .map(|script| Scripted(script.into()))
                .ok_or_else(|| io::ErrorKind::NotFound.into())
        });
        (reader, opens)
    }

    #[test]
    fn strips_newline() {
        let (mut reader, _) = scripted_reader(vec![vec![Ok(b"a line\nnext\n".to_vec())]]);
        reader.open().unwrap();
        assert_eq!(reader.read_line().unwrap(), "a line");
        assert_eq!(reader.read_line().unwrap(), "next");
    }

    #[test]
    fn recovers_from_one_failure() {
        let (mut reader, opens) = scripted_reader(vec![
            vec![interrupted()],
            vec![Ok(b"sys_kill -> 0x0\n".to_vec())],
        ]);
        reader.open().unwrap();
        assert_eq!(reader.read_line().unwrap(), "sys_kill -> 0x0");
        assert!(reader.is_open());
        assert_eq!(*opens.lock().unwrap(), 2);
    }

    #[test]
    fn gives_up_after_second_failure() {
        let (mut reader, opens) =
            scripted_reader(vec![vec![interrupted()], vec![interrupted()], vec![]]);
        reader.open().unwrap();
        assert!(reader.read_line().is_err());
        assert!(!reader.is_open());
        assert_eq!(*opens.lock().unwrap(), 2);
    }

    #[test]
    fn gives_up_when_reopen_fails() {
        let (mut reader, _) = scripted_reader(vec![vec![interrupted()]]);
        reader.open().unwrap();
        let err = reader.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!reader.is_open());
    }

    #[test]
    fn end_of_file_is_a_failure() {
        let (mut reader, opens) = scripted_reader(vec![vec![], vec![Ok(b"again\n".to_vec())]]);
        reader.open().unwrap();
        assert_eq!(reader.read_line().unwrap(), "again");
        assert_eq!(*opens.lock().unwrap(), 2);
    }

    #[test]
    fn closed_reader_does_not_read() {
        let (mut reader, opens) = scripted_reader(vec![vec![Ok(b"line\n".to_vec())]]);
        let err = reader.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(*opens.lock().unwrap(), 0);
    }

    #[test]
    fn no_recovery_after_giving_up() {
        let (mut reader, opens) = scripted_reader(vec![
            vec![interrupted()],
            vec![interrupted()],
            vec![Ok(b"too late\n".to_vec())],
        ]);
        reader.open().unwrap();
        assert!(reader.read_line().is_err());

        let err = reader.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(!reader.is_open());
        assert_eq!(*opens.lock().unwrap(), 2);
    }

    #[test]
    fn reads_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRACE_PIPE);
        std::fs::write(&path, "first\nsecond\n").unwrap();

        let mut reader = PipeReader::new(&path);
        reader.open().unwrap();
        assert_eq!(reader.read_line().unwrap(), "first");
        assert_eq!(reader.read_line().unwrap(), "second");
    }
}
