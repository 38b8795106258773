use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::sync::Arc;
use std::thread;

use log::Level;

use crate::error::DaemonResult;
use crate::logger::LogSink;
use crate::sys;

/// Write adapter that re-emits anything written to it as log records at a
/// fixed severity.
///
/// Text blocks are split into lines, each line is right-trimmed, and empty
/// lines are dropped; every surviving line becomes exactly one record. This
/// is what keeps legacy `println!`-style output queryable once the terminal
/// is gone.
pub struct StreamRedirector {
    sink: Arc<dyn LogSink>,
    level: Level,
}

impl StreamRedirector {
    pub fn new(sink: Arc<dyn LogSink>, level: Level) -> Self {
        StreamRedirector { sink, level }
    }

    fn emit(&self, block: &str) {
        for line in block.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            self.sink.log(self.level, line);
        }
    }
}

impl Write for StreamRedirector {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Rewires the standard streams of the detached process: stdin reads from
/// the null device, stdout and stderr feed the daemon's logger at INFO and
/// ERROR severity.
pub(crate) fn redirect_standard_streams(sink: &Arc<dyn LogSink>) -> DaemonResult<()> {
    sys::unix::redirect_to_devnull(libc::STDIN_FILENO)?;
    capture_stream(
        libc::STDOUT_FILENO,
        "stdout-capture",
        StreamRedirector::new(Arc::clone(sink), Level::Info),
    )?;
    capture_stream(
        libc::STDERR_FILENO,
        "stderr-capture",
        StreamRedirector::new(Arc::clone(sink), Level::Error),
    )?;
    Ok(())
}

/// Replaces `target_fd` with the write end of a pipe and pumps the read end
/// through `redirector` on a dedicated thread.
///
/// Lines are read whole before being handed over, so a record is never split
/// by a chunk boundary. The thread ends when every copy of the write end is
/// closed, which happens at process exit.
fn capture_stream(
    target_fd: RawFd,
    name: &str,
    mut redirector: StreamRedirector,
) -> DaemonResult<()> {
    let (read_fd, write_fd) = sys::unix::pipe()?;
    sys::unix::dup2(write_fd, target_fd)?;
    sys::unix::close(write_fd);

    let reader = unsafe { File::from_raw_fd(read_fd) };
    thread::Builder::new().name(name.to_owned()).spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let _ = redirector.write(&line);
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })?;
    Ok(())
}
