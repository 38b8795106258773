use std::fmt;
use std::io;

/// Custom error type for daemon_kit.
/// Provides specific details about why daemonization failed.
#[derive(Debug)]
pub enum DaemonError {
    /// Standard IO errors (pidfile creation, pipe plumbing, etc.)
    Io(io::Error),
    /// The PID lock file is already held by another running instance.
    TargetLocked,
    /// The system log socket could not be opened at construction time.
    LogTransport(syslog::Error),
    /// Specific system call failure (fork, setsid, dup2).
    SyscallError { call: &'static str, errno: i32 },
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Io(err) => write!(f, "IO Error: {}", err),
            DaemonError::TargetLocked => write!(f, "Daemon is already running (Target Locked)"),
            DaemonError::LogTransport(err) => write!(f, "Log transport unavailable: {}", err),
            DaemonError::SyscallError { call, errno } => {
                write!(
                    f,
                    "Syscall '{}' failed: {} {}",
                    call,
                    errno,
                    io::Error::from_raw_os_error(*errno)
                )
            }
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Io(err) => Some(err),
            DaemonError::LogTransport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DaemonError {
    fn from(err: io::Error) -> Self {
        DaemonError::Io(err)
    }
}

impl From<syslog::Error> for DaemonError {
    fn from(err: syslog::Error) -> Self {
        DaemonError::LogTransport(err)
    }
}

/// A specialized Result type for daemon_kit operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
