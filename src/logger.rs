use std::sync::Mutex;

use log::{Level, LevelFilter};
use syslog::{Facility, Formatter3164, LoggerBackend};

use crate::error::DaemonResult;

/// A sink accepting leveled text lines.
///
/// The daemon core logs through this seam only; the syslog-backed [`Logger`]
/// is the production implementation, and anything else (a test collector, an
/// alternative transport) can stand in for it.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

type Transport = syslog::Logger<LoggerBackend, Formatter3164>;

/// Leveled logger writing RFC 3164 lines to the system log socket.
///
/// One connection per daemon identity. The application name becomes the
/// syslog process tag, so delivered lines read
/// `<timestamp> <applicationName>: <message>`. Records below the resolved
/// level are dropped before they reach the socket.
pub struct Logger {
    level: LevelFilter,
    transport: Mutex<Transport>,
}

impl Logger {
    /// Opens the system log socket for `app` at the given level.
    ///
    /// `syslog::unix` probes the platform socket paths (`/dev/log`, then
    /// `/var/run/syslog`). Failure here is fatal to construction: a daemon
    /// without its log transport would be silent for its whole life.
    pub fn open(app: &str, level: LevelFilter) -> DaemonResult<Self> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: app.to_owned(),
            pid: 0,
        };
        let transport = syslog::unix(formatter)?;
        Ok(Logger {
            level,
            transport: Mutex::new(transport),
        })
    }

    /// The level this logger was resolved to at construction.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

impl LogSink for Logger {
    fn log(&self, level: Level, message: &str) {
        if !enabled(level, self.level) {
            return;
        }
        let Ok(mut transport) = self.transport.lock() else {
            return;
        };
        // Once detached there is nowhere left to report a transport write
        // failure, so the result is dropped.
        let _ = match level {
            Level::Error => transport.err(message.to_owned()),
            Level::Warn => transport.warning(message.to_owned()),
            Level::Info => transport.info(message.to_owned()),
            Level::Debug | Level::Trace => transport.debug(message.to_owned()),
        };
    }
}

fn enabled(level: Level, filter: LevelFilter) -> bool {
    level <= filter
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use log::Level;

    use super::LogSink;

    /// Collects records in memory so tests can assert on them.
    #[derive(Default)]
    pub struct CaptureSink {
        pub records: Mutex<Vec<(Level, String)>>,
    }

    impl CaptureSink {
        pub fn lines(&self) -> Vec<(Level, String)> {
            self.records.lock().unwrap().clone()
        }
    }

    impl LogSink for CaptureSink {
        fn log(&self, level: Level, message: &str) {
            self.records
                .lock()
                .unwrap()
                .push((level, message.to_owned()));
        }
    }
}
