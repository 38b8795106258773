use std::fmt;
use std::fs;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};

use log::{Level, LevelFilter};

use crate::error::{DaemonError, DaemonResult};
use crate::logger::{LogSink, Logger};
use crate::registry;
use crate::stdio;
use crate::sys;

/// Logging configuration, resolved exactly once at construction.
///
/// Precedence: the debug flag wins over an explicit level override, which
/// wins over the ERROR default.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Forces DEBUG level regardless of `log_level`.
    pub debug: bool,
    /// Explicit level override, consulted when `debug` is off.
    pub log_level: Option<LevelFilter>,
}

impl Config {
    pub(crate) fn resolve_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if let Some(level) = self.log_level {
            level
        } else {
            LevelFilter::Error
        }
    }
}

/// The operations a daemon application supplies.
///
/// `run` is the daemon body and blocks for its operational lifetime. The two
/// hooks are called from the signal-dispatch thread while `run` is still
/// executing, so they take `&self`; implementations needing mutable state
/// bring their own interior mutability.
pub trait Service: Send + Sync {
    fn run(&self);

    /// Extra shutdown work on the terminate signal, before the pidfile is
    /// removed. The base terminate action (WARN line, pidfile removal, lock
    /// release) happens around this hook either way.
    fn on_terminate(&self) {}

    /// Reload work on the reload signal. The daemon keeps running.
    fn on_reload(&self) {}
}

/// Plain closures are services with the default hooks.
impl<F> Service for F
where
    F: Fn() + Send + Sync,
{
    fn run(&self) {
        self()
    }
}

/// Configures and launches a background daemon.
///
/// Construction opens the syslog connection for the application name; the
/// process-table work all happens in [`Daemon::start`].
pub struct Daemon {
    app: String,
    pid_file: PathBuf,
    level: LevelFilter,
    logger: Arc<Logger>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Manual impl because the syslog transport has no Debug.
        f.debug_struct("Daemon")
            .field("app", &self.app)
            .field("pid_file", &self.pid_file)
            .field("level", &self.level)
            .finish()
    }
}

impl Daemon {
    /// Creates a daemon identity with the default [`Config`].
    pub fn new<P: Into<PathBuf>>(app: &str, pid_file: P) -> DaemonResult<Self> {
        Self::with_config(app, pid_file, Config::default())
    }

    /// Creates a daemon identity with explicit logging configuration.
    ///
    /// Fails fast if the system log socket is unreachable; nothing else is
    /// touched at construction time.
    pub fn with_config<P: Into<PathBuf>>(
        app: &str,
        pid_file: P,
        config: Config,
    ) -> DaemonResult<Self> {
        if app.is_empty() {
            return Err(DaemonError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "application name must not be empty",
            )));
        }
        let level = config.resolve_level();
        let logger = Arc::new(Logger::open(app, level)?);
        Ok(Daemon {
            app: app.to_owned(),
            pid_file: pid_file.into(),
            level,
            logger,
        })
    }

    // --- Public Getters ---

    pub fn app_name(&self) -> &str {
        &self.app
    }

    pub fn pid_file_path(&self) -> &Path {
        &self.pid_file
    }

    pub fn log_level(&self) -> LevelFilter {
        self.level
    }

    /// The syslog-backed logger this daemon writes through. Shared with the
    /// stream capture threads; never closed by the daemon.
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Detaches into the background and runs `service`.
    ///
    /// The full lifecycle, in order: register with the process-wide registry,
    /// double-fork (each intermediate parent exits 0, fork failure logs and
    /// exits 1), become session leader, chdir to `/`, umask 022, rebind the
    /// standard streams into the logger, take the exclusive pidfile lock
    /// (immediate [`DaemonError::TargetLocked`] if another instance holds
    /// it), install the SIGTERM/SIGHUP dispatch thread, then block in
    /// `service.run()`.
    pub fn start<S: Service + 'static>(self, service: S) -> DaemonResult<()> {
        let running = Arc::new(RunningDaemon::new(
            self.app.clone(),
            self.pid_file.clone(),
            self.logger.clone() as Arc<dyn LogSink>,
            Box::new(service),
        ));
        registry::register(Arc::clone(&running));

        // Fork #1: kill off the parent so the shell gets its prompt back.
        match sys::unix::fork() {
            Ok(pid) if pid > 0 => process::exit(0),
            Ok(_) => {}
            Err(err) => {
                self.logger.error(&format!("fork #1 failed: {}", err));
                process::exit(1);
            }
        }
        self.logger.debug("fork #1 succeful.");

        sys::unix::setsid()?;
        // Never hold a lock on a removable directory.
        sys::unix::chdir("/")?;
        sys::unix::set_umask(0o022);

        // Fork #2: a session leader can reacquire a controlling terminal,
        // its child cannot.
        match sys::unix::fork() {
            Ok(pid) if pid > 0 => process::exit(0),
            Ok(_) => {}
            Err(err) => {
                self.logger.error(&format!("fork #2 failed: {}", err));
                process::exit(1);
            }
        }
        self.logger.debug("fork #2 succeful.");

        let sink: Arc<dyn LogSink> = self.logger.clone();
        stdio::redirect_standard_streams(&sink)?;

        let mut lock = sys::unix::lock_pid_file(&self.pid_file)?;
        let pid = process::id();
        // Advisory documentation for operators; the lock itself lives on the
        // descriptor, not the text.
        write!(lock, "{}", pid)?;
        lock.flush()?;
        running.store_lock(lock);

        // Only now: a signal must never trigger cleanup of a lock that was
        // never acquired.
        registry::install_signal_handlers(sink)?;

        self.logger
            .info(&format!("Daemonized succefuly, PID={}", pid));

        running.run();
        Ok(())
    }
}

/// A daemon that completed registration: what the signal dispatchers operate
/// on. Owns the pidfile lock handle for the life of the process.
pub(crate) struct RunningDaemon {
    app: String,
    pid_file: PathBuf,
    logger: Arc<dyn LogSink>,
    lock: Mutex<Option<File>>,
    service: Box<dyn Service>,
}

impl fmt::Debug for RunningDaemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningDaemon")
            .field("app", &self.app)
            .field("pid_file", &self.pid_file)
            .finish()
    }
}

impl RunningDaemon {
    pub(crate) fn new(
        app: String,
        pid_file: PathBuf,
        logger: Arc<dyn LogSink>,
        service: Box<dyn Service>,
    ) -> Self {
        RunningDaemon {
            app,
            pid_file,
            logger,
            lock: Mutex::new(None),
            service,
        }
    }

    fn store_lock(&self, file: File) {
        if let Ok(mut slot) = self.lock.lock() {
            *slot = Some(file);
        }
    }

    pub(crate) fn run(&self) {
        self.service.run();
    }

    /// The terminate path: WARN line, the service hook, then pidfile
    /// removal. A removal failure propagates untouched; this instance stays
    /// registered and keeps its lock, and callers wanting softer behavior
    /// harden their own `on_terminate`.
    pub(crate) fn terminate(&self) -> DaemonResult<()> {
        self.logger
            .log(Level::Warn, "Caught signal TERM. Stopping daemon.");
        self.service.on_terminate();
        fs::remove_file(&self.pid_file)?;
        if let Ok(mut slot) = self.lock.lock() {
            // Dropping the handle releases the advisory lock.
            slot.take();
        }
        registry::remove(self);
        Ok(())
    }

    /// The reload path: WARN line and the service hook. No registry removal,
    /// no pidfile deletion, no exit.
    pub(crate) fn reload(&self) {
        self.logger
            .log(Level::Warn, "Caught signal HUP. Reloading.");
        self.service.on_reload();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::logger::test_support::CaptureSink;

    struct FlaggedService {
        terminated: Arc<AtomicBool>,
        reloaded: Arc<AtomicBool>,
    }

    impl FlaggedService {
        /// Returns the service plus handles the test keeps after the box
        /// takes ownership.
        fn new() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
            let terminated = Arc::new(AtomicBool::new(false));
            let reloaded = Arc::new(AtomicBool::new(false));
            let service = FlaggedService {
                terminated: Arc::clone(&terminated),
                reloaded: Arc::clone(&reloaded),
            };
            (service, terminated, reloaded)
        }
    }

    impl Service for FlaggedService {
        fn run(&self) {}

        fn on_terminate(&self) {
            self.terminated.store(true, Ordering::SeqCst);
        }

        fn on_reload(&self) {
            self.reloaded.store(true, Ordering::SeqCst);
        }
    }

    fn unregistered_daemon(
        pid_file: PathBuf,
        service: Box<dyn Service>,
    ) -> (Arc<CaptureSink>, RunningDaemon) {
        let sink = Arc::new(CaptureSink::default());
        let daemon = RunningDaemon::new(
            "svc".to_owned(),
            pid_file,
            sink.clone() as Arc<dyn LogSink>,
            service,
        );
        (sink, daemon)
    }

    #[test]
    fn debug_flag_wins_over_explicit_level() {
        let config = Config {
            debug: true,
            log_level: Some(LevelFilter::Warn),
        };
        assert_eq!(config.resolve_level(), LevelFilter::Debug);
    }

    #[test]
    fn explicit_level_wins_over_default() {
        let config = Config {
            debug: false,
            log_level: Some(LevelFilter::Info),
        };
        assert_eq!(config.resolve_level(), LevelFilter::Info);
    }

    #[test]
    fn default_level_is_error() {
        assert_eq!(Config::default().resolve_level(), LevelFilter::Error);
    }

    #[test]
    fn empty_application_name_is_rejected() {
        match Daemon::new("", "/tmp/unused.pid") {
            Err(DaemonError::Io(err)) => {
                assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            }
            Ok(_) => panic!("empty name must not construct"),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn closures_are_services() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let service: Box<dyn Service> = Box::new(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        });
        service.run();
        // Default hooks are no-ops.
        service.on_terminate();
        service.on_reload();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminate_warns_runs_hook_and_deletes_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("svc.pid");
        fs::write(&pid_file, "123").unwrap();

        let (service, terminated, reloaded) = FlaggedService::new();
        let (sink, daemon) = unregistered_daemon(pid_file.clone(), Box::new(service));

        daemon.terminate().unwrap();

        assert_eq!(
            sink.lines(),
            vec![(Level::Warn, "Caught signal TERM. Stopping daemon.".to_owned())]
        );
        assert!(!pid_file.exists());
        assert!(terminated.load(Ordering::SeqCst));
        assert!(!reloaded.load(Ordering::SeqCst));
    }

    #[test]
    fn terminate_failure_on_missing_pidfile_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("never-created.pid");

        let (service, terminated, _reloaded) = FlaggedService::new();
        let (sink, daemon) = unregistered_daemon(pid_file, Box::new(service));

        match daemon.terminate() {
            Err(DaemonError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::NotFound),
            other => panic!("expected Io(NotFound), got {:?}", other),
        }
        // The WARN line and the hook still ran before the failure.
        assert_eq!(
            sink.lines(),
            vec![(Level::Warn, "Caught signal TERM. Stopping daemon.".to_owned())]
        );
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[test]
    fn reload_warns_runs_hook_and_keeps_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("svc.pid");
        fs::write(&pid_file, "123").unwrap();

        let (service, terminated, reloaded) = FlaggedService::new();
        let (sink, daemon) = unregistered_daemon(pid_file.clone(), Box::new(service));

        daemon.reload();

        assert_eq!(
            sink.lines(),
            vec![(Level::Warn, "Caught signal HUP. Reloading.".to_owned())]
        );
        assert!(pid_file.exists());
        assert!(reloaded.load(Ordering::SeqCst));
        assert!(!terminated.load(Ordering::SeqCst));
    }

    #[test]
    fn terminate_releases_the_pidfile_lock() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("svc.pid");

        let (service, _terminated, _reloaded) = FlaggedService::new();
        let (_sink, daemon) = unregistered_daemon(pid_file.clone(), Box::new(service));
        let lock = sys::unix::lock_pid_file(&pid_file).unwrap();
        daemon.store_lock(lock);

        daemon.terminate().unwrap();

        // Relocking succeeds only if terminate dropped the old handle.
        sys::unix::lock_pid_file(&pid_file).unwrap();
    }
}
