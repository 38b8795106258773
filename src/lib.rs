//! # daemon_kit
//!
//! **daemon_kit** turns a foreground Unix process into a correctly-behaved
//! background daemon: double-fork detachment from the controlling terminal,
//! an exclusive pidfile lock guaranteeing a single running instance,
//! stdout/stderr capture into a syslog-backed leveled logger, and
//! process-wide fan-out of SIGTERM/SIGHUP to every running daemon.
//!
//! ```no_run
//! use daemon_kit::{Daemon, DaemonResult};
//!
//! fn main() -> DaemonResult<()> {
//!     let daemon = Daemon::new("myservice", "/tmp/myservice.pid")?;
//!     daemon.start(|| {
//!         loop {
//!             // captured into syslog at INFO once detached
//!             println!("still alive");
//!             std::thread::sleep(std::time::Duration::from_secs(30));
//!         }
//!     })
//! }
//! ```
//!
//! The workload, configuration loading and argument parsing stay with the
//! application; this crate only owns the detachment lifecycle.

mod daemon;
mod error;
mod logger;
mod registry;
mod stdio;
mod sys;

// Re-export public types to keep the API flat
pub use daemon::{Config, Daemon, Service};
pub use error::{DaemonError, DaemonResult};
pub use log::{Level, LevelFilter};
pub use logger::{LogSink, Logger};
pub use registry::{dispatch_reload, dispatch_terminate};
pub use stdio::StreamRedirector;
