use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::Level;
use signal_hook::consts::signal::{SIGHUP, SIGTERM};
use signal_hook::iterator::Signals;

use crate::daemon::RunningDaemon;
use crate::error::DaemonResult;
use crate::logger::LogSink;

/// Every daemon that has completed registration and not yet terminated.
/// Entries are only ever removed by their own terminate path.
static DAEMONS: Mutex<Vec<Arc<RunningDaemon>>> = Mutex::new(Vec::new());

static SIGNALS_INSTALLED: AtomicBool = AtomicBool::new(false);

pub(crate) fn register(daemon: Arc<RunningDaemon>) {
    DAEMONS.lock().unwrap().push(daemon);
}

pub(crate) fn remove(daemon: &RunningDaemon) {
    DAEMONS
        .lock()
        .unwrap()
        .retain(|entry| !std::ptr::eq(entry.as_ref(), daemon));
}

#[cfg(test)]
pub(crate) fn contains(daemon: &RunningDaemon) -> bool {
    DAEMONS
        .lock()
        .unwrap()
        .iter()
        .any(|entry| std::ptr::eq(entry.as_ref(), daemon))
}

/// Dispatch iterates a clone of the membership, so hooks never run while the
/// registry lock is held and concurrent registration cannot corrupt the
/// walk.
fn snapshot() -> Vec<Arc<RunningDaemon>> {
    DAEMONS.lock().unwrap().clone()
}

/// Runs the terminate path of every registered daemon, then exits the
/// process with code 0, including when nothing is registered.
///
/// The first failing terminate path aborts dispatch and is returned, leaving
/// the process running; callers that need softer semantics harden their own
/// `on_terminate`.
pub fn dispatch_terminate() -> DaemonResult<()> {
    for daemon in snapshot() {
        daemon.terminate()?;
    }
    process::exit(0);
}

/// Runs the reload path of every registered daemon. Never exits and never
/// changes membership.
pub fn dispatch_reload() {
    for daemon in snapshot() {
        daemon.reload();
    }
}

/// Installs the process-wide SIGTERM/SIGHUP dispatch thread.
///
/// Installed once no matter how many daemons start in this process; a second
/// iterator thread would dispatch every signal twice.
pub(crate) fn install_signal_handlers(logger: Arc<dyn LogSink>) -> DaemonResult<()> {
    if SIGNALS_INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    match spawn_dispatch_thread(logger) {
        Ok(()) => Ok(()),
        Err(err) => {
            SIGNALS_INSTALLED.store(false, Ordering::SeqCst);
            Err(err)
        }
    }
}

fn spawn_dispatch_thread(logger: Arc<dyn LogSink>) -> DaemonResult<()> {
    let mut signals = Signals::new([SIGTERM, SIGHUP])?;
    thread::Builder::new()
        .name("signal-dispatch".to_owned())
        .spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGTERM => {
                        if let Err(err) = dispatch_terminate() {
                            logger.log(
                                Level::Error,
                                &format!("terminate dispatch failed: {}", err),
                            );
                        }
                    }
                    SIGHUP => dispatch_reload(),
                    _ => {}
                }
            }
        })?;
    Ok(())
}
