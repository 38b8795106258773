// Platform gate. The lifecycle is defined in terms of fork/setsid/flock and
// the syslog unix socket, so there is no non-Unix backend.

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(not(unix))]
compile_error!("daemon_kit only supports Unix-like platforms");
