use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use crate::error::{DaemonError, DaemonResult};

fn syscall_error(call: &'static str) -> DaemonError {
    DaemonError::SyscallError {
        call,
        errno: io::Error::last_os_error().raw_os_error().unwrap_or(0),
    }
}

/// Duplicates the process. Returns the child pid in the parent and 0 in the
/// child, like the underlying call.
pub(crate) fn fork() -> DaemonResult<libc::pid_t> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        Err(syscall_error("fork"))
    } else {
        Ok(pid)
    }
}

/// Makes the calling process a session leader, detaching it from the
/// controlling terminal.
pub(crate) fn setsid() -> DaemonResult<()> {
    if unsafe { libc::setsid() } < 0 {
        return Err(syscall_error("setsid"));
    }
    Ok(())
}

pub(crate) fn set_umask(mask: libc::mode_t) {
    unsafe {
        libc::umask(mask);
    }
}

pub(crate) fn chdir(path: &str) -> DaemonResult<()> {
    let cpath = CString::new(path).map_err(|_| {
        DaemonError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Invalid working directory path",
        ))
    })?;
    if unsafe { libc::chdir(cpath.as_ptr()) } < 0 {
        return Err(DaemonError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Rebinds `target_fd` to the null device.
pub(crate) fn redirect_to_devnull(target_fd: libc::c_int) -> DaemonResult<()> {
    let path = CString::new("/dev/null").expect("static path");
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(DaemonError::Io(io::Error::last_os_error()));
    }

    if unsafe { libc::dup2(fd, target_fd) } < 0 {
        let err = DaemonError::Io(io::Error::last_os_error());
        unsafe { libc::close(fd) };
        return Err(err);
    }

    unsafe { libc::close(fd) };
    Ok(())
}

pub(crate) fn pipe() -> DaemonResult<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(syscall_error("pipe"));
    }
    Ok((fds[0], fds[1]))
}

pub(crate) fn dup2(src: RawFd, dst: RawFd) -> DaemonResult<()> {
    if unsafe { libc::dup2(src, dst) } < 0 {
        return Err(syscall_error("dup2"));
    }
    Ok(())
}

pub(crate) fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Opens the pidfile and takes the exclusive advisory lock on it.
///
/// LOCK_NB means contention fails immediately instead of queueing; the
/// returned handle is what holds the lock, so it must stay open for the
/// daemon's lifetime.
pub(crate) fn lock_pid_file(path: &Path) -> DaemonResult<File> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } < 0 {
        return Err(DaemonError::TargetLocked);
    }

    Ok(file)
}
