//! Non-blocking mode setter.
//!
//! Sets `O_NONBLOCK` on a descriptor while preserving every other status
//! flag. Done through raw fcntl rather than `set_nonblocking` on the socket
//! types so the contract is explicit: idempotent (no redundant syscall when
//! the flag is already set) and transparent retry on `EINTR` — for these two
//! fcntl calls only, never for the I/O paths.

use std::io;
use std::os::unix::io::AsRawFd;

/// Ensure `O_NONBLOCK` is set on `fd`, leaving all other flags untouched.
pub fn set_nonblocking(fd: &impl AsRawFd) -> io::Result<()> {
    let fd = fd.as_raw_fd();

    let flags = fcntl_retry(|| unsafe { libc::fcntl(fd, libc::F_GETFL) })?;

    // Bail out now if already set.
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    fcntl_retry(|| unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

/// Run an fcntl call, retrying while it fails with `EINTR`.
fn fcntl_retry(mut call: impl FnMut() -> libc::c_int) -> io::Result<libc::c_int> {
    loop {
        let r = call();
        if r != -1 {
            return Ok(r);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
