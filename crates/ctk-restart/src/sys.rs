//! Safe wrappers around the few raw system calls restarting needs.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

/// Send `signal` to a single process.
///
/// Non-positive pids address process groups (or every process), so they are
/// refused outright.
pub fn send_signal(pid: i32, signal: libc::c_int) -> io::Result<()> {
    if pid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {pid}"),
        ));
    }
    // SAFETY: kill() takes plain integers and has no memory-safety preconditions.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(pid, signal) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Pid of the process on the other end of a connected unix socket.
pub fn peer_pid(stream: &UnixStream) -> io::Result<i32> {
    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    // SAFETY: `cred` and `len` are live for the call and `len` is exactly the
    // size of the buffer SO_PEERCRED writes into.
    #[allow(unsafe_code)]
    let ret = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            (&raw mut cred).cast::<libc::c_void>(),
            &raw mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    if cred.pid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "socket peer has no pid",
        ));
    }
    Ok(cred.pid)
}
