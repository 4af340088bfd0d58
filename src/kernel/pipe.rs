//! Bidirectional byte pipe with `READABLE|WRITABLE|PEER_CLOSED|HALF_CLOSE`
//! signals (spec.md §6). Realized as an `AF_UNIX`/`SOCK_STREAM`
//! `socketpair(2)`; half-close is `shutdown(SHUT_WR)` on our half.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::error::is_would_block;
use crate::kernel::Signals;

#[derive(Debug)]
pub struct Pipe {
    fd: RawFd,
    half_closed_by_us: bool,
}

/// The subset of `Signals` a `Pipe` can itself determine without help from
/// the wait-set (used right after a read/write to decide what to arm next).
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeReadiness {
    pub peer_closed: bool,
}

impl Pipe {
    pub fn pair() -> io::Result<(Pipe, Pipe)> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe {
            libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
                fds.as_mut_ptr(),
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((
            Pipe { fd: fds[0], half_closed_by_us: false },
            Pipe { fd: fds[1], half_closed_by_us: false },
        ))
    }

    /// # Safety
    /// `fd` must be a valid, open, non-blocking stream socket fd this `Pipe`
    /// becomes the sole owner of.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Pipe {
        Pipe { fd, half_closed_by_us: false }
    }

    /// Non-blocking read. `Ok(0)` means the peer has closed (spec.md §4.5
    /// step 1: "n = 0 ... peer-closed is tolerated").
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.as_file();
        let r = file.read(buf);
        std::mem::forget(file);
        r
    }

    /// Non-blocking write; short writes are expected and tolerated by
    /// callers (spec.md §4.5 step 2, §4.6).
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.as_file();
        let r = file.write(buf);
        std::mem::forget(file);
        r
    }

    /// Writes the single-byte half-close marker used on EOF/hard-error
    /// (spec.md §4.5 step 1, §3 "Data/control flow").
    pub fn write_half_close_marker(&mut self) -> io::Result<()> {
        match self.write(&[0u8]) {
            Ok(_) => Ok(()),
            Err(e) if is_would_block(&e) => Ok(()), // best-effort; peer is going away anyway
            Err(e) => Err(e),
        }
    }

    /// `shutdown(SHUT_WR)` on our half (spec.md §4.9 HALFCLOSE).
    pub fn shutdown_write(&mut self) -> io::Result<()> {
        let rc = unsafe { libc::shutdown(self.fd, libc::SHUT_WR) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        self.half_closed_by_us = true;
        Ok(())
    }

    pub fn is_half_closed_by_us(&self) -> bool {
        self.half_closed_by_us
    }

    /// Probes whether the peer has closed its write side, without consuming
    /// data: `do_write_stream` (spec.md §4.6) uses this to tell a genuine
    /// `PEER_CLOSED` apart from a plain `WouldBlock`. A zero-length `recv`
    /// always returns `0` on a stream socket regardless of peer state, so
    /// this peeks one byte instead — `Ok(0)` means peer-closed, `WouldBlock`
    /// means still open (and possibly has no data waiting, which is fine:
    /// we only care about the closed/open distinction here).
    pub fn probe(&self) -> PipeReadiness {
        let mut one = [0u8; 1];
        let n = unsafe { libc::recv(self.fd, one.as_mut_ptr() as *mut _, 1, libc::MSG_PEEK) };
        let peer_closed = if n >= 0 {
            n == 0
        } else {
            !is_would_block(&io::Error::last_os_error())
        };
        PipeReadiness { peer_closed }
    }

    fn as_file(&self) -> std::mem::ManuallyDrop<std::fs::File> {
        use std::os::unix::io::FromRawFd;
        std::mem::ManuallyDrop::new(unsafe { std::fs::File::from_raw_fd(self.fd) })
    }
}

impl AsRawFd for Pipe {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl std::os::unix::io::IntoRawFd for Pipe {
    fn into_raw_fd(self) -> RawFd {
        let fd = self.fd;
        std::mem::forget(self);
        fd
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Maps kernel-observed pipe events to the `Signals` bits `watching_signals`
/// tracks (spec.md §3, §4.12).
pub fn signals_from_event(readable: bool, writable: bool, peer_closed: bool) -> Signals {
    let mut s = Signals::empty();
    if readable {
        s |= Signals::READABLE;
    }
    if writable {
        s |= Signals::WRITABLE;
    }
    if peer_closed {
        s |= Signals::PEER_CLOSED;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads() {
        let (mut a, mut b) = Pipe::pair().unwrap();
        a.write(b"abc").unwrap();
        let mut buf = [0u8; 3];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc");
    }

    #[test]
    fn half_close_is_observed_as_eof() {
        let (mut a, mut b) = Pipe::pair().unwrap();
        a.shutdown_write().unwrap();
        let mut buf = [0u8; 1];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }
}
