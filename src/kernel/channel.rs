//! Bidirectional, message-granular channel carrying up to two handles per
//! message (spec.md §6 kernel primitives). Realized as an `AF_UNIX`
//! `SOCK_SEQPACKET` `socketpair(2)`, framed with `sendmsg`/`recvmsg` and
//! `SCM_RIGHTS` ancillary data. `SOCK_SEQPACKET` preserves message
//! boundaries, so no length prefix is needed.

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;

use crate::rio::MXIO_MAX_HANDLES;

/// One end of a connected message channel.
#[derive(Debug)]
pub struct Channel {
    fd: RawFd,
}

impl Channel {
    /// Creates a connected pair, both ends non-blocking.
    pub fn pair() -> io::Result<(Channel, Channel)> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe {
            libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_SEQPACKET | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
                fds.as_mut_ptr(),
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((Channel { fd: fds[0] }, Channel { fd: fds[1] }))
    }

    /// Wraps an already-connected, already-non-blocking fd (e.g. received as
    /// a handle in another message).
    ///
    /// # Safety
    /// `fd` must be a valid, open `SOCK_SEQPACKET` socket fd this `Channel`
    /// becomes the sole owner of.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Channel {
        Channel { fd }
    }

    /// Sends one message with up to `MXIO_MAX_HANDLES` ancillary handles.
    /// `SCM_RIGHTS` *duplicates* the descriptors into the receiver rather
    /// than moving them, so on success this closes the caller's copies —
    /// the peer now owns its own dup (spec.md §3's handle-passing contract,
    /// "managed without leaks" per §5). On failure the caller still owns
    /// the fds and is responsible for them.
    pub fn send(&self, payload: &[u8], handles: &[RawFd]) -> io::Result<()> {
        assert!(handles.len() <= MXIO_MAX_HANDLES, "too many handles in one RIO message");

        let mut iov = libc::iovec { iov_base: payload.as_ptr() as *mut _, iov_len: payload.len() };

        let cmsg_space = unsafe { libc::CMSG_SPACE((handles.len() * mem::size_of::<RawFd>()) as u32) };
        let mut cmsg_buf = vec![0u8; cmsg_space as usize];

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;

        if !handles.is_empty() {
            msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
            msg.msg_controllen = cmsg_buf.len() as _;

            unsafe {
                let cmsg = libc::CMSG_FIRSTHDR(&msg);
                (*cmsg).cmsg_level = libc::SOL_SOCKET;
                (*cmsg).cmsg_type = libc::SCM_RIGHTS;
                (*cmsg).cmsg_len = libc::CMSG_LEN((handles.len() * mem::size_of::<RawFd>()) as u32) as _;
                ptr::copy_nonoverlapping(
                    handles.as_ptr(),
                    libc::CMSG_DATA(cmsg) as *mut RawFd,
                    handles.len(),
                );
                msg.msg_controllen = (*cmsg).cmsg_len as _;
            }
        }

        let rc = unsafe { libc::sendmsg(self.fd, &msg, libc::MSG_NOSIGNAL) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        for &fd in handles {
            unsafe {
                libc::close(fd);
            }
        }
        Ok(())
    }

    /// Receives one message. Returns the payload and any handles that rode
    /// along with it (up to `MXIO_MAX_HANDLES`).
    pub fn recv(&self) -> io::Result<(Vec<u8>, Vec<RawFd>)> {
        let mut buf = vec![0u8; crate::rio::MXIO_CHUNK_SIZE];
        let mut iov = libc::iovec { iov_base: buf.as_mut_ptr() as *mut _, iov_len: buf.len() };

        let cmsg_space =
            unsafe { libc::CMSG_SPACE((MXIO_MAX_HANDLES * mem::size_of::<RawFd>()) as u32) };
        let mut cmsg_buf = vec![0u8; cmsg_space as usize];

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
        msg.msg_controllen = cmsg_buf.len() as _;

        let n = unsafe { libc::recvmsg(self.fd, &mut msg, 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        buf.truncate(n as usize);

        let mut handles = Vec::new();
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                    let data = libc::CMSG_DATA(cmsg) as *const RawFd;
                    let count = ((*cmsg).cmsg_len as usize
                        - libc::CMSG_LEN(0) as usize)
                        / mem::size_of::<RawFd>();
                    for i in 0..count {
                        handles.push(*data.add(i));
                    }
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        Ok((buf, handles))
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl std::os::unix::io::IntoRawFd for Channel {
    fn into_raw_fd(self) -> RawFd {
        let fd = self.fd;
        mem::forget(self);
        fd
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload() {
        let (a, b) = Channel::pair().unwrap();
        a.send(b"hello", &[]).unwrap();
        let (buf, handles) = b.recv().unwrap();
        assert_eq!(buf, b"hello");
        assert!(handles.is_empty());
    }

    #[test]
    fn round_trips_a_handle() {
        use std::os::unix::io::IntoRawFd;

        let (a, b) = Channel::pair().unwrap();
        let (extra_a, extra_b) = Channel::pair().unwrap();
        // `into_raw_fd` hands the fd to `send` without a `Channel` still
        // owning (and later closing) it; `send` closes its own copy once
        // `SCM_RIGHTS` has duplicated it into `b`'s receive buffer.
        let extra_a_fd = extra_a.into_raw_fd();
        a.send(b"open-reply", &[extra_a_fd]).unwrap();
        let (buf, handles) = b.recv().unwrap();
        assert_eq!(buf, b"open-reply");
        assert_eq!(handles.len(), 1);
        unsafe { libc::close(handles[0]) };
        drop(extra_b);
    }
}
