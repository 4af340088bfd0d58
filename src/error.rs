//! Error kinds and the errno -> RIO status mapping.
//!
//! Grounded on the teacher's `MioError` (kind + optional raw errno), rebuilt
//! around `thiserror` and split into the four kinds spec.md §7 names:
//! transient-would-block, peer-gone, protocol/validation, backend-fatal.

use std::io;

use thiserror::Error;

/// The four error kinds named in spec.md §7.
#[derive(Debug, Error)]
pub enum SockError {
    /// The operation would have blocked; the caller should suspend on the
    /// matching readiness source and retry.
    #[error("would block")]
    WouldBlock,

    /// The peer side of a pipe or channel is gone.
    #[error("peer closed")]
    PeerGone,

    /// A malformed OPEN path, oversize payload, or unknown op-code.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// Any other backend errno, surfaced to the client via `getsockopt(SO_ERROR)`.
    #[error("backend error: {0}")]
    Backend(#[from] io::Error),
}

impl SockError {
    pub fn protocol(msg: &'static str) -> SockError {
        SockError::Protocol(msg)
    }

    /// The raw errno this error carries, if any (used to populate `last_errno`).
    pub fn raw_errno(&self) -> Option<i32> {
        match self {
            SockError::Backend(e) => e.raw_os_error(),
            SockError::WouldBlock => Some(libc::EWOULDBLOCK),
            _ => None,
        }
    }

    pub fn is_would_block(&self) -> bool {
        matches!(self, SockError::WouldBlock)
            || matches!(self, SockError::Backend(e) if is_would_block(e))
    }
}

/// RIO reply status codes (spec.md §6 errno mapping + handler sentinels).
///
/// Positive-space op results are never used; `Status` values are always
/// `<= 0`, with `0` meaning success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    AccessDenied = -1,
    BadHandle = -2,
    ShouldWait = -3,
    InvalidArgs = -4,
    Io = -5,
    NoResources = -6,
    NoMemory = -7,
    NotSupported = -8,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// Maps a raw backend errno to a `Status` per spec.md §6.
pub fn status_from_errno(errno: i32) -> Status {
    match errno {
        libc::EACCES => Status::AccessDenied,
        libc::EBADF => Status::BadHandle,
        libc::EINPROGRESS | libc::EWOULDBLOCK => Status::ShouldWait,
        libc::EINVAL => Status::InvalidArgs,
        libc::EIO => Status::Io,
        libc::ENOBUFS => Status::NoResources,
        libc::ENOMEM => Status::NoMemory,
        _ => Status::Io,
    }
}

impl From<&SockError> for Status {
    fn from(e: &SockError) -> Status {
        match e {
            SockError::WouldBlock => Status::ShouldWait,
            SockError::PeerGone => Status::Io,
            SockError::Protocol(_) => Status::InvalidArgs,
            SockError::Backend(io_err) => match io_err.raw_os_error() {
                Some(errno) => status_from_errno(errno),
                None => Status::Io,
            },
        }
    }
}

impl From<SockError> for Status {
    fn from(e: SockError) -> Status {
        Status::from(&e)
    }
}

pub type SockResult<T> = Result<T, SockError>;

/// Classifies a raw `io::Error` from a non-blocking syscall: would-block vs.
/// a hard error, the distinction `do_read_stream`/`do_write_stream` make
/// repeatedly (spec.md §4.5/§4.6).
pub fn is_would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}
