//! Operation handlers (spec.md §4.4–§4.10), one module per cluster of
//! related ops, matching the teacher's one-file-per-concern layout.

pub mod close;
pub mod connect;
pub mod dgram_io;
pub mod ioctl;
pub mod open;
pub mod stream_io;

use std::os::unix::io::{IntoRawFd, RawFd};

use crate::error::SockError;
use crate::io_state::{DataEndpoint, HandleType, IOState};
use crate::kernel::{Channel, Pipe, Signals};

/// `create_handles(ios)` (spec.md §4.2): builds the server-side `IOState`
/// plus the raw client-side fds to ship back as RIO reply handles. On any
/// partial failure, everything allocated so far is dropped (closed) before
/// returning a single error.
pub fn create_handles(handle_type: HandleType, sockfd: RawFd) -> Result<(IOState, Vec<RawFd>), SockError> {
    let (server_rio, client_rio) = Channel::pair().map_err(SockError::from)?;

    let (data_endpoint, client_data) = match handle_type {
        HandleType::None => (DataEndpoint::None, None),
        HandleType::Stream => {
            let (server, client) = match Pipe::pair() {
                Ok(pair) => pair,
                Err(e) => return Err(SockError::from(e)), // server_rio/client_rio drop here
            };
            (DataEndpoint::Stream(server), Some(client.into_raw_fd()))
        }
        HandleType::Dgram => {
            let (server, client) = match Channel::pair() {
                Ok(pair) => pair,
                Err(e) => return Err(SockError::from(e)),
            };
            (DataEndpoint::Dgram(server), Some(client.into_raw_fd()))
        }
    };

    let mut ios = IOState::new(handle_type, sockfd, server_rio, data_endpoint);
    if handle_type == HandleType::Dgram {
        // Client may send before connect/bind (spec.md §4.4).
        ios.watching_signals = Signals::READABLE;
    }

    let mut handles = vec![client_rio.into_raw_fd()];
    handles.extend(client_data);
    Ok((ios, handles))
}

/// Closes handles that were produced for a reply but never shipped because
/// the reply write itself failed (spec.md §7: "A dropped reply ... closes
/// handles in the unsent message to avoid leaks").
pub fn close_unsent_handles(handles: &[RawFd]) {
    for &fd in handles {
        unsafe {
            libc::close(fd);
        }
    }
}
