//! Connection-state pseudo-ops (spec.md §4.8): `CONNECT`, `BIND`, `LISTEN`,
//! and the internal `SIGCONN_R`/`SIGCONN_W` readiness-to-signal translators.

use std::io;
use std::net::Ipv4Addr;

use crate::core::Core;
use crate::error::{status_from_errno, Status};
use crate::io_state::ConnectKind;
use crate::kernel::Signals;
use crate::net_backend::{NetBackend, SockAddr};
use crate::router::HandlerOutcome;

/// Wire format for a `CONNECT`/`BIND` address payload: 4 octets + 2-byte
/// little-endian port, network-stack-agnostic since spec.md §1 scopes this
/// core to `AF_INET`.
fn decode_addr(payload: &[u8]) -> Option<SockAddr> {
    if payload.len() != 6 {
        return None;
    }
    let addr = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
    let port = u16::from_le_bytes([payload[4], payload[5]]);
    Some(SockAddr::V4 { addr, port })
}

pub fn do_connect(core: &mut Core, token: usize, payload: &[u8]) -> HandlerOutcome {
    let addr = match decode_addr(payload) {
        Some(a) => a,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    match core.backend.connect(sockfd, addr) {
        Ok(()) => {
            let _ = emit_user_signal(core, token, Signals::CONNECTED | Signals::OUTGOING);
            let _ = core.net_arm_bits(token, sockfd, Signals::READABLE | Signals::WRITABLE);
            HandlerOutcome::Ok
        }
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
            if let Some(ios) = core.ios.get_mut(token) {
                ios.pending_connect = Some(ConnectKind::Connecting);
            }
            let _ = core.net_arm_bits(token, sockfd, Signals::WRITABLE);
            HandlerOutcome::Status(Status::ShouldWait)
        }
        Err(e) => HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
    }
}

pub fn do_bind(core: &mut Core, token: usize, payload: &[u8]) -> HandlerOutcome {
    let addr = match decode_addr(payload) {
        Some(a) => a,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    match core.backend.bind(sockfd, addr) {
        Ok(()) => HandlerOutcome::Ok,
        Err(e) => HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
    }
}

pub fn do_listen(core: &mut Core, token: usize, payload: &[u8]) -> HandlerOutcome {
    let backlog = if payload.len() >= 4 {
        i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]])
    } else {
        128
    };
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    match core.backend.listen(sockfd, backlog) {
        Ok(()) => {
            if let Some(ios) = core.ios.get_mut(token) {
                ios.pending_connect = Some(ConnectKind::Listening);
            }
            let _ = core.net_arm_bits(token, sockfd, Signals::READABLE);
            HandlerOutcome::Ok
        }
        Err(e) => HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
    }
}

/// Socket became readable while listening: translate to the client-visible
/// `INCOMING` signal (spec.md §4.8). Fired by the net multiplexer, not by a
/// client RIO message.
pub fn do_sigconn_r(core: &mut Core, token: usize, _observed: Signals) -> HandlerOutcome {
    if let Some(ios) = core.ios.get_mut(token) {
        ios.incoming_asserted = true;
    }
    let _ = emit_user_signal(core, token, Signals::INCOMING);
    HandlerOutcome::Ok
}

/// Socket became writable while a non-blocking `connect` was in progress:
/// read `SO_ERROR` and translate success into `CONNECTED`/`OUTGOING`
/// (spec.md §4.8).
pub fn do_sigconn_w(core: &mut Core, token: usize, _observed: Signals) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    match core.backend.so_error(sockfd) {
        Ok(0) => {
            if let Some(ios) = core.ios.get_mut(token) {
                ios.pending_connect = None;
            }
            let _ = emit_user_signal(core, token, Signals::CONNECTED | Signals::OUTGOING);
            let _ = core.net_arm_bits(token, sockfd, Signals::READABLE | Signals::WRITABLE);
            HandlerOutcome::Ok
        }
        Ok(errno) => {
            if let Some(ios) = core.ios.get_mut(token) {
                ios.last_errno = errno;
                ios.pending_connect = None;
            }
            HandlerOutcome::Status(status_from_errno(errno))
        }
        Err(e) => HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
    }
}

/// Writes an unsolicited `STATUS`-shaped frame on `rio_endpoint` carrying
/// the signal bits that just changed (spec.md §3 ADD: "user signals ...
/// realized by writing a one-byte signal frame on the data endpoint's
/// control sub-channel").
fn emit_user_signal(core: &Core, token: usize, bits: Signals) -> io::Result<()> {
    let ios = match core.ios.get(token) {
        Some(ios) => ios,
        None => return Ok(()),
    };
    let mut frame = Vec::with_capacity(8);
    frame.extend_from_slice(&(crate::rio::OpCode::Status as u32).to_le_bytes());
    frame.extend_from_slice(&bits.bits().to_le_bytes());
    ios.rio_endpoint.send(&frame, &[])
}
