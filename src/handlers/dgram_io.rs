//! Datagram read/write pipelines (spec.md §4.7): one RIO message per
//! `sendto`/`recvfrom`, envelope `{addr, addrlen, payload}`.

use crate::core::Core;
use crate::error::{is_would_block, status_from_errno, Status};
use crate::io_state::DataEndpoint;
use crate::kernel::Signals;
use crate::net_backend::{NetBackend, SockAddr};
use crate::router::HandlerOutcome;

/// Little-endian envelope: `addrlen: u32` (0 means "no address", i.e. the
/// `NULL` path), followed by `addrlen` bytes of address (only the 6-byte
/// `ipv4 + port` form is produced/consumed here) if non-zero, then payload.
fn encode_envelope(addr: Option<SockAddr>, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 6 + payload.len());
    match addr {
        Some(SockAddr::V4 { addr, port }) => {
            out.extend_from_slice(&6u32.to_le_bytes());
            out.extend_from_slice(&addr.octets());
            out.extend_from_slice(&port.to_le_bytes());
        }
        None => out.extend_from_slice(&0u32.to_le_bytes()),
    }
    out.extend_from_slice(payload);
    out
}

fn decode_envelope(msg: &[u8]) -> Option<(Option<SockAddr>, &[u8])> {
    if msg.len() < 4 {
        return None;
    }
    let addrlen = u32::from_le_bytes(msg[0..4].try_into().ok()?);
    if addrlen == 0 {
        return Some((None, &msg[4..]));
    }
    if addrlen != 6 || msg.len() < 10 {
        return None;
    }
    let ip = std::net::Ipv4Addr::new(msg[4], msg[5], msg[6], msg[7]);
    let port = u16::from_le_bytes(msg[8..10].try_into().ok()?);
    Some((Some(SockAddr::V4 { addr: ip, port }), &msg[10..]))
}

pub fn do_read_dgram(core: &mut Core, token: usize) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    let mut buf = core.pool.get();
    let result = core.backend.recvfrom(sockfd, &mut buf[..]);
    match result {
        Ok((n, from)) => {
            let message = encode_envelope(from, &buf[..n]);
            core.pool.put(buf);
            let ios = &mut core.ios[token];
            let DataEndpoint::Dgram(chan) = &mut ios.data_endpoint else {
                return HandlerOutcome::Status(Status::BadHandle);
            };
            match chan.send(&message, &[]) {
                Ok(()) => HandlerOutcome::Ok,
                Err(_) => HandlerOutcome::Status(Status::Io),
            }
        }
        Err(e) if is_would_block(&e) => {
            core.pool.put(buf);
            let _ = core.net_arm_bits(token, sockfd, Signals::READABLE);
            HandlerOutcome::PendingNet
        }
        Err(e) => {
            core.pool.put(buf);
            HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO)))
        }
    }
}

pub fn do_write_dgram(core: &mut Core, token: usize) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    let recv_result = {
        let ios = &mut core.ios[token];
        let DataEndpoint::Dgram(chan) = &mut ios.data_endpoint else {
            return HandlerOutcome::Status(Status::BadHandle);
        };
        chan.recv()
    };

    let (message, _handles) = match recv_result {
        Ok(pair) => pair,
        Err(e) if is_would_block(&e) => {
            let fd = match &core.ios[token].data_endpoint {
                DataEndpoint::Dgram(c) => std::os::unix::io::AsRawFd::as_raw_fd(c),
                _ => return HandlerOutcome::Status(Status::BadHandle),
            };
            let _ = core.handle_arm(token, fd, mio::Interest::READABLE);
            return HandlerOutcome::PendingClient;
        }
        Err(_) => return HandlerOutcome::Status(Status::Io),
    };

    let (addr, payload) = match decode_envelope(&message) {
        Some(pair) => pair,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };

    match core.backend.sendto(sockfd, payload, addr) {
        Ok(_) => HandlerOutcome::Ok,
        Err(e) if is_would_block(&e) => {
            let _ = core.net_arm_bits(token, sockfd, Signals::WRITABLE);
            HandlerOutcome::PendingNet
        }
        Err(e) => HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_with_address() {
        let addr = SockAddr::V4 { addr: std::net::Ipv4Addr::new(127, 0, 0, 1), port: 4242 };
        let msg = encode_envelope(Some(addr), b"hi");
        let (decoded_addr, payload) = decode_envelope(&msg).unwrap();
        assert_eq!(decoded_addr, Some(addr));
        assert_eq!(payload, b"hi");
    }

    #[test]
    fn envelope_round_trips_without_address() {
        let msg = encode_envelope(None, b"hi");
        let (decoded_addr, payload) = decode_envelope(&msg).unwrap();
        assert_eq!(decoded_addr, None);
        assert_eq!(payload, b"hi");
    }
}
