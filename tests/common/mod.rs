//! Shared fixtures for the integration tests in this directory.
//!
//! `test_core` mirrors `core::tests::test_core` (not reachable from outside
//! the crate): three throwaway `mio::Poll`s whose registries back `Core`'s
//! net/handle/rio wait-sets, with the `Poll`s themselves leaked since
//! nothing ever calls `poll()` on them directly in these tests — the
//! handlers under test only register/deregister interest, never block.

use std::os::unix::io::RawFd;

use sockproxy_core::config::Config;
use sockproxy_core::Core;

#[allow(dead_code)]
pub fn test_core() -> Core {
    let net_poll = mio::Poll::new().unwrap();
    let handle_poll = mio::Poll::new().unwrap();
    let rio_poll = mio::Poll::new().unwrap();
    let net_registry = net_poll.registry().try_clone().unwrap();
    let handle_registry = handle_poll.registry().try_clone().unwrap();
    let rio_registry = rio_poll.registry().try_clone().unwrap();
    std::mem::forget(net_poll);
    std::mem::forget(handle_poll);
    std::mem::forget(rio_poll);
    Core::new(Config::default(), net_registry, handle_registry, rio_registry)
}

/// Blocks (up to `timeout_ms`) until `fd` is readable. Used in place of the
/// real net multiplexer/handle watcher threads, which these tests don't
/// spin up — the handlers under test are driven directly.
#[allow(dead_code)]
pub fn wait_readable(fd: RawFd, timeout_ms: i32) -> bool {
    poll_for(fd, libc::POLLIN, timeout_ms)
}

#[allow(dead_code)]
pub fn wait_writable(fd: RawFd, timeout_ms: i32) -> bool {
    poll_for(fd, libc::POLLOUT, timeout_ms)
}

fn poll_for(fd: RawFd, events: i16, timeout_ms: i32) -> bool {
    let mut pfd = libc::pollfd { fd, events, revents: 0 };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    rc > 0 && (pfd.revents & events) != 0
}

/// Wire format `handlers::connect::decode_addr` expects: 4 octets + 2-byte
/// little-endian port.
#[allow(dead_code)]
pub fn encode_addr(addr: std::net::Ipv4Addr, port: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(&addr.octets());
    out.extend_from_slice(&port.to_le_bytes());
    out
}

/// Decodes the 6-byte `{addr, port}` reply `do_getsockname`/`do_getpeername`
/// produce.
#[allow(dead_code)]
pub fn decode_addr_reply(data: &[u8]) -> (std::net::Ipv4Addr, u16) {
    assert_eq!(data.len(), 6);
    let addr = std::net::Ipv4Addr::new(data[0], data[1], data[2], data[3]);
    let port = u16::from_le_bytes([data[4], data[5]]);
    (addr, port)
}

/// Mirrors `handlers::dgram_io`'s private envelope codec — a real client
/// would build/parse this same layout independently.
#[allow(dead_code)]
pub fn encode_dgram_envelope(addr: Option<(std::net::Ipv4Addr, u16)>, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 6 + payload.len());
    match addr {
        Some((ip, port)) => {
            out.extend_from_slice(&6u32.to_le_bytes());
            out.extend_from_slice(&ip.octets());
            out.extend_from_slice(&port.to_le_bytes());
        }
        None => out.extend_from_slice(&0u32.to_le_bytes()),
    }
    out.extend_from_slice(payload);
    out
}

#[allow(dead_code)]
pub fn decode_dgram_envelope(msg: &[u8]) -> (Option<(std::net::Ipv4Addr, u16)>, &[u8]) {
    let addrlen = u32::from_le_bytes(msg[0..4].try_into().unwrap());
    if addrlen == 0 {
        return (None, &msg[4..]);
    }
    assert_eq!(addrlen, 6);
    let ip = std::net::Ipv4Addr::new(msg[4], msg[5], msg[6], msg[7]);
    let port = u16::from_le_bytes([msg[8], msg[9]]);
    (Some((ip, port)), &msg[10..])
}
