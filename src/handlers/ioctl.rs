//! `IOCTL` network-configuration surface (spec.md §4.10, §6) plus the
//! handful of other query ops (`GETADDRINFO`, `GETSOCKNAME`, `GETPEERNAME`,
//! `GETSOCKOPT`, `SETSOCKOPT`) that share its "thin call into NetBackend,
//! fixed-layout reply" shape.

use crate::core::Core;
use crate::error::Status;
use crate::net_backend::{NetBackend, SockAddr, NETC_IF_INFO_MAX};
use crate::router::HandlerOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum IoctlOp {
    GetIfInfo = 1,
    SetIfAddr = 2,
    GetIfGateway = 3,
    SetIfGateway = 4,
    GetDhcpStatus = 5,
    SetDhcpStatus = 6,
    GetDnsServer = 7,
    SetDnsServer = 8,
}

fn decode_ioctl_op(payload: &[u8]) -> Option<(IoctlOp, &[u8])> {
    if payload.len() < 4 {
        return None;
    }
    let code = u32::from_le_bytes(payload[0..4].try_into().ok()?);
    let op = match code {
        1 => IoctlOp::GetIfInfo,
        2 => IoctlOp::SetIfAddr,
        3 => IoctlOp::GetIfGateway,
        4 => IoctlOp::SetIfGateway,
        5 => IoctlOp::GetDhcpStatus,
        6 => IoctlOp::SetDhcpStatus,
        7 => IoctlOp::GetDnsServer,
        8 => IoctlOp::SetDnsServer,
        _ => return None,
    };
    Some((op, &payload[4..]))
}

fn encode_ipv4_entry(ip: Option<std::net::Ipv4Addr>) -> [u8; 5] {
    let mut out = [0u8; 5];
    if let Some(ip) = ip {
        out[0] = 1;
        out[1..5].copy_from_slice(&ip.octets());
    }
    out
}

pub fn do_ioctl(core: &mut Core, token: usize, payload: &[u8]) -> HandlerOutcome {
    let (op, rest) = match decode_ioctl_op(payload) {
        Some(pair) => pair,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };

    match op {
        IoctlOp::GetIfInfo => match core.backend.get_if_info() {
            Ok(infos) => {
                let mut data = Vec::new();
                let n = infos.len().min(NETC_IF_INFO_MAX) as u32;
                data.extend_from_slice(&n.to_le_bytes());
                for info in infos.into_iter().take(NETC_IF_INFO_MAX) {
                    data.extend_from_slice(&info.index.to_le_bytes());
                    let mut name_field = [0u8; 16];
                    let name_bytes = info.name.as_bytes();
                    let len = name_bytes.len().min(15);
                    name_field[..len].copy_from_slice(&name_bytes[..len]);
                    data.extend_from_slice(&name_field);
                    data.extend_from_slice(&encode_ipv4_entry(info.addr));
                    data.extend_from_slice(&encode_ipv4_entry(info.netmask));
                    data.push(info.up as u8);
                }
                HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, data))
            }
            Err(_) => HandlerOutcome::Status(Status::Io),
        },
        IoctlOp::GetIfGateway => query_v4(core, rest, |b, idx| b.get_if_gateway_v4(idx)),
        IoctlOp::GetDnsServer => query_v4(core, rest, |b, idx| b.get_dns_server_v4(idx)),
        IoctlOp::GetDhcpStatus => {
            let index = match rest.get(0..4).map(|b| u32::from_le_bytes(b.try_into().unwrap())) {
                Some(i) => i,
                None => return HandlerOutcome::Status(Status::InvalidArgs),
            };
            match core.backend.get_dhcp_status_v4(index) {
                Ok(on) => HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, vec![on as u8])),
                Err(_) => HandlerOutcome::Status(Status::Io),
            }
        }
        // Mutating calls are a deliberate scope line, not a missing feature
        // (see DESIGN.md): this backend never touches host routing tables.
        IoctlOp::SetIfAddr | IoctlOp::SetIfGateway | IoctlOp::SetDhcpStatus | IoctlOp::SetDnsServer => {
            let _ = token;
            HandlerOutcome::Status(Status::NotSupported)
        }
    }
}

fn query_v4(
    core: &Core,
    rest: &[u8],
    f: impl Fn(&dyn NetBackend, u32) -> std::io::Result<Option<std::net::Ipv4Addr>>,
) -> HandlerOutcome {
    let index = match rest.get(0..4).map(|b| u32::from_le_bytes(b.try_into().unwrap())) {
        Some(i) => i,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };
    match f(core.backend.as_ref(), index) {
        Ok(ip) => HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, encode_ipv4_entry(ip).to_vec())),
        Err(_) => HandlerOutcome::Status(Status::Io),
    }
}

pub fn do_getaddrinfo(core: &mut Core, _token: usize, payload: &[u8]) -> HandlerOutcome {
    if payload.len() < 3 {
        return HandlerOutcome::Status(Status::InvalidArgs);
    }
    let nul = match payload.iter().position(|&b| b == 0) {
        Some(i) => i,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };
    let host = match std::str::from_utf8(&payload[..nul]) {
        Ok(s) => s,
        Err(_) => return HandlerOutcome::Status(Status::InvalidArgs),
    };
    if payload.len() < nul + 3 {
        return HandlerOutcome::Status(Status::InvalidArgs);
    }
    let port = u16::from_le_bytes([payload[nul + 1], payload[nul + 2]]);

    match core.backend.getaddrinfo(host, port) {
        Ok(Some(SockAddr::V4 { addr, port })) => {
            // `ai_addr` travels as the `0xDEADBEEF` sentinel (spec.md §6);
            // the embedded address bytes follow for the receiver to splice in.
            let mut data = Vec::with_capacity(1 + 4 + 4 + 2);
            data.push(1);
            data.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
            data.extend_from_slice(&addr.octets());
            data.extend_from_slice(&port.to_le_bytes());
            HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, data))
        }
        Ok(None) => HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, vec![0])),
        Err(_) => HandlerOutcome::Status(Status::InvalidArgs),
    }
}

pub fn do_getsockname(core: &mut Core, token: usize) -> HandlerOutcome {
    addr_reply(core, token, |b, fd| b.getsockname(fd))
}

pub fn do_getpeername(core: &mut Core, token: usize) -> HandlerOutcome {
    addr_reply(core, token, |b, fd| b.getpeername(fd))
}

fn addr_reply(
    core: &mut Core,
    token: usize,
    f: impl Fn(&dyn NetBackend, std::os::unix::io::RawFd) -> std::io::Result<SockAddr>,
) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };
    match f(core.backend.as_ref(), sockfd) {
        Ok(SockAddr::V4 { addr, port }) => {
            let mut data = Vec::with_capacity(6);
            data.extend_from_slice(&addr.octets());
            data.extend_from_slice(&port.to_le_bytes());
            HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, data))
        }
        Err(e) => HandlerOutcome::Status(crate::error::status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
    }
}

/// Only `SO_ERROR` is meaningful here (spec.md §3 `last_errno`, §7).
const SO_ERROR_OPT: u32 = 1;

pub fn do_getsockopt(core: &mut Core, token: usize, payload: &[u8]) -> HandlerOutcome {
    let opt = match payload.get(0..4).map(|b| u32::from_le_bytes(b.try_into().unwrap())) {
        Some(o) => o,
        None => return HandlerOutcome::Status(Status::InvalidArgs),
    };
    if opt != SO_ERROR_OPT {
        return HandlerOutcome::Status(Status::InvalidArgs);
    }
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };
    match core.backend.so_error(sockfd) {
        Ok(errno) => HandlerOutcome::OkWithReply(crate::rio::RioReply::with_data(Status::Ok, errno.to_le_bytes().to_vec())),
        Err(_) => HandlerOutcome::Status(Status::Io),
    }
}

/// Generic passthrough for boolean-valued socket options (e.g.
/// `SO_REUSEADDR`); payload is `{level: i32, optname: i32, optval: i32}`.
pub fn do_setsockopt(core: &mut Core, token: usize, payload: &[u8]) -> HandlerOutcome {
    if payload.len() < 12 {
        return HandlerOutcome::Status(Status::InvalidArgs);
    }
    let level = i32::from_le_bytes(payload[0..4].try_into().unwrap());
    let optname = i32::from_le_bytes(payload[4..8].try_into().unwrap());
    let optval = i32::from_le_bytes(payload[8..12].try_into().unwrap());

    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    let rc = unsafe {
        libc::setsockopt(
            sockfd,
            level,
            optname,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
        HandlerOutcome::Status(crate::error::status_from_errno(errno))
    } else {
        HandlerOutcome::Ok
    }
}
