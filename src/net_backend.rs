//! `NetBackend`: the opaque BSD-socket-like backend spec.md §6 names.
//!
//! `UnixNetBackend` is a thin `libc` wrapper, in the idiom of
//! `flux-network`'s `tcp::stream`/`tcp::connector` (raw syscalls, explicit
//! `WouldBlock`/`EINPROGRESS` handling, no hidden retries). Every fallible
//! call returns a plain `io::Result`; mapping to a RIO `Status` happens once,
//! in `error::status_from_errno`, not here.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;

/// A minimal stand-in for `sockaddr` covering the address families this
/// backend actually needs (spec.md Non-goals exclude anything beyond
/// `AF_INET`/`AF_UNIX` plumbing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockAddr {
    V4 { addr: Ipv4Addr, port: u16 },
}

impl SockAddr {
    fn to_sockaddr_in(self) -> libc::sockaddr_in {
        let SockAddr::V4 { addr, port } = self;
        libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: port.to_be(),
            sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(addr.octets()) },
            sin_zero: [0; 8],
        }
    }

    fn from_sockaddr_in(raw: &libc::sockaddr_in) -> SockAddr {
        SockAddr::V4 {
            addr: Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes()),
            port: u16::from_be(raw.sin_port),
        }
    }
}

/// One entry of `GET_IF_INFO` (spec.md §6, §10 ioctl surface).
#[derive(Debug, Clone)]
pub struct IfInfo {
    pub index: u32,
    pub name: String,
    pub addr: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub up: bool,
}

/// At most this many entries are ever returned from `get_if_info`
/// (spec.md §6, §8 boundary test).
pub const NETC_IF_INFO_MAX: usize = 16;

pub trait NetBackend {
    fn socket(&self, domain: i32, kind: i32, protocol: i32) -> io::Result<RawFd>;
    fn close(&self, fd: RawFd) -> io::Result<()>;
    fn connect(&self, fd: RawFd, addr: SockAddr) -> io::Result<()>;
    fn bind(&self, fd: RawFd, addr: SockAddr) -> io::Result<()>;
    fn listen(&self, fd: RawFd, backlog: i32) -> io::Result<()>;
    fn accept(&self, fd: RawFd) -> io::Result<(RawFd, SockAddr)>;
    fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize>;
    fn recvfrom(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<SockAddr>)>;
    fn sendto(&self, fd: RawFd, buf: &[u8], addr: Option<SockAddr>) -> io::Result<usize>;
    fn shutdown_write(&self, fd: RawFd) -> io::Result<()>;
    fn getsockname(&self, fd: RawFd) -> io::Result<SockAddr>;
    fn getpeername(&self, fd: RawFd) -> io::Result<SockAddr>;
    /// `getsockopt(SO_ERROR)` (spec.md §3 `last_errno`, §4.8 `SIGCONN_W`).
    fn so_error(&self, fd: RawFd) -> io::Result<i32>;
    /// Only the first result is ever surfaced (spec.md §1 Non-goals, §9).
    fn getaddrinfo(&self, host: &str, port: u16) -> io::Result<Option<SockAddr>>;
    fn get_if_info(&self) -> io::Result<Vec<IfInfo>>;
    fn get_if_gateway_v4(&self, index: u32) -> io::Result<Option<Ipv4Addr>>;
    fn get_dhcp_status_v4(&self, index: u32) -> io::Result<bool>;
    fn get_dns_server_v4(&self, index: u32) -> io::Result<Option<Ipv4Addr>>;
}

#[derive(Debug, Default)]
pub struct UnixNetBackend;

impl UnixNetBackend {
    pub fn new() -> UnixNetBackend {
        UnixNetBackend
    }
}

fn cvt(rc: i32) -> io::Result<i32> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

impl NetBackend for UnixNetBackend {
    fn socket(&self, domain: i32, kind: i32, protocol: i32) -> io::Result<RawFd> {
        let fd = unsafe { libc::socket(domain, kind | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, protocol) };
        cvt(fd)
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        cvt(unsafe { libc::close(fd) }).map(|_| ())
    }

    fn connect(&self, fd: RawFd, addr: SockAddr) -> io::Result<()> {
        let sockaddr = addr.to_sockaddr_in();
        let rc = unsafe {
            libc::connect(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        cvt(rc).map(|_| ())
    }

    fn bind(&self, fd: RawFd, addr: SockAddr) -> io::Result<()> {
        let sockaddr = addr.to_sockaddr_in();
        let rc = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        cvt(rc).map(|_| ())
    }

    fn listen(&self, fd: RawFd, backlog: i32) -> io::Result<()> {
        cvt(unsafe { libc::listen(fd, backlog) }).map(|_| ())
    }

    fn accept(&self, fd: RawFd) -> io::Result<(RawFd, SockAddr)> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let child = unsafe {
            libc::accept4(
                fd,
                &mut raw as *mut _ as *mut libc::sockaddr,
                &mut len,
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        };
        let child = cvt(child)?;
        Ok((child, SockAddr::from_sockaddr_in(&raw)))
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        cvt(n as i32).map(|_| n as usize)
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const _, buf.len()) };
        cvt(n as i32).map(|_| n as usize)
    }

    fn recvfrom(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<SockAddr>)> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let n = unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr() as *mut _,
                buf.len(),
                0,
                &mut raw as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        let n = cvt(n as i32)? as usize;
        let from = if len > 0 { Some(SockAddr::from_sockaddr_in(&raw)) } else { None };
        Ok((n, from))
    }

    fn sendto(&self, fd: RawFd, buf: &[u8], addr: Option<SockAddr>) -> io::Result<usize> {
        // `addrlen == 0` selects the NULL-address path (spec.md §4.7, §8
        // scenario 5): the socket must already be connected.
        let (sockaddr, len) = match addr {
            Some(a) => (Some(a.to_sockaddr_in()), mem::size_of::<libc::sockaddr_in>() as libc::socklen_t),
            None => (None, 0),
        };
        let ptr = sockaddr
            .as_ref()
            .map(|s| s as *const _ as *const libc::sockaddr)
            .unwrap_or(std::ptr::null());
        let n = unsafe { libc::sendto(fd, buf.as_ptr() as *const _, buf.len(), 0, ptr, len) };
        cvt(n as i32).map(|_| n as usize)
    }

    fn shutdown_write(&self, fd: RawFd) -> io::Result<()> {
        cvt(unsafe { libc::shutdown(fd, libc::SHUT_WR) }).map(|_| ())
    }

    fn getsockname(&self, fd: RawFd) -> io::Result<SockAddr> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        cvt(unsafe { libc::getsockname(fd, &mut raw as *mut _ as *mut libc::sockaddr, &mut len) })?;
        Ok(SockAddr::from_sockaddr_in(&raw))
    }

    fn getpeername(&self, fd: RawFd) -> io::Result<SockAddr> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        cvt(unsafe { libc::getpeername(fd, &mut raw as *mut _ as *mut libc::sockaddr, &mut len) })?;
        Ok(SockAddr::from_sockaddr_in(&raw))
    }

    fn so_error(&self, fd: RawFd) -> io::Result<i32> {
        let mut errno: i32 = 0;
        let mut len = mem::size_of::<i32>() as libc::socklen_t;
        cvt(unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut errno as *mut _ as *mut libc::c_void,
                &mut len,
            )
        })?;
        Ok(errno)
    }

    fn getaddrinfo(&self, host: &str, port: u16) -> io::Result<Option<SockAddr>> {
        use std::ffi::CString;
        let chost = CString::new(host).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let cport = CString::new(port.to_string()).unwrap();

        let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
        hints.ai_family = libc::AF_INET;
        hints.ai_socktype = libc::SOCK_STREAM;

        let mut result: *mut libc::addrinfo = std::ptr::null_mut();
        let rc = unsafe {
            libc::getaddrinfo(chost.as_ptr(), cport.as_ptr(), &hints, &mut result)
        };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        // Only the first address is surfaced (spec.md §1 Non-goals, §9).
        let first = unsafe {
            if result.is_null() {
                None
            } else {
                let ai = &*result;
                if ai.ai_family == libc::AF_INET && !ai.ai_addr.is_null() {
                    let sin = &*(ai.ai_addr as *const libc::sockaddr_in);
                    Some(SockAddr::from_sockaddr_in(sin))
                } else {
                    None
                }
            }
        };
        unsafe { libc::freeaddrinfo(result) };
        Ok(first)
    }

    fn get_if_info(&self) -> io::Result<Vec<IfInfo>> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        cvt(unsafe { libc::getifaddrs(&mut head) })?;

        let mut out = Vec::new();
        let mut cursor = head;
        let mut index = 0u32;
        while !cursor.is_null() && out.len() < NETC_IF_INFO_MAX {
            let ifa = unsafe { &*cursor };
            let name = unsafe { std::ffi::CStr::from_ptr(ifa.ifa_name).to_string_lossy().into_owned() };
            let up = ifa.ifa_flags & (libc::IFF_UP as u32) != 0;

            let (addr, netmask) = unsafe {
                if !ifa.ifa_addr.is_null() && (*ifa.ifa_addr).sa_family as i32 == libc::AF_INET {
                    let sin = &*(ifa.ifa_addr as *const libc::sockaddr_in);
                    let a = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                    let mask = if !ifa.ifa_netmask.is_null() {
                        let m = &*(ifa.ifa_netmask as *const libc::sockaddr_in);
                        Some(Ipv4Addr::from(m.sin_addr.s_addr.to_ne_bytes()))
                    } else {
                        None
                    };
                    (Some(a), mask)
                } else {
                    (None, None)
                }
            };

            out.push(IfInfo { index, name, addr, netmask, up });
            index += 1;
            cursor = ifa.ifa_next;
        }

        unsafe { libc::freeifaddrs(head) };
        Ok(out)
    }

    fn get_if_gateway_v4(&self, _index: u32) -> io::Result<Option<Ipv4Addr>> {
        // Reading the kernel routing table needs `NETLINK_ROUTE`, out of
        // scope for this backend; callers see an empty gateway rather than
        // an error.
        Ok(None)
    }

    fn get_dhcp_status_v4(&self, _index: u32) -> io::Result<bool> {
        Ok(false)
    }

    fn get_dns_server_v4(&self, _index: u32) -> io::Result<Option<Ipv4Addr>> {
        Ok(None)
    }
}
