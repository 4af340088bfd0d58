//! Stream read/write pipelines (spec.md §4.5, §4.6).

use crate::core::Core;
use crate::error::{is_would_block, status_from_errno, Status};
use crate::io_state::DataEndpoint;
use crate::kernel::Signals;
use crate::net_backend::NetBackend;
use crate::router::HandlerOutcome;

/// `do_read_stream`: pulls from the socket, pushes to `data_endpoint`
/// (spec.md §4.5).
pub fn do_read_stream(core: &mut Core, token: usize) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    if core.ios[token].rbuf.len == 0 {
        if core.ios[token].rbuf.buf.is_none() {
            let buf = core.pool.get();
            core.ios[token].rbuf.buf = Some(buf);
        }

        let n = {
            let ios = &mut core.ios[token];
            let buf = ios.rbuf.buf.as_mut().unwrap();
            core.backend.read(sockfd, &mut buf[..])
        };

        match n {
            Ok(0) => {
                emit_half_close(core, token);
                return HandlerOutcome::Ok;
            }
            Ok(n) => {
                let ios = &mut core.ios[token];
                ios.rbuf.len = n;
                ios.rbuf.off = 0;
            }
            Err(e) if is_would_block(&e) => {
                let _ = core.net_arm_bits(token, sockfd, Signals::READABLE);
                return HandlerOutcome::PendingNet;
            }
            Err(_) => {
                // Hard read error: tolerated the same as EOF (spec.md §9
                // open question — the distinction is lost here too).
                emit_half_close(core, token);
                return HandlerOutcome::Ok;
            }
        }
    }

    // Push.
    while core.ios[token].rbuf.off < core.ios[token].rbuf.len {
        let write_result = {
            let ios = &mut core.ios[token];
            let DataEndpoint::Stream(pipe) = &mut ios.data_endpoint else {
                return HandlerOutcome::Status(Status::BadHandle);
            };
            let buf = ios.rbuf.buf.as_ref().unwrap();
            pipe.write(&buf[ios.rbuf.off..ios.rbuf.len])
        };

        match write_result {
            Ok(n) => core.ios[token].rbuf.off += n,
            Err(e) if is_would_block(&e) => {
                let fd = data_fd(core, token);
                let _ = core.handle_arm_bits(token, fd, Signals::WRITABLE);
                return HandlerOutcome::PendingClient;
            }
            Err(e) => return HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
        }
    }

    // Full drain: rearm for the next socket-readable event.
    let ios = &mut core.ios[token];
    ios.rbuf.len = 0;
    ios.rbuf.off = 0;
    let _ = core.net_arm_bits(token, sockfd, Signals::READABLE);
    HandlerOutcome::PendingNet
}

fn emit_half_close(core: &mut Core, token: usize) {
    if let Some(ios) = core.ios.get_mut(token) {
        if let DataEndpoint::Stream(pipe) = &mut ios.data_endpoint {
            let _ = pipe.write_half_close_marker();
        }
    }
}

fn data_fd(core: &Core, token: usize) -> std::os::unix::io::RawFd {
    match &core.ios[token].data_endpoint {
        DataEndpoint::Stream(p) => std::os::unix::io::AsRawFd::as_raw_fd(p),
        DataEndpoint::Dgram(c) => std::os::unix::io::AsRawFd::as_raw_fd(c),
        DataEndpoint::None => -1,
    }
}

/// `do_write_stream`: pulls from `data_endpoint`, pushes to the socket
/// (spec.md §4.6).
pub fn do_write_stream(core: &mut Core, token: usize) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    if core.ios[token].wbuf.len == 0 {
        if core.ios[token].wbuf.buf.is_none() {
            let buf = core.pool.get();
            core.ios[token].wbuf.buf = Some(buf);
        }

        let read_result = {
            let ios = &mut core.ios[token];
            let DataEndpoint::Stream(pipe) = &mut ios.data_endpoint else {
                return HandlerOutcome::Status(Status::BadHandle);
            };
            let buf = ios.wbuf.buf.as_mut().unwrap();
            pipe.read(&mut buf[..])
        };

        match read_result {
            Ok(0) => return synthesize_close(core, token),
            Ok(n) => {
                let ios = &mut core.ios[token];
                ios.wbuf.len = n;
                ios.wbuf.off = 0;
            }
            Err(e) if is_would_block(&e) => {
                let peer_closed = matches!(&core.ios[token].data_endpoint, DataEndpoint::Stream(p) if p.probe().peer_closed);
                if peer_closed {
                    return synthesize_close(core, token);
                }
                let fd = data_fd(core, token);
                // READABLE also observes PEER_CLOSED/HALFCLOSED at the kernel level
                let _ = core.handle_arm_bits(token, fd, Signals::READABLE);
                return HandlerOutcome::PendingClient;
            }
            Err(_) => {
                emit_half_close(core, token);
                return HandlerOutcome::Ok;
            }
        }
    }

    while core.ios[token].wbuf.off < core.ios[token].wbuf.len {
        let n = {
            let ios = &mut core.ios[token];
            let buf = ios.wbuf.buf.as_ref().unwrap();
            core.backend.write(sockfd, &buf[ios.wbuf.off..ios.wbuf.len])
        };

        match n {
            Ok(n) => core.ios[token].wbuf.off += n,
            Err(e) if is_would_block(&e) => {
                let _ = core.net_arm_bits(token, sockfd, Signals::WRITABLE);
                return HandlerOutcome::PendingNet;
            }
            Err(e) => return HandlerOutcome::Status(status_from_errno(e.raw_os_error().unwrap_or(libc::EIO))),
        }
    }

    let ios = &mut core.ios[token];
    ios.wbuf.len = 0;
    ios.wbuf.off = 0;
    let fd = data_fd(core, token);
    let _ = core.handle_arm_bits(token, fd, Signals::READABLE);
    HandlerOutcome::PendingClient
}

fn synthesize_close(core: &mut Core, token: usize) -> HandlerOutcome {
    super::close::do_close(core, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BUF_SIZE;

    #[test]
    fn signals_map_to_interest() {
        assert_eq!(Signals::READABLE.to_interest(), Some(mio::Interest::READABLE));
        assert_eq!(
            (Signals::READABLE | Signals::WRITABLE).to_interest(),
            Some(mio::Interest::READABLE | mio::Interest::WRITABLE)
        );
        assert_eq!(BUF_SIZE, 65536);
    }
}
