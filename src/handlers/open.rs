//! `OPEN` path-based dispatch (spec.md §4.4).

use mio::Interest;

use crate::core::Core;
use crate::error::{status_from_errno, Status};
use crate::handlers::{close_unsent_handles, create_handles};
use crate::io_state::{ConnectKind, HandleType};
use crate::kernel::Signals;
use crate::net_backend::NetBackend;
use crate::rio::{parse_open_path, OpenTarget, RioReply};
use crate::router::HandlerOutcome;

pub fn do_open(core: &mut Core, _parent_token: usize, payload: &[u8]) -> HandlerOutcome {
    let target = match parse_open_path(payload) {
        Ok(t) => t,
        Err(_) => return HandlerOutcome::Status(Status::InvalidArgs),
    };

    match target {
        OpenTarget::None => open_none(core),
        OpenTarget::Socket { domain, kind, protocol } => open_socket(core, domain, kind, protocol),
        OpenTarget::Accept => do_accept(core, _parent_token),
    }
}

fn open_none(core: &mut Core) -> HandlerOutcome {
    match create_handles(HandleType::None, -1) {
        Ok((ios, handles)) => {
            core.insert(ios);
            HandlerOutcome::OkWithReply(RioReply::opened(Status::Ok, handles))
        }
        Err(_) => HandlerOutcome::Status(Status::NoResources),
    }
}

fn open_socket(core: &mut Core, domain: i32, kind: i32, protocol: i32) -> HandlerOutcome {
    let handle_type = if kind == libc::SOCK_STREAM {
        HandleType::Stream
    } else if kind == libc::SOCK_DGRAM {
        HandleType::Dgram
    } else {
        return HandlerOutcome::Status(Status::NotSupported);
    };

    let fd = match core.backend.socket(domain, kind, protocol) {
        Ok(fd) => fd,
        Err(e) => return HandlerOutcome::Status(e.raw_os_error().map(status_from_errno).unwrap_or(Status::Io)),
    };

    match create_handles(handle_type, fd) {
        Ok((ios, handles)) => {
            let token = core.insert(ios);
            if handle_type == HandleType::Dgram {
                let ios = &core.ios[token];
                if let crate::io_state::DataEndpoint::Dgram(ch) = &ios.data_endpoint {
                    let data_fd = std::os::unix::io::AsRawFd::as_raw_fd(ch);
                    let _ = core.handle_arm(token, data_fd, Interest::READABLE);
                }
            }
            HandlerOutcome::OkWithReply(RioReply::opened(Status::Ok, handles))
        }
        Err(_) => {
            let _ = core.backend.close(fd);
            HandlerOutcome::Status(Status::NoResources)
        }
    }
}

/// `accept` (spec.md §4.4, §4.8): on `EWOULDBLOCK`, reports `SHOULD_WAIT`
/// and rearms `SIGCONN_R` rather than suspending this request — the parent
/// listening socket's own net-side wait is what resumes later, not this
/// `OPEN` call.
fn do_accept(core: &mut Core, parent_token: usize) -> HandlerOutcome {
    let parent_sockfd = match core.ios.get(parent_token) {
        Some(p) => p.sockfd,
        None => return HandlerOutcome::Status(Status::BadHandle),
    };

    match core.backend.accept(parent_sockfd) {
        Ok((child_fd, _addr)) => {
            if let Some(parent) = core.ios.get_mut(parent_token) {
                parent.incoming_asserted = false;
            }
            rearm_sigconn_r(core, parent_token, parent_sockfd);

            match create_handles(HandleType::Stream, child_fd) {
                Ok((ios, handles)) => {
                    let token = core.insert(ios);
                    let _ = core.net_arm_bits(token, child_fd, Signals::READABLE | Signals::WRITABLE);
                    HandlerOutcome::OkWithReply(RioReply::opened(Status::Ok, handles))
                }
                Err(_) => {
                    let _ = core.backend.close(child_fd);
                    HandlerOutcome::Status(Status::NoResources)
                }
            }
        }
        Err(e) if crate::error::is_would_block(&e) => {
            rearm_sigconn_r(core, parent_token, parent_sockfd);
            HandlerOutcome::Status(Status::ShouldWait)
        }
        Err(e) => HandlerOutcome::Status(e.raw_os_error().map(status_from_errno).unwrap_or(Status::Io)),
    }
}

fn rearm_sigconn_r(core: &mut Core, parent_token: usize, parent_sockfd: i32) {
    if let Some(parent) = core.ios.get_mut(parent_token) {
        parent.pending_connect = Some(ConnectKind::Listening);
    }
    let _ = core.net_arm_bits(parent_token, parent_sockfd, Signals::READABLE);
}

/// Used by the dispatcher after a reply write fails, to release handles
/// that were about to be sent (spec.md §7).
pub fn discard_reply_handles(reply: &RioReply) {
    close_unsent_handles(&reply.handles);
}
