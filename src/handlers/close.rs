//! `CLOSE` and `HALFCLOSE` (spec.md §4.9).

use crate::core::Core;
use crate::io_state::DataEndpoint;
use crate::kernel::Signals;
use crate::net_backend::NetBackend;
use crate::router::HandlerOutcome;

/// Idempotent (spec.md §7): closing an already-closed `IOState` is a no-op.
pub fn do_close(core: &mut Core, token: usize) -> HandlerOutcome {
    let fd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Ok,
    };

    if fd >= 0 {
        let _ = core.backend.close(fd);
        let _ = core.net_disarm(fd);
        core.queues.discard_fd(fd); // spec.md §4.9, §8 P4/scenario 6
        if let Some(ios) = core.ios.get_mut(token) {
            ios.sockfd = -1;
            ios.net_events = Signals::empty();
        }
    }

    // Drop the handle watcher's wait-set entry for data_endpoint, if any
    // (spec.md §3 P1: the entry must not outlive the IOState it's keyed on).
    if let Some(ios) = core.ios.get_mut(token) {
        if !ios.watching_signals.is_empty() {
            let data_fd = match &ios.data_endpoint {
                DataEndpoint::Stream(p) => Some(std::os::unix::io::AsRawFd::as_raw_fd(p)),
                DataEndpoint::Dgram(c) => Some(std::os::unix::io::AsRawFd::as_raw_fd(c)),
                DataEndpoint::None => None,
            };
            ios.watching_signals = Signals::empty();
            if let Some(data_fd) = data_fd {
                let _ = core.handle_disarm(data_fd);
            }
        }
    }

    // spec.md §3 Lifecycle: "the RIO dispatcher releases one ref on
    // peer-close or explicit CLOSE; the CLOSE handler releases the ref
    // taken for data_endpoint." Both collapse into this single
    // client-visible CLOSE, so both releases happen here: one for
    // data_endpoint, one for rio_endpoint. An `IOState` with no
    // data_endpoint only ever held the rio ref, and the second release is
    // then a harmless no-op — the first already dropped it from the slab.
    core.release(token);
    core.release(token);
    HandlerOutcome::Ok
}

/// `backend.shutdown(SHUT_WR)`, then rearm client-side watching for
/// `PEER_CLOSED` (spec.md §4.9).
pub fn do_halfclose(core: &mut Core, token: usize) -> HandlerOutcome {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return HandlerOutcome::Ok,
    };

    let _ = core.backend.shutdown_write(sockfd);

    let stream_fd = match core.ios.get_mut(token) {
        Some(ios) => {
            ios.watching_signals |= Signals::PEER_CLOSED;
            match &ios.data_endpoint {
                DataEndpoint::Stream(pipe) => Some(std::os::unix::io::AsRawFd::as_raw_fd(pipe)),
                _ => None,
            }
        }
        None => None,
    };
    if let Some(fd) = stream_fd {
        let _ = core.handle_arm_bits(token, fd, Signals::READABLE);
    }

    HandlerOutcome::Ok
}
