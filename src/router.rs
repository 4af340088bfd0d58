//! Operation router (spec.md §4.3): op-codes map to handlers, each
//! returning one of four outcomes. Grounded on spec.md §9's "callback-free
//! state machine" note — no stored continuations, just an explicit enum the
//! runner matches on.

use crate::core::Core;
use crate::error::Status;
use crate::handlers;
use crate::kernel::Signals;
use crate::rio::{OpCode, RioReply};

/// What a handler invocation produced (spec.md §4.3).
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Complete; send the default `{Ok}` reply if `op` emits one.
    Ok,
    /// Complete; send this specific reply instead of the default (`OPEN`'s
    /// extra handles, `GETSOCKNAME`'s address, `IOCTL`'s reply struct, ...).
    OkWithReply(RioReply),
    /// Suspend on socket readiness (net-wait, keyed by `sockfd`).
    PendingNet,
    /// Suspend on data-endpoint readiness (client-wait).
    PendingClient,
    /// Complete with a non-OK status.
    Status(Status),
}

impl HandlerOutcome {
    /// The reply the runner writes back on the originating `rio_endpoint`,
    /// or `None` if `op` is one of the internal pseudo-ops that never reply
    /// (spec.md §4.3) or the handler suspended.
    pub fn into_reply(self, op: OpCode) -> Option<RioReply> {
        match self {
            HandlerOutcome::Ok if crate::rio::emits_reply(op) => Some(RioReply::status_only(Status::Ok)),
            HandlerOutcome::Ok => None,
            HandlerOutcome::OkWithReply(r) => Some(r),
            HandlerOutcome::PendingNet | HandlerOutcome::PendingClient => None,
            HandlerOutcome::Status(s) if crate::rio::emits_reply(op) => Some(RioReply::status_only(s)),
            HandlerOutcome::Status(_) => None,
        }
    }
}

/// Dispatches one request to its handler. `token` identifies the `IOState`
/// the op applies to; `observed` carries the readiness mask that resumed a
/// previously-suspended request (empty for a freshly-read RIO message).
pub fn dispatch(
    core: &mut Core,
    token: usize,
    op: OpCode,
    payload: Vec<u8>,
    handles: Vec<std::os::unix::io::RawFd>,
    observed: Signals,
) -> HandlerOutcome {
    match op {
        OpCode::Open => handlers::open::do_open(core, token, &payload),
        OpCode::Close => handlers::close::do_close(core, token),
        OpCode::Connect => handlers::connect::do_connect(core, token, &payload),
        OpCode::Bind => handlers::connect::do_bind(core, token, &payload),
        OpCode::Listen => handlers::connect::do_listen(core, token, &payload),
        OpCode::Ioctl => handlers::ioctl::do_ioctl(core, token, &payload),
        OpCode::GetAddrInfo => handlers::ioctl::do_getaddrinfo(core, token, &payload),
        OpCode::GetSockName => handlers::ioctl::do_getsockname(core, token),
        OpCode::GetPeerName => handlers::ioctl::do_getpeername(core, token),
        OpCode::GetSockOpt => handlers::ioctl::do_getsockopt(core, token, &payload),
        OpCode::SetSockOpt => handlers::ioctl::do_setsockopt(core, token, &payload),
        OpCode::Write => match core.ios[token].handle_type {
            crate::io_state::HandleType::Dgram => handlers::dgram_io::do_write_dgram(core, token),
            _ => handlers::stream_io::do_write_stream(core, token),
        },
        OpCode::Read => match core.ios[token].handle_type {
            crate::io_state::HandleType::Dgram => handlers::dgram_io::do_read_dgram(core, token),
            _ => handlers::stream_io::do_read_stream(core, token),
        },
        OpCode::Status => HandlerOutcome::Ok,
        OpCode::HalfClose => handlers::close::do_halfclose(core, token),
        OpCode::SigConnR => handlers::connect::do_sigconn_r(core, token, observed),
        OpCode::SigConnW => handlers::connect::do_sigconn_w(core, token, observed),
    }
}
