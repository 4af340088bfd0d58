//! The RIO dispatcher (spec.md §4 ADD, §5, §9): single thread, owns `Core`
//! exclusively, drives the root listener's accept loop, every `rio_endpoint`
//! message, and the `RunnerJob`s posted by `net_mux`/`handle_watcher`.
//!
//! Grounded on the teacher's `event_loop.rs` run loop shape (one `Poll`,
//! one `Events` buffer, a reserved notify token) generalized to three
//! sources of work instead of one.

use std::os::unix::io::IntoRawFd;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use mio::net::UnixListener;
use mio::{Events, Poll, Token};
use tracing::{debug, error, warn};

use crate::core::Core;
use crate::error::is_would_block;
use crate::io_state::{ConnectKind, DataEndpoint, HandleType, IOState};
use crate::kernel::{Channel, Signals};
use crate::queues::Request;
use crate::rio::{OpCode, RioMessage};
use crate::router::{self, HandlerOutcome};
use crate::runner_job::{JobSource, RunnerJob};

/// Reserved past any real `IOState` slab token (`slab` tokens start at 0 and
/// grow densely, so `usize::MAX` and its neighbor are always free).
const WAKER_TOKEN: Token = Token(usize::MAX);
const LISTENER_TOKEN: Token = Token(usize::MAX - 1);

pub fn run(mut core: Core, rio_poll: Poll, mut listener: UnixListener, job_rx: Receiver<RunnerJob>) {
    let mut rio_poll = rio_poll;
    if let Err(e) = rio_poll.registry().register(&mut listener, LISTENER_TOKEN, mio::Interest::READABLE) {
        error!(target: "sockproxy_core::dispatcher", error = %e, "failed to register root listener");
        return;
    }

    let mut events = Events::with_capacity(1024);
    loop {
        if let Err(e) = rio_poll.poll(&mut events, Some(Duration::from_secs(1))) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            warn!(target: "sockproxy_core::dispatcher", error = %e, "poll failed");
            continue;
        }

        for event in events.iter() {
            match event.token() {
                WAKER_TOKEN => drain_jobs(&mut core, &job_rx),
                LISTENER_TOKEN => accept_loop(&mut core, &listener),
                Token(token) => on_rio_readable(&mut core, token),
            }
        }

        // The waker coalesces bursts of jobs into one wakeup; always drain
        // once more per tick in case jobs arrived between the last drain
        // and `poll()` blocking again (a race the waker can't fully close).
        drain_jobs(&mut core, &job_rx);
    }
}

/// Drains at most `config.jobs_per_tick` jobs before returning to `poll()`,
/// so a burst on one fd can't starve the rest of the loop indefinitely
/// (spec.md §5 "no handler-level timeouts" still holds per-request; this
/// bounds only how many *separate* requests run before the next `poll`).
fn drain_jobs(core: &mut Core, job_rx: &Receiver<RunnerJob>) {
    let limit = core.config.jobs_per_tick;
    for _ in 0..limit {
        match job_rx.try_recv() {
            Ok(job) => process_job(core, job),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => return,
        }
    }
}

fn process_job(core: &mut Core, job: RunnerJob) {
    match job.source {
        JobSource::Net => on_net_ready(core, job.token, job.observed),
        JobSource::Client => on_client_ready(core, job.token, job.observed),
    }
}

/// A root-listener connection becomes a `NONE`-handle `IOState` whose
/// `rio_endpoint` is the accepted stream, wrapped as a `Channel` (spec.md §3
/// bootstrap path; see DESIGN.md for the `SOCK_STREAM`-as-`Channel`
/// simplification this takes for the handshake-only root socket).
fn accept_loop(core: &mut Core, listener: &UnixListener) {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let fd = stream.into_raw_fd();
                let channel = unsafe { Channel::from_raw_fd(fd) };
                let ios = IOState::new(HandleType::None, -1, channel, DataEndpoint::None);
                core.insert(ios);
                debug!(target: "sockproxy_core::dispatcher", fd, "accepted root connection");
            }
            Err(e) if is_would_block(&e) => return,
            Err(e) => {
                warn!(target: "sockproxy_core::dispatcher", error = %e, "accept failed");
                return;
            }
        }
    }
}

/// One `rio_endpoint` became readable: decode and dispatch exactly one RIO
/// message (spec.md §6). A well-behaved client sends at most one in-flight
/// request per channel, so draining a single message per event is enough;
/// leftover bytes (there shouldn't be any, `SOCK_SEQPACKET` preserves
/// boundaries) would simply wait for the next readiness event.
fn on_rio_readable(core: &mut Core, token: usize) {
    let recv_result = match core.ios.get(token) {
        Some(ios) => ios.rio_endpoint.recv(),
        None => return,
    };

    let (raw, handles) = match recv_result {
        Ok(pair) => pair,
        Err(e) if is_would_block(&e) => return,
        Err(_) => {
            // Control channel gone: treat like an explicit CLOSE.
            dispatch_and_reply(core, token, OpCode::Close, Vec::new(), Vec::new());
            return;
        }
    };

    if raw.is_empty() {
        // Peer dropped its end of the control channel.
        dispatch_and_reply(core, token, OpCode::Close, Vec::new(), Vec::new());
        return;
    }

    let msg = match RioMessage::decode(&raw, handles) {
        Ok(msg) => msg,
        Err(stray_handles) => {
            // Malformed header: nothing to dispatch, but any handles that
            // rode with the bad message still need closing (spec.md §7).
            crate::handlers::close_unsent_handles(&stray_handles);
            return;
        }
    };

    dispatch_and_reply(core, token, msg.op, msg.payload, msg.handles);
}

fn dispatch_and_reply(core: &mut Core, token: usize, op: OpCode, payload: Vec<u8>, handles: Vec<std::os::unix::io::RawFd>) {
    let outcome = router::dispatch(core, token, op, payload.clone(), handles.clone(), Signals::empty());
    settle(core, token, op, payload, handles, outcome);
}

/// Applies a `HandlerOutcome`: writes a reply, queues the request for later
/// resumption, or (for the internal pseudo-ops) does nothing further.
fn settle(
    core: &mut Core,
    token: usize,
    op: OpCode,
    payload: Vec<u8>,
    handles: Vec<std::os::unix::io::RawFd>,
    outcome: HandlerOutcome,
) {
    match outcome {
        HandlerOutcome::PendingNet => {
            if let Some(ios) = core.ios.get(token) {
                let sockfd = ios.sockfd;
                core.queues.net_wait.push(sockfd, Request::new(op, token, payload, handles));
            }
        }
        HandlerOutcome::PendingClient => {
            if let Some(ios) = core.ios.get(token) {
                let sockfd = ios.sockfd;
                core.queues.client_wait.push(sockfd, Request::new(op, token, payload, handles));
            }
        }
        other => {
            if let Some(reply) = other.into_reply(op) {
                send_reply(core, token, reply);
            }
        }
    }
}

fn send_reply(core: &mut Core, token: usize, reply: crate::rio::RioReply) {
    let ios = match core.ios.get(token) {
        Some(ios) => ios,
        None => {
            crate::handlers::open::discard_reply_handles(&reply);
            return;
        }
    };
    let frame = reply.encode();
    if ios.rio_endpoint.send(&frame, &reply.handles).is_err() {
        // spec.md §7: a dropped reply closes the handles it would have sent.
        crate::handlers::open::discard_reply_handles(&reply);
    }
}

/// Net readiness for `token`'s socket (spec.md §4.11/§4.12 resumption path):
/// replays whatever was queued in `net_wait`, or — if nothing was queued —
/// this is the first readiness event after an `OPEN`/`ACCEPT`/`CONNECT`
/// armed the socket, so kick the read/write pump directly.
fn on_net_ready(core: &mut Core, token: usize, observed: Signals) {
    let (sockfd, pending_connect) = match core.ios.get(token) {
        Some(ios) => (ios.sockfd, ios.pending_connect),
        None => return,
    };
    if sockfd < 0 {
        return;
    }

    match pending_connect {
        Some(ConnectKind::Connecting) if observed.contains(Signals::WRITABLE) => {
            dispatch_and_reply(core, token, OpCode::SigConnW, Vec::new(), Vec::new());
            return;
        }
        Some(ConnectKind::Listening) if observed.contains(Signals::READABLE) => {
            dispatch_and_reply(core, token, OpCode::SigConnR, Vec::new(), Vec::new());
            return;
        }
        _ => {}
    }

    let queued = core.queues.net_wait.drain(sockfd);
    if queued.is_empty() {
        if observed.contains(Signals::READABLE) {
            run_pump(core, token, OpCode::Read, observed);
        }
        if observed.contains(Signals::WRITABLE) {
            run_pump(core, token, OpCode::Write, observed);
        }
        return;
    }
    for req in queued {
        let outcome = router::dispatch(core, req.ios_token, req.op, req.payload.clone(), req.handles.clone(), observed);
        settle(core, req.ios_token, req.op, req.payload, req.handles, outcome);
    }
}

/// Data-endpoint readiness for `token` (spec.md §4.12): symmetric to
/// `on_net_ready`, keyed by the same socket fd so `CLOSE`'s single purge
/// (spec.md §4.9) reaches both queues.
fn on_client_ready(core: &mut Core, token: usize, observed: Signals) {
    let sockfd = match core.ios.get(token) {
        Some(ios) => ios.sockfd,
        None => return,
    };
    if sockfd < 0 {
        return;
    }

    let queued = core.queues.client_wait.drain(sockfd);
    if queued.is_empty() {
        // Readable/peer-closed on the data endpoint means the client has
        // something to push out (`WRITE`); writable means the read pipeline
        // was waiting for room to push the socket's bytes in (`READ`).
        if observed.intersects(Signals::READABLE | Signals::PEER_CLOSED | Signals::HALFCLOSED) {
            run_pump(core, token, OpCode::Write, observed);
        }
        if observed.contains(Signals::WRITABLE) {
            run_pump(core, token, OpCode::Read, observed);
        }
        return;
    }
    for req in queued {
        let outcome = router::dispatch(core, req.ios_token, req.op, req.payload.clone(), req.handles.clone(), observed);
        settle(core, req.ios_token, req.op, req.payload, req.handles, outcome);
    }
}

fn run_pump(core: &mut Core, token: usize, op: OpCode, observed: Signals) {
    let outcome = router::dispatch(core, token, op, Vec::new(), Vec::new(), observed);
    settle(core, token, op, Vec::new(), Vec::new(), outcome);
}
