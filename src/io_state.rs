//! Per-connection state record (spec.md §3 "IOState").
//!
//! Grounded on the teacher's `Token`-indexed `slab::Slab` storage pattern
//! (`poll.rs`/`net.rs` register sources under a slab-backed token); the
//! ownership/refcount bookkeeping is the crate's own per spec.md §9
//! ("refcount -> ownership" adopted as written, see DESIGN.md).

use std::os::unix::io::RawFd;

use crate::buffer_pool::Buf;
use crate::kernel::{Channel, Pipe, Signals};

/// Set at creation, immutable (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    None,
    Stream,
    Dgram,
}

/// The server end of the client-facing data endpoint: a byte pipe for
/// `STREAM`, a message channel for `DGRAM`. `NONE` handles have neither.
#[derive(Debug)]
pub enum DataEndpoint {
    None,
    Stream(Pipe),
    Dgram(Channel),
}

impl DataEndpoint {
    pub fn is_none(&self) -> bool {
        matches!(self, DataEndpoint::None)
    }
}

/// Inbound or outbound buffer pipeline (spec.md §3 `rbuf`/`wbuf`).
///
/// Invariant: `0 <= off <= len <= BUF_SIZE`; `buf` is `Some` whenever `len >
/// 0`, and may also be held between drains while `len == 0` to avoid
/// churning the pool.
#[derive(Debug, Default)]
pub struct BufferPipeline {
    pub buf: Option<Buf>,
    pub len: usize,
    pub off: usize,
}

impl BufferPipeline {
    pub fn is_drained(&self) -> bool {
        self.off >= self.len
    }
}

/// Per-connection server-side record (spec.md §3).
#[derive(Debug)]
pub struct IOState {
    pub handle_type: HandleType,
    /// `-1` once closed; a live fd otherwise. Exclusively owned by this
    /// `IOState`.
    pub sockfd: RawFd,
    /// Server end of the RIO control channel; registered with the dispatcher.
    pub rio_endpoint: Channel,
    pub data_endpoint: DataEndpoint,
    pub rbuf: BufferPipeline,
    pub wbuf: BufferPipeline,
    /// Last backend errno observed, readable via `getsockopt(SO_ERROR)`.
    pub last_errno: i32,
    /// Signals currently registered in the wait-set for `data_endpoint`.
    /// Invariant (P1): the wait-set holds an entry for this `IOState` iff
    /// this is non-empty.
    pub watching_signals: Signals,
    /// Per-fd net-side event mask owned by the net multiplexer (READ/WRITE
    /// bits of `Signals`, reused here for `fd_event_set`/`fd_event_clear`).
    pub net_events: Signals,
    /// `>= 1` while `rio_endpoint` is registered; `+1` while `data_endpoint`
    /// is held (spec.md §3, §9). Reaching zero frees the record.
    pub refcount: u32,
    /// Set while a `SIGCONN_R`/`SIGCONN_W` transition is armed on the
    /// socket, so the net multiplexer knows this fd's readiness means
    /// "connect/accept completed" rather than "data pipeline ready"
    /// (spec.md §4.8).
    pub pending_connect: Option<ConnectKind>,
    /// For `STREAM` listening sockets: whether an `INCOMING` signal is
    /// currently asserted on `data_endpoint` (spec.md §4.4, §4.8).
    pub incoming_asserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    /// Waiting for `SIGCONN_W` (connect-in-progress completion).
    Connecting,
    /// Waiting for `SIGCONN_R` (listening socket accept readiness).
    Listening,
}

impl IOState {
    pub fn new(handle_type: HandleType, sockfd: RawFd, rio_endpoint: Channel, data_endpoint: DataEndpoint) -> IOState {
        let refcount = if data_endpoint.is_none() { 1 } else { 2 };
        IOState {
            handle_type,
            sockfd,
            rio_endpoint,
            data_endpoint,
            rbuf: BufferPipeline::default(),
            wbuf: BufferPipeline::default(),
            last_errno: 0,
            watching_signals: Signals::empty(),
            net_events: Signals::empty(),
            refcount,
            pending_connect: None,
            incoming_asserted: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sockfd < 0
    }

    /// Releases one reference; returns `true` if this was the last one and
    /// the record should now be dropped from the slab (spec.md §3, §9).
    #[must_use]
    pub fn release(&mut self) -> bool {
        debug_assert!(self.refcount > 0, "refcount underflow");
        self.refcount -= 1;
        self.refcount == 0
    }
}
