//! Request queues: net-wait and client-wait, both keyed by socket fd
//! (spec.md §3 "Request", §5).

use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;

use slab::Slab;

use crate::rio::OpCode;

/// `(op, rio_endpoint, message?, IOState*)` from spec.md §3, made concrete:
/// `ios_token` is the slab key standing in for the `IOState*`, and the
/// optional message is the already-decoded RIO payload + any handles that
/// rode with it. A request lives on at most one queue at a time (P3);
/// ownership transfers to the handler when dequeued.
#[derive(Debug)]
pub struct Request {
    pub op: OpCode,
    pub ios_token: usize,
    pub payload: Vec<u8>,
    pub handles: Vec<RawFd>,
}

impl Request {
    pub fn new(op: OpCode, ios_token: usize, payload: Vec<u8>, handles: Vec<RawFd>) -> Request {
        Request { op, ios_token, payload, handles }
    }
}

/// One of the two keyed multimaps spec.md §3 names. Keyed by socket fd, not
/// by `IOState` token, because a `CLOSE` purges by fd (spec.md §4.9,
/// §8 P4) and the fd is the stable handle across the purge.
#[derive(Debug, Default)]
pub struct WaitQueue {
    by_fd: HashMap<RawFd, VecDeque<Request>>,
}

impl WaitQueue {
    pub fn new() -> WaitQueue {
        WaitQueue::default()
    }

    pub fn push(&mut self, fd: RawFd, req: Request) {
        self.by_fd.entry(fd).or_default().push_back(req);
    }

    /// Detaches every request queued for `fd`, in FIFO order (spec.md §5
    /// ordering guarantee).
    pub fn drain(&mut self, fd: RawFd) -> VecDeque<Request> {
        self.by_fd.remove(&fd).unwrap_or_default()
    }

    /// Discards every request queued for `fd` without dispatching them
    /// (spec.md §4.9 `CLOSE`, §5 "Cancellation", §8 P4/scenario 6).
    pub fn discard(&mut self, fd: RawFd) {
        self.by_fd.remove(&fd);
    }

    pub fn is_empty_for(&self, fd: RawFd) -> bool {
        self.by_fd.get(&fd).map_or(true, |q| q.is_empty())
    }

    #[cfg(test)]
    pub fn len_for(&self, fd: RawFd) -> usize {
        self.by_fd.get(&fd).map_or(0, |q| q.len())
    }
}

/// Both queues spec.md §2/§3 name, bundled since every `CLOSE` purges both
/// (spec.md §4.9) and no code path touches one without the other nearby.
#[derive(Debug, Default)]
pub struct WaitQueues {
    pub net_wait: WaitQueue,
    pub client_wait: WaitQueue,
}

impl WaitQueues {
    pub fn new() -> WaitQueues {
        WaitQueues::default()
    }

    /// `wait_queue_discard` (spec.md §5, §9 glossary): purges both queues
    /// for `fd`. Called from `CLOSE` before refs are released.
    pub fn discard_fd(&mut self, fd: RawFd) {
        self.net_wait.discard(fd);
        self.client_wait.discard(fd);
    }
}

/// The `IOState` table. A real `slab::Slab` (not the teacher's hand-rolled
/// one) gives stable integer tokens across insert/remove, which both the
/// wait-set cookies (`mio::Token`) and `WaitQueue` requests key off of.
pub type IoStateTable<T> = Slab<T>;

#[cfg(test)]
mod tests {
    use super::*;

    fn req(op: OpCode, token: usize) -> Request {
        Request::new(op, token, Vec::new(), Vec::new())
    }

    #[test]
    fn drains_in_fifo_order() {
        let mut q = WaitQueue::new();
        q.push(7, req(OpCode::Read, 0));
        q.push(7, req(OpCode::Read, 1));
        let drained = q.drain(7);
        let tokens: Vec<usize> = drained.iter().map(|r| r.ios_token).collect();
        assert_eq!(tokens, vec![0, 1]);
        assert!(q.is_empty_for(7));
    }

    #[test]
    fn discard_purges_both_queues() {
        let mut qs = WaitQueues::new();
        qs.net_wait.push(5, req(OpCode::Read, 0));
        qs.client_wait.push(5, req(OpCode::Write, 0));
        qs.discard_fd(5);
        assert_eq!(qs.net_wait.len_for(5), 0);
        assert_eq!(qs.client_wait.len_for(5), 0);
    }
}
