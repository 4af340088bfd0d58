//! The `Core` aggregate (spec.md §9 "Global mutable state"): owns every
//! process-wide structure the original treats as module statics, with
//! explicit init/teardown, passed to handlers instead of touched globally.

use std::io;
use std::os::unix::io::RawFd;

use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use slab::Slab;

use crate::buffer_pool::BufferPool;
use crate::config::Config;
use crate::io_state::IOState;
use crate::kernel::Signals;
use crate::net_backend::{NetBackend, UnixNetBackend};
use crate::queues::WaitQueues;

pub struct Core {
    pub ios: Slab<IOState>,
    pub queues: WaitQueues,
    pub pool: BufferPool,
    pub backend: Box<dyn NetBackend + Send>,
    pub config: Config,
    /// Clone of the net multiplexer's `Poll::registry()` (spec.md §4.11):
    /// arming a socket fd from the runner thread is just registering it
    /// here; the net-mux thread's own `poll()` call picks it up.
    net_registry: Registry,
    /// Clone of the handle watcher's `Poll::registry()` (spec.md §4.12),
    /// symmetric to `net_registry` for `data_endpoint` fds.
    handle_registry: Registry,
    /// The dispatcher's own `Poll::registry()` (spec.md §4 ADD "RIO
    /// dispatcher loop"), used to register every `rio_endpoint` for
    /// `READABLE` as soon as its `IOState` exists.
    rio_registry: Registry,
}

impl Core {
    pub fn new(config: Config, net_registry: Registry, handle_registry: Registry, rio_registry: Registry) -> Core {
        let mut pool = BufferPool::new();
        for _ in 0..config.buffer_pool_prewarm {
            let buf = pool.get();
            pool.put(buf);
        }
        Core {
            ios: Slab::new(),
            queues: WaitQueues::new(),
            pool,
            backend: Box::new(UnixNetBackend::new()),
            config,
            net_registry,
            handle_registry,
            rio_registry,
        }
    }

    /// Inserts a freshly-created `IOState`, returning its slab token — the
    /// integer cookie used everywhere in place of the `IOState*` spec.md
    /// describes (wait-set `Token`, `WaitQueue` keys are by fd, not token,
    /// but callers that need to look the record back up use this). Also
    /// registers the new record's `rio_endpoint` with the dispatcher, per
    /// spec.md §3 ("`rio_endpoint` is registered with the RIO dispatcher").
    pub fn insert(&mut self, ios: IOState) -> usize {
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&ios.rio_endpoint);
        let token = self.ios.insert(ios);
        let _ = self.rio_registry.register(&mut SourceFd(&fd), Token(token), Interest::READABLE);
        token
    }

    /// Releases one reference on the `IOState` at `token`; if it was the
    /// last one, removes and drops it (returning its pooled buffers), per
    /// spec.md §3/§9.
    pub fn release(&mut self, token: usize) {
        let last = match self.ios.get_mut(token) {
            Some(ios) => ios.release(),
            None => return,
        };
        if last {
            let ios = self.ios.remove(token);
            let rio_fd = std::os::unix::io::AsRawFd::as_raw_fd(&ios.rio_endpoint);
            let _ = self.rio_registry.deregister(&mut SourceFd(&rio_fd));
            if let Some(buf) = ios.rbuf.buf {
                self.pool.put(buf);
            }
            if let Some(buf) = ios.wbuf.buf {
                self.pool.put(buf);
            }
        }
    }

    /// `fd_event_set` (spec.md §4.11): arms `fd` in the net multiplexer's
    /// wait-set for `interest`, keyed by `token` (the `IOState` slab index).
    pub fn net_arm(&self, token: usize, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut source = SourceFd(&fd);
        match self.net_registry.reregister(&mut source, Token(token), interest) {
            Ok(()) => Ok(()),
            Err(_) => self.net_registry.register(&mut source, Token(token), interest),
        }
    }

    /// `fd_event_clear` (spec.md §4.11).
    pub fn net_disarm(&self, fd: RawFd) -> io::Result<()> {
        self.net_registry.deregister(&mut SourceFd(&fd))
    }

    /// Merges `bits` into `ios.net_events` and re-arms with the union, so
    /// that a concurrently-pending read and write on the same fd (each
    /// requesting a different single bit) don't clobber each other's
    /// registration — `mio::Registry::reregister` replaces interest, it
    /// doesn't union it (spec.md §4.11 `fd_event_set`).
    pub fn net_arm_bits(&mut self, token: usize, fd: RawFd, bits: Signals) -> io::Result<()> {
        if let Some(ios) = self.ios.get_mut(token) {
            ios.net_events |= bits;
        }
        match self.ios.get(token).and_then(|i| i.net_events.to_interest()) {
            Some(interest) => self.net_arm(token, fd, interest),
            None => self.net_disarm(fd),
        }
    }

    /// `fd_event_clear` for a subset of bits (spec.md §4.11).
    pub fn net_disarm_bits(&mut self, token: usize, fd: RawFd, bits: Signals) -> io::Result<()> {
        if let Some(ios) = self.ios.get_mut(token) {
            ios.net_events.remove(bits);
        }
        match self.ios.get(token).and_then(|i| i.net_events.to_interest()) {
            Some(interest) => self.net_arm(token, fd, interest),
            None => self.net_disarm(fd),
        }
    }

    /// `socket_signals_set`/replace (spec.md §4.12): arms `fd` (the
    /// `data_endpoint`) in the handle watcher's wait-set under `token`.
    pub fn handle_arm(&self, token: usize, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut source = SourceFd(&fd);
        match self.handle_registry.reregister(&mut source, Token(token), interest) {
            Ok(()) => Ok(()),
            Err(_) => self.handle_registry.register(&mut source, Token(token), interest),
        }
    }

    /// `socket_signals_clear` when `watching_signals` becomes empty
    /// (spec.md §3 P1, §4.12).
    pub fn handle_disarm(&self, fd: RawFd) -> io::Result<()> {
        self.handle_registry.deregister(&mut SourceFd(&fd))
    }

    /// Merges `bits` into `ios.watching_signals` before re-arming, the
    /// handle-side counterpart of `net_arm_bits`: the read and write
    /// pipelines watch the same `data_endpoint` fd for opposite directions
    /// (one waits for it to become writable, the other readable), and a
    /// bare `reregister` would let the later call clobber the earlier one.
    pub fn handle_arm_bits(&mut self, token: usize, fd: RawFd, bits: Signals) -> io::Result<()> {
        if let Some(ios) = self.ios.get_mut(token) {
            ios.watching_signals |= bits;
        }
        match self.ios.get(token).and_then(|i| i.watching_signals.to_interest()) {
            Some(interest) => self.handle_arm(token, fd, interest),
            None => self.handle_disarm(fd),
        }
    }

    pub fn handle_disarm_bits(&mut self, token: usize, fd: RawFd, bits: Signals) -> io::Result<()> {
        if let Some(ios) = self.ios.get_mut(token) {
            ios.watching_signals.remove(bits);
        }
        match self.ios.get(token).and_then(|i| i.watching_signals.to_interest()) {
            Some(interest) => self.handle_arm(token, fd, interest),
            None => self.handle_disarm(fd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_state::{DataEndpoint, HandleType};
    use crate::kernel::Channel;

    fn test_core() -> Core {
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

    #[test]
    fn release_frees_on_last_ref() {
        let mut core = test_core();
        let (server_end, _client_end) = Channel::pair().unwrap();
        let ios = IOState::new(HandleType::None, -1, server_end, DataEndpoint::None);
        let token = core.insert(ios);
        assert!(core.ios.get(token).is_some());
        core.release(token);
        assert!(core.ios.get(token).is_none());
    }
}
