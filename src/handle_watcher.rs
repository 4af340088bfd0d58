//! Handle watcher (spec.md §4.12): a second readiness loop over every
//! `data_endpoint` fd, symmetric to `net_mux`.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Poll, Waker};
use tracing::{debug, warn};

use crate::kernel::Signals;
use crate::runner_job::{JobSource, RunnerJob};

pub fn run(mut poll: Poll, job_tx: Sender<RunnerJob>, runner_waker: Arc<Waker>) {
    let mut events = Events::with_capacity(1024);
    loop {
        if let Err(e) = poll.poll(&mut events, Some(Duration::from_secs(1))) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            warn!(target: "sockproxy_core::handle_watcher", error = %e, "poll failed");
            continue;
        }

        for event in events.iter() {
            let token = event.token().0;
            let mut observed = Signals::empty();
            if event.is_readable() {
                observed |= Signals::READABLE;
            }
            if event.is_writable() {
                observed |= Signals::WRITABLE;
            }
            if event.is_read_closed() || event.is_error() {
                observed |= Signals::PEER_CLOSED;
            }
            debug!(target: "sockproxy_core::handle_watcher", token, ?observed, "data endpoint ready");

            if job_tx.send(RunnerJob { token, source: JobSource::Client, observed }).is_err() {
                return;
            }
        }
        runner_waker.wake().ok();
    }
}
