//! Net multiplexer (spec.md §4.11): a readiness loop over every registered
//! socket fd, translated into `RunnerJob`s for the runner thread.
//!
//! Grounded on `flux-network`'s connector/stream poll loops (arm-then-wait,
//! `Interest`-driven re-registration) and the teacher's own `event_loop.rs`
//! shape: one thread blocks in `Poll::poll`, everything else is a message.

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
            warn!(target: "sockproxy_core::net_mux", error = %e, "poll failed");
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
            debug!(target: "sockproxy_core::net_mux", token, ?observed, "socket ready");

            if job_tx.send(RunnerJob { token, source: JobSource::Net, observed }).is_err() {
                return; // runner thread gone; shut down quietly
            }
        }
        runner_waker.wake().ok();
    }
}
