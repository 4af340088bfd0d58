//! Scenario 6 / P4 (spec.md §5, §8): `CLOSE` purges both wait-queues for the
//! closed fd before releasing the `IOState`, so a request that was parked
//! mid-flight never gets dispatched against a handle that's already gone.

mod common;

use std::os::unix::io::IntoRawFd;

use sockproxy_core::handlers::close::do_close;
use sockproxy_core::io_state::{DataEndpoint, HandleType, IOState};
use sockproxy_core::kernel::Channel;
use sockproxy_core::queues::Request;
use sockproxy_core::rio::OpCode;
use sockproxy_core::router::HandlerOutcome;

#[test]
fn close_discards_queued_requests_on_both_queues() {
    let mut core = common::test_core();

    // Stand-in "socket" fd: any open fd works for exercising the queue
    // purge, since `do_close` only needs a valid, owned fd to pass to
    // `backend.close`.
    let (extra_a, extra_b) = Channel::pair().unwrap();
    let sockfd = extra_a.into_raw_fd();
    drop(extra_b);

    let (rio_server, _rio_client) = Channel::pair().unwrap();
    let ios = IOState::new(HandleType::None, sockfd, rio_server, DataEndpoint::None);
    let token = core.insert(ios);

    core.queues.net_wait.push(sockfd, Request::new(OpCode::Read, token, Vec::new(), Vec::new()));
    core.queues.client_wait.push(sockfd, Request::new(OpCode::Write, token, Vec::new(), Vec::new()));
    assert!(!core.queues.net_wait.is_empty_for(sockfd));
    assert!(!core.queues.client_wait.is_empty_for(sockfd));

    let outcome = do_close(&mut core, token);
    assert!(matches!(outcome, HandlerOutcome::Ok));

    assert!(core.queues.net_wait.is_empty_for(sockfd), "net_wait must be purged by CLOSE");
    assert!(core.queues.client_wait.is_empty_for(sockfd), "client_wait must be purged by CLOSE");
    assert!(core.ios.get(token).is_none(), "CLOSE releases the IOState's own reference");
}

#[test]
fn close_is_idempotent() {
    let mut core = common::test_core();
    let (extra_a, extra_b) = Channel::pair().unwrap();
    let sockfd = extra_a.into_raw_fd();
    drop(extra_b);

    let (rio_server, _rio_client) = Channel::pair().unwrap();
    let ios = IOState::new(HandleType::None, sockfd, rio_server, DataEndpoint::None);
    let token = core.insert(ios);

    assert!(matches!(do_close(&mut core, token), HandlerOutcome::Ok));
    // Second CLOSE on an already-removed token is a no-op, not a panic.
    assert!(matches!(do_close(&mut core, token), HandlerOutcome::Ok));
}
