//! Scenario 1 (spec.md §8): several clients connect to a listening socket
//! back to back; each `OPEN accept` must hand back a distinct child
//! `IOState`, and closing everything afterwards must leave the table empty.

mod common;

use std::net::TcpStream;

use sockproxy_core::kernel::Signals;
use sockproxy_core::rio::OpCode;
use sockproxy_core::router::{dispatch, HandlerOutcome};

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

#[test]
fn accepts_a_burst_of_connections() {
    let mut core = common::test_core();

    let outcome = dispatch(&mut core, 0, OpCode::Open, nul_terminated("socket/2/1/0"), Vec::new(), Signals::empty());
    assert!(matches!(&outcome, HandlerOutcome::OkWithReply(_)), "listener OPEN failed: {outcome:?}");
    let listener_token = 0usize;

    let bind_payload = common::encode_addr(std::net::Ipv4Addr::new(127, 0, 0, 1), 0);
    let outcome = dispatch(&mut core, listener_token, OpCode::Bind, bind_payload, Vec::new(), Signals::empty());
    assert!(matches!(&outcome, HandlerOutcome::Ok), "bind failed: {outcome:?}");

    let outcome = dispatch(&mut core, listener_token, OpCode::GetSockName, Vec::new(), Vec::new(), Signals::empty());
    let (_addr, port) = match outcome {
        HandlerOutcome::OkWithReply(reply) => common::decode_addr_reply(&reply.data),
        other => panic!("unexpected GETSOCKNAME outcome: {other:?}"),
    };

    let listen_payload = 16i32.to_le_bytes().to_vec();
    let outcome = dispatch(&mut core, listener_token, OpCode::Listen, listen_payload, Vec::new(), Signals::empty());
    assert!(matches!(&outcome, HandlerOutcome::Ok), "listen failed: {outcome:?}");

    const N: usize = 5;
    let clients: Vec<TcpStream> = (0..N)
        .map(|_| TcpStream::connect(("127.0.0.1", port)).expect("client connect"))
        .collect();

    let mut child_tokens = Vec::new();
    for _ in 0..N {
        loop {
            let listener_sockfd = core.ios[listener_token].sockfd;
            let outcome = dispatch(&mut core, listener_token, OpCode::Open, nul_terminated("accept"), Vec::new(), Signals::empty());
            match outcome {
                HandlerOutcome::OkWithReply(reply) => {
                    for fd in &reply.handles {
                        // Close the client-facing ends; this test only
                        // verifies bookkeeping, not data transfer.
                        unsafe { libc::close(*fd) };
                    }
                    child_tokens.push(core.ios.len() - 1);
                    break;
                }
                HandlerOutcome::Status(sockproxy_core::error::Status::ShouldWait) => {
                    common::wait_readable(listener_sockfd, 200);
                    continue;
                }
                other => panic!("unexpected accept outcome: {other:?}"),
            }
        }
    }

    assert_eq!(child_tokens.len(), N);
    // Listener + N accepted children, each a distinct slab slot.
    assert_eq!(core.ios.len(), N + 1);
    let distinct: std::collections::HashSet<_> = child_tokens.iter().collect();
    assert_eq!(distinct.len(), N, "each accept must produce its own IOState");

    drop(clients);
    for &token in &child_tokens {
        let outcome = dispatch(&mut core, token, OpCode::Close, Vec::new(), Vec::new(), Signals::empty());
        assert!(matches!(outcome, HandlerOutcome::Ok));
    }
    let outcome = dispatch(&mut core, listener_token, OpCode::Close, Vec::new(), Vec::new(), Signals::empty());
    assert!(matches!(outcome, HandlerOutcome::Ok));

    assert_eq!(core.ios.len(), 0, "every accepted connection and the listener must be released");
}
