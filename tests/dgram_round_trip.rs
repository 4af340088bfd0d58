//! R2 (spec.md §8): `OPEN` a `DGRAM` socket, `BIND` it, send one datagram to
//! itself, then read it back through the client-facing channel — end to end
//! through the operation router, with no real client process or dispatcher
//! thread involved.

mod common;

use sockproxy_core::kernel::{Channel, Signals};
use sockproxy_core::rio::OpCode;
use sockproxy_core::router::{dispatch, HandlerOutcome};

#[test]
fn self_send_round_trips_with_address() {
    let mut core = common::test_core();

    // OPEN socket/2/2/0 (AF_INET, SOCK_DGRAM, protocol 0).
    let open_payload = b"socket/2/2/0\0".to_vec();
    let outcome = dispatch(&mut core, 0, OpCode::Open, open_payload, Vec::new(), Signals::empty());
    let handles = match outcome {
        HandlerOutcome::OkWithReply(reply) => reply.handles,
        other => panic!("unexpected OPEN outcome: {other:?}"),
    };
    let token = 0usize;
    assert_eq!(handles.len(), 2, "DGRAM OPEN ships the RIO handle plus the data channel");
    unsafe { libc::close(handles[0]) }; // client never needs its own rio_endpoint fd here
    let client_channel = unsafe { Channel::from_raw_fd(handles[1]) };

    // BIND to 127.0.0.1:0 (ephemeral port).
    let bind_payload = common::encode_addr(std::net::Ipv4Addr::new(127, 0, 0, 1), 0);
    let outcome = dispatch(&mut core, token, OpCode::Bind, bind_payload, Vec::new(), Signals::empty());
    assert!(matches!(&outcome, HandlerOutcome::Ok), "bind failed: {outcome:?}");

    // GETSOCKNAME to learn the assigned port.
    let outcome = dispatch(&mut core, token, OpCode::GetSockName, Vec::new(), Vec::new(), Signals::empty());
    let (bound_addr, bound_port) = match outcome {
        HandlerOutcome::OkWithReply(reply) => common::decode_addr_reply(&reply.data),
        other => panic!("unexpected GETSOCKNAME outcome: {other:?}"),
    };

    // Client pushes a WRITE envelope targeting its own bound address.
    let payload = b"ping";
    let envelope = common::encode_dgram_envelope(Some((bound_addr, bound_port)), payload);
    client_channel.send(&envelope, &[]).expect("client send to server data channel");

    let outcome = dispatch(&mut core, token, OpCode::Write, Vec::new(), Vec::new(), Signals::empty());
    assert!(matches!(&outcome, HandlerOutcome::Ok), "write-dgram failed: {outcome:?}");

    // Pull the self-addressed datagram back out, retrying on PendingNet the
    // way the net multiplexer's readiness would in the real server.
    let mut reply_msg = None;
    for _ in 0..50 {
        let outcome = dispatch(&mut core, token, OpCode::Read, Vec::new(), Vec::new(), Signals::empty());
        match outcome {
            HandlerOutcome::Ok => {}
            HandlerOutcome::PendingNet => {
                let sockfd = core.ios[token].sockfd;
                common::wait_readable(sockfd, 200);
                continue;
            }
            other => panic!("unexpected READ outcome: {other:?}"),
        }
        match client_channel.recv() {
            Ok((msg, _handles)) => {
                reply_msg = Some(msg);
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => panic!("client recv failed: {e}"),
        }
    }

    let msg = reply_msg.expect("datagram never arrived on the client channel");
    let (from, body) = common::decode_dgram_envelope(&msg);
    assert_eq!(body, payload);
    assert_eq!(from, Some((bound_addr, bound_port)));
}
