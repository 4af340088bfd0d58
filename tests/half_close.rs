//! Scenario 4 (spec.md §8): `IO_HALFCLOSE` calls `shutdown(SHUT_WR)` on the
//! backing socket; the peer must observe EOF on its read side even though
//! the connection itself stays open.

mod common;

use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc;

use sockproxy_core::error::Status;
use sockproxy_core::kernel::Signals;
use sockproxy_core::rio::OpCode;
use sockproxy_core::router::{dispatch, HandlerOutcome};

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

#[test]
fn halfclose_shuts_down_the_write_side_and_peer_observes_eof() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 64];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(());
                        break;
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
    });

    let mut core = common::test_core();
    let outcome = dispatch(&mut core, 0, OpCode::Open, nul_terminated("socket/2/1/0"), Vec::new(), Signals::empty());
    match outcome {
        HandlerOutcome::OkWithReply(reply) => {
            for fd in reply.handles {
                unsafe { libc::close(fd) };
            }
        }
        other => panic!("unexpected OPEN outcome: {other:?}"),
    }
    let token = 0usize;

    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        _ => panic!("listener bound to a non-v4 address"),
    };
    let connect_payload = common::encode_addr(ip, addr.port());
    let outcome = dispatch(&mut core, token, OpCode::Connect, connect_payload, Vec::new(), Signals::empty());
    match outcome {
        HandlerOutcome::Ok => {}
        HandlerOutcome::Status(Status::ShouldWait) => {
            let sockfd = core.ios[token].sockfd;
            common::wait_writable(sockfd, 2000);
            let outcome = dispatch(&mut core, token, OpCode::SigConnW, Vec::new(), Vec::new(), Signals::WRITABLE);
            assert!(matches!(outcome, HandlerOutcome::Ok), "connect never completed");
        }
        other => panic!("unexpected CONNECT outcome: {other:?}"),
    }

    let outcome = dispatch(&mut core, token, OpCode::HalfClose, Vec::new(), Vec::new(), Signals::empty());
    assert!(matches!(outcome, HandlerOutcome::Ok));

    rx.recv_timeout(std::time::Duration::from_secs(2))
        .expect("peer never observed EOF after HALFCLOSE");
}
