//! R1 (spec.md §8): `OPEN` a `STREAM` socket, `CONNECT` it to a local echo
//! listener, write through the client-facing pipe, and read the echoed
//! bytes back — end to end through the operation router, with the net
//! multiplexer's readiness polling done by hand instead of a real thread.

mod common;

use std::io::{Read, Write};
use std::net::TcpListener;

use sockproxy_core::error::Status;
use sockproxy_core::kernel::{Pipe, Signals};
use sockproxy_core::rio::OpCode;
use sockproxy_core::router::{dispatch, HandlerOutcome};

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

fn spawn_echo_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    addr
}

#[test]
fn connect_write_read_round_trips_through_an_echo_server() {
    let echo_addr = spawn_echo_server();
    let mut core = common::test_core();

    let outcome = dispatch(&mut core, 0, OpCode::Open, nul_terminated("socket/2/1/0"), Vec::new(), Signals::empty());
    let handles = match outcome {
        HandlerOutcome::OkWithReply(reply) => reply.handles,
        other => panic!("unexpected OPEN outcome: {other:?}"),
    };
    let token = 0usize;
    assert_eq!(handles.len(), 2, "STREAM OPEN ships the RIO handle plus the data pipe");
    unsafe { libc::close(handles[0]) };
    let mut client_pipe = unsafe { Pipe::from_raw_fd(handles[1]) };

    let ip = match echo_addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        _ => panic!("echo server bound to a non-v4 address"),
    };
    let connect_payload = common::encode_addr(ip, echo_addr.port());
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

    let payload = b"hello from the client pipe";
    let n = client_pipe.write(payload).expect("client write to its own pipe end");
    assert_eq!(n, payload.len());

    let mut write_drained = false;
    for _ in 0..100 {
        let outcome = dispatch(&mut core, token, OpCode::Write, Vec::new(), Vec::new(), Signals::empty());
        match outcome {
            HandlerOutcome::PendingNet => {
                let sockfd = core.ios[token].sockfd;
                common::wait_writable(sockfd, 200);
            }
            HandlerOutcome::PendingClient => {
                write_drained = true;
                break;
            }
            other => panic!("unexpected WRITE outcome: {other:?}"),
        }
    }
    assert!(write_drained, "write pipeline never fully drained the client's payload");

    let mut received = Vec::new();
    for _ in 0..200 {
        let outcome = dispatch(&mut core, token, OpCode::Read, Vec::new(), Vec::new(), Signals::empty());
        match outcome {
            HandlerOutcome::PendingNet => {
                let sockfd = core.ios[token].sockfd;
                common::wait_readable(sockfd, 200);
            }
            other => panic!("unexpected READ outcome: {other:?}"),
        }
        let mut buf = [0u8; 4096];
        match client_pipe.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                received.extend_from_slice(&buf[..n]);
                if received.len() >= payload.len() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => panic!("client pipe read failed: {e}"),
        }
    }

    assert_eq!(received, payload);
}
