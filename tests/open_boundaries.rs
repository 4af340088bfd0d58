//! `OPEN` dispatched through the operation router end to end (spec.md §4.3,
//! §4.4, §8 boundary tests), as opposed to `rio::path`'s own unit tests that
//! only exercise `parse_open_path` directly.

mod common;

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
fn empty_path_is_invalid_args() {
    let mut core = common::test_core();
    let outcome = dispatch(&mut core, 0, OpCode::Open, Vec::new(), Vec::new(), Signals::empty());
    assert!(matches!(outcome, HandlerOutcome::Status(Status::InvalidArgs)));
}

#[test]
fn oversize_path_is_invalid_args() {
    let mut core = common::test_core();
    let long = "a".repeat(1025);
    let payload = nul_terminated(&long);
    let outcome = dispatch(&mut core, 0, OpCode::Open, payload, Vec::new(), Signals::empty());
    assert!(matches!(outcome, HandlerOutcome::Status(Status::InvalidArgs)));
    assert_eq!(core.ios.len(), 0, "a rejected OPEN must not leave an IOState behind");
}

#[test]
fn none_target_opens_a_handle_less_ios() {
    let mut core = common::test_core();
    let outcome = dispatch(&mut core, 0, OpCode::Open, nul_terminated("none"), Vec::new(), Signals::empty());
    match outcome {
        HandlerOutcome::OkWithReply(reply) => {
            assert_eq!(reply.status, Status::Ok);
            assert_eq!(reply.handles.len(), 1, "HandleType::None ships only the RIO handle");
            for fd in reply.handles {
                unsafe { libc::close(fd) };
            }
        }
        _ => panic!("expected OkWithReply"),
    }
    assert_eq!(core.ios.len(), 1);
}

#[test]
fn accept_against_unknown_parent_is_bad_handle() {
    let mut core = common::test_core();
    let outcome = dispatch(&mut core, 999, OpCode::Open, nul_terminated("accept"), Vec::new(), Signals::empty());
    assert!(matches!(outcome, HandlerOutcome::Status(Status::BadHandle)));
}

#[test]
fn unknown_target_is_invalid_args() {
    let mut core = common::test_core();
    let outcome = dispatch(&mut core, 0, OpCode::Open, nul_terminated("bogus"), Vec::new(), Signals::empty());
    assert!(matches!(outcome, HandlerOutcome::Status(Status::InvalidArgs)));
}
