//! `sockproxy-core`: the per-connection I/O state machine and two-sided
//! readiness multiplexer behind a user-space socket-proxy server.
//!
//! A client process never touches the host kernel's network stack
//! directly. It opens a [`kernel::Channel`] to the server's root listener,
//! issues `OPEN` to name a socket, and gets back a pair of endpoints: a RIO
//! control channel ([`rio`]) and a data endpoint ([`io_state::DataEndpoint`]).
//! Everything from there on is this crate's job: scheduling reads and
//! writes against a non-blocking socket owned by [`net_backend::NetBackend`],
//! suspending on the right readiness source, and resuming when it fires.
//!
//! [`core::Core`] is the process-wide aggregate (IOState table, wait
//! queues, buffer pool, backend) that [`router::dispatch`] and the
//! [`handlers`] operate on. [`dispatcher`] drives the RIO control channels
//! and the runner's job queue; [`net_mux`] and [`handle_watcher`] are the
//! two readiness threads that feed it.

pub mod buffer_pool;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod error;
pub mod handle_watcher;
pub mod handlers;
pub mod io_state;
pub mod kernel;
pub mod net_backend;
pub mod net_mux;
pub mod queues;
pub mod rio;
pub mod router;
pub mod runner_job;

pub use config::Config;
pub use core::Core;
pub use error::{SockError, SockResult, Status};
