//! Concrete realizations of the "kernel primitives" spec.md §6 treats as
//! opaque: bidirectional message channels with handle-passing, bidirectional
//! byte pipes with readiness signals, per-object user signals, and the
//! wait-set/interrupter pair (the latter two are `mio::Poll`/`mio::Waker`
//! directly, used throughout `net_mux`, `handle_watcher`, and `core`).

mod channel;
mod pipe;
mod signals;

pub use channel::Channel;
pub use pipe::{Pipe, PipeReadiness};
pub use signals::Signals;
