//! The cross-thread work item the net multiplexer and handle watcher post
//! to the runner (spec.md §5 ADD).

use crate::kernel::Signals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource {
    Net,
    Client,
}

#[derive(Debug)]
pub struct RunnerJob {
    pub token: usize,
    pub source: JobSource,
    pub observed: Signals,
}
