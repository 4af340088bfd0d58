use bitflags::bitflags;

bitflags! {
    /// The full signal space observable on a `data_endpoint` (spec.md §3,
    /// §4.8, §4.9, §6, §4.12): both the pipe/channel readiness bits
    /// (`READABLE`/`WRITABLE`/`PEER_CLOSED`/`HALFCLOSED`) and the
    /// server-settable user signals (`CONNECTED`/`INCOMING`/`OUTGOING`)
    /// share one bitset because both are edited through the same
    /// `socket_signals_set`/`socket_signals_clear` pair and observed through
    /// the same wait-set entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Signals: u32 {
        const READABLE    = 0b0000_0001;
        const WRITABLE     = 0b0000_0010;
        const PEER_CLOSED  = 0b0000_0100;
        const HALFCLOSED   = 0b0000_1000;
        const CONNECTED    = 0b0001_0000;
        const INCOMING     = 0b0010_0000;
        const OUTGOING     = 0b0100_0000;
    }
}

impl Default for Signals {
    fn default() -> Signals {
        Signals::empty()
    }
}

impl Signals {
    /// Maps the readiness-shaped subset of `Signals` to an `mio::Interest`
    /// for arming a wait-set entry; `None` if neither bit is set.
    pub fn to_interest(self) -> Option<mio::Interest> {
        let r = self.contains(Signals::READABLE);
        let w = self.contains(Signals::WRITABLE);
        match (r, w) {
            (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
            (true, false) => Some(mio::Interest::READABLE),
            (false, true) => Some(mio::Interest::WRITABLE),
            (false, false) => None,
        }
    }
}
