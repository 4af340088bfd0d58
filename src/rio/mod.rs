//! RIO wire protocol: op-codes, fixed header, and the reply envelope
//! (spec.md §6).

mod path;

pub use path::{parse_open_path, OpenTarget};

use std::os::unix::io::RawFd;

use crate::error::Status;

/// Payload chunks are capped; larger transfers go over the data endpoint.
pub const MXIO_CHUNK_SIZE: usize = 8192;
/// At most two handles travel with a single RIO message (spec.md §6).
pub const MXIO_MAX_HANDLES: usize = 2;

/// Sentinel `MXIO_PROTOCOL_SOCKET` returned with a successful `OPEN` reply.
pub const MXIO_PROTOCOL_SOCKET: u32 = 1;

/// RIO op-codes, including the three internal-only pseudo-ops (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OpCode {
    Open = 1,
    Close = 2,
    Connect = 3,
    Bind = 4,
    Listen = 5,
    Ioctl = 6,
    GetAddrInfo = 7,
    GetSockName = 8,
    GetPeerName = 9,
    GetSockOpt = 10,
    SetSockOpt = 11,
    Write = 12,
    Read = 13,
    Status = 14,
    // Internal-only pseudo-ops; never sent over the wire by a well-behaved
    // client, but flow through the same operation router (spec.md §4.3).
    HalfClose = 100,
    SigConnR = 101,
    SigConnW = 102,
}

impl OpCode {
    fn from_u32(v: u32) -> Option<OpCode> {
        Some(match v {
            1 => OpCode::Open,
            2 => OpCode::Close,
            3 => OpCode::Connect,
            4 => OpCode::Bind,
            5 => OpCode::Listen,
            6 => OpCode::Ioctl,
            7 => OpCode::GetAddrInfo,
            8 => OpCode::GetSockName,
            9 => OpCode::GetPeerName,
            10 => OpCode::GetSockOpt,
            11 => OpCode::SetSockOpt,
            12 => OpCode::Write,
            13 => OpCode::Read,
            14 => OpCode::Status,
            100 => OpCode::HalfClose,
            101 => OpCode::SigConnR,
            102 => OpCode::SigConnW,
            _ => return None,
        })
    }
}

/// A decoded RIO message header plus payload, as read off a control channel.
#[derive(Debug, Clone)]
pub struct RioMessage {
    pub op: OpCode,
    pub payload: Vec<u8>,
    pub handles: Vec<RawFd>,
}

impl RioMessage {
    /// Wire header: `op: u32` little-endian, followed by the payload
    /// (capped at `MXIO_CHUNK_SIZE` by the transport, not re-checked here).
    /// Takes `handles` by value only on success, so a malformed header
    /// leaves the caller holding (and responsible for closing) them.
    pub fn decode(raw: &[u8], handles: Vec<RawFd>) -> Result<RioMessage, Vec<RawFd>> {
        let op = match raw.len() >= 4 {
            true => OpCode::from_u32(u32::from_le_bytes(raw[0..4].try_into().unwrap())),
            false => None,
        };
        match op {
            Some(op) => Ok(RioMessage { op, payload: raw[4..].to_vec(), handles }),
            None => Err(handles),
        }
    }
}

/// The reply envelope for externally-visible ops (spec.md §4.3): `{status,
/// arg}` followed by up to two handles, plus an op-specific data payload
/// (e.g. `GETSOCKNAME`'s address, `IOCTL`'s fixed-layout reply struct). For
/// plain `STATUS` replies `arg` is unused (`0`) and `data` is empty; for
/// `OPEN` replies `arg` is `MXIO_PROTOCOL_SOCKET`.
#[derive(Debug, Clone)]
pub struct RioReply {
    pub status: Status,
    pub arg: u32,
    pub data: Vec<u8>,
    pub handles: Vec<RawFd>,
}

impl RioReply {
    pub fn status_only(status: Status) -> RioReply {
        RioReply { status, arg: 0, data: Vec::new(), handles: Vec::new() }
    }

    pub fn opened(status: Status, handles: Vec<RawFd>) -> RioReply {
        RioReply { status, arg: MXIO_PROTOCOL_SOCKET, data: Vec::new(), handles }
    }

    pub fn with_data(status: Status, data: Vec<u8>) -> RioReply {
        RioReply { status, arg: 0, data, handles: Vec::new() }
    }

    /// Wire layout: `status: i32` little-endian, `arg: u32` little-endian,
    /// then `data` verbatim. Handles travel out-of-band via `Channel::send`'s
    /// ancillary data, not in this byte buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.data.len());
        out.extend_from_slice(&(self.status as i32).to_le_bytes());
        out.extend_from_slice(&self.arg.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Whether an op-code ever produces a `RioReply` on the wire. The internal
/// pseudo-ops (`READ`, `WRITE`, `CLOSE`, `HALFCLOSE`, `SIGCONN_R`,
/// `SIGCONN_W`) do not (spec.md §4.3).
pub fn emits_reply(op: OpCode) -> bool {
    !matches!(
        op,
        OpCode::Read
            | OpCode::Write
            | OpCode::Close
            | OpCode::HalfClose
            | OpCode::SigConnR
            | OpCode::SigConnW
    )
}
