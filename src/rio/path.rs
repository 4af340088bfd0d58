//! OPEN path grammar: `none` | `socket/<d>/<t>/<p>` | `accept` (spec.md §4.4,
//! §6, §9). Design notes call the C `strtol`-based segmentation fragile and
//! ask for "a two-pass split on `/` with strict decimal parsing and an
//! end-of-string check"; that is what this parses.

use crate::error::SockError;

pub const OPEN_PATH_MIN_LEN: usize = 1;
pub const OPEN_PATH_MAX_LEN: usize = 1024;

/// The decoded first segment of an `OPEN` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget {
    None,
    Socket { domain: i32, kind: i32, protocol: i32 },
    Accept,
}

/// Parses a NUL-terminated `OPEN` path (spec.md §4.4, R3).
///
/// `raw` is the payload bytes *including* the trailing NUL, matching the
/// wire format; length bounds (1..=1024, §8 boundaries) are checked against
/// the length excluding the terminator.
pub fn parse_open_path(raw: &[u8]) -> Result<OpenTarget, SockError> {
    let body = strip_nul_terminator(raw)?;

    if body.is_empty() || body.len() > OPEN_PATH_MAX_LEN {
        return Err(SockError::protocol("OPEN path length out of bounds"));
    }

    let text = std::str::from_utf8(body).map_err(|_| SockError::protocol("OPEN path not utf8"))?;

    let mut segments = text.split('/');
    let first = segments.next().unwrap_or("");

    match first {
        "none" if segments.next().is_none() => Ok(OpenTarget::None),
        "accept" if segments.next().is_none() => Ok(OpenTarget::Accept),
        "socket" => parse_socket_segments(segments),
        _ => Err(SockError::protocol("unknown OPEN path target")),
    }
}

fn strip_nul_terminator(raw: &[u8]) -> Result<&[u8], SockError> {
    match raw.split_last() {
        Some((0, body)) => Ok(body),
        _ => Err(SockError::protocol("OPEN path missing NUL terminator")),
    }
}

fn parse_socket_segments<'a>(
    mut segments: impl Iterator<Item = &'a str>,
) -> Result<OpenTarget, SockError> {
    let domain = parse_decimal(segments.next())?;
    let kind = parse_decimal(segments.next())?;
    let protocol = parse_decimal(segments.next())?;

    // Trailing garbage (a fourth segment) rejects, per spec.md §4.4.
    if segments.next().is_some() {
        return Err(SockError::protocol("trailing segment after socket/<d>/<t>/<p>"));
    }

    Ok(OpenTarget::Socket { domain, kind, protocol })
}

/// Strict decimal parse: no sign, no whitespace, no empty segment, no
/// trailing garbage within the segment itself.
fn parse_decimal(segment: Option<&str>) -> Result<i32, SockError> {
    let segment = segment.ok_or_else(|| SockError::protocol("missing socket/<d>/<t>/<p> segment"))?;

    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SockError::protocol("non-decimal segment in socket path"));
    }

    segment.parse::<i32>().map_err(|_| SockError::protocol("socket path segment overflow"))
}
