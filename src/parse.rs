//! The request head parser.
//!
//! A byte-level tokenizer over the states: `method`, `sp1`,
//! `request-target`, `sp2`, `http-name`, `major`, `dot`, `minor`,
//! `line-end`, `header-name`, `header-colon`, `header-ows`,
//! `header-value`, `header-line-end`, `headers-end`.
//!
//! Hand-rolled rather than built on `httparse`, since the latter does
//! not distinguish the specific error kinds this crate reports (see
//! `DESIGN.md`).

use http::{Method, Version};

use crate::error::{Error, Parse};
use crate::headers::HeaderMap;
use crate::request::RequestHead;

const SP: u8 = b' ';
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const COLON: u8 = b':';
const HTAB: u8 = b'\t';

fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*'
        | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

fn is_vchar_or_obs_text(b: u8) -> bool {
    b >= 0x21 || b >= 0x80
}

#[derive(Debug)]
enum State {
    Method,
    Sp1,
    RequestTarget,
    Sp2,
    HttpName(u8),
    Major,
    Dot,
    Minor,
    LineEnd,
    HeaderNameStart,
    HeaderName,
    HeaderColon,
    HeaderOws,
    HeaderValue,
    HeaderLineEnd,
    HeadersEnd,
}

/// The outcome of attempting to parse a request head from a buffer that
/// may not yet contain the full head.
pub enum ParseOutcome {
    /// The buffer does not yet contain a full head; call again once more
    /// bytes have arrived.
    Incomplete,
    /// A full head was parsed, consuming `consumed` bytes of `buf`.
    Complete(RequestHead, usize),
}

/// Attempts to parse a request head from the front of `buf`.
///
/// Returns [`ParseOutcome::Incomplete`] if `buf` does not yet hold a
/// complete head and has not exceeded `max_head_size`; an `Err` once the
/// head is malformed or has exceeded `max_head_size`.
pub fn parse_request_head(buf: &[u8], max_head_size: usize) -> Result<ParseOutcome, Error> {
    if buf.len() > max_head_size {
        // Even if `buf` does contain a full head, a head this large is
        // rejected outright.
        if !contains_headers_end(&buf[..max_head_size.min(buf.len())]) {
            return Err(Error::new_parse(Parse::HeadTooLarge));
        }
    }

    let mut state = State::Method;
    let mut pos = 0usize;

    let mut method_start = 0usize;
    let mut target_start = 0usize;
    let mut target_end = 0usize;
    let mut major: u32 = 0;
    let mut minor: u32 = 0;
    let mut minor_present = false;

    let mut headers = HeaderMap::new();
    let mut header_name_start = 0usize;
    let mut header_name_end = 0usize;
    let mut header_value_start = 0usize;

    const HTTP_LITERAL: &[u8] = b"HTTP/";

    while pos < buf.len() {
        let b = buf[pos];
        match state {
            State::Method => {
                if b == SP {
                    if pos == method_start {
                        return Err(Error::new_parse(Parse::Method));
                    }
                    state = State::Sp1;
                } else if is_tchar(b) {
                    // stay in Method
                } else {
                    return Err(Error::new_parse(Parse::Method));
                }
                pos += 1;
            }
            State::Sp1 => {
                target_start = pos;
                state = State::RequestTarget;
                // do not advance; re-dispatch this byte as request-target
            }
            State::RequestTarget => {
                if b == SP {
                    target_end = pos;
                    if target_end == target_start {
                        return Err(Error::new_parse(Parse::NoSlash));
                    }
                    state = State::Sp2;
                }
                pos += 1;
            }
            State::Sp2 => {
                state = State::HttpName(0);
            }
            State::HttpName(i) => {
                if i as usize >= HTTP_LITERAL.len() {
                    state = State::Major;
                    // re-dispatch current byte as the first major digit
                } else {
                    if b != HTTP_LITERAL[i as usize] {
                        return Err(Error::new_parse(Parse::NotHttpName));
                    }
                    state = State::HttpName(i + 1);
                    pos += 1;
                }
            }
            State::Major => {
                if b.is_ascii_digit() {
                    major = major
                        .checked_mul(10)
                        .and_then(|m| m.checked_add((b - b'0') as u32))
                        .ok_or_else(|| Error::new_parse(Parse::BadMajor))?;
                    pos += 1;
                } else if b == b'.' {
                    if pos == 0 {
                        return Err(Error::new_parse(Parse::BadMajor));
                    }
                    state = State::Dot;
                    pos += 1;
                } else if b == CR {
                    state = State::LineEnd;
                    pos += 1;
                } else {
                    return Err(Error::new_parse(Parse::BadMajor));
                }
            }
            State::Dot => {
                minor_present = true;
                state = State::Minor;
                // re-dispatch this byte as the first minor digit
            }
            State::Minor => {
                if b.is_ascii_digit() {
                    minor = minor
                        .checked_mul(10)
                        .and_then(|m| m.checked_add((b - b'0') as u32))
                        .ok_or_else(|| Error::new_parse(Parse::BadMinor))?;
                    pos += 1;
                } else if b == CR {
                    state = State::LineEnd;
                    pos += 1;
                } else {
                    return Err(Error::new_parse(Parse::BadMinor));
                }
            }
            State::LineEnd => {
                if b != LF {
                    return Err(Error::new_parse(Parse::NotHttpName));
                }
                pos += 1;
                state = State::HeaderNameStart;
                header_name_start = pos;
            }
            State::HeaderNameStart => {
                if b == CR {
                    state = State::HeadersEnd;
                    pos += 1;
                } else if is_tchar(b) {
                    state = State::HeaderName;
                    pos += 1;
                } else {
                    return Err(Error::new_parse(Parse::HeaderNameEmpty));
                }
            }
            State::HeaderName => {
                if b == COLON {
                    header_name_end = pos;
                    if header_name_end == header_name_start {
                        return Err(Error::new_parse(Parse::HeaderNameEmpty));
                    }
                    state = State::HeaderColon;
                    pos += 1;
                    // falls through to HeaderColon on the next iteration
                } else if is_tchar(b) {
                    pos += 1;
                } else {
                    return Err(Error::new_parse(Parse::HeaderNameEmpty));
                }
            }
            State::HeaderColon => {
                state = State::HeaderOws;
                // do not advance; re-dispatch as ows
            }
            State::HeaderOws => {
                if b == SP || b == HTAB {
                    pos += 1;
                } else {
                    header_value_start = pos;
                    state = State::HeaderValue;
                }
            }
            State::HeaderValue => {
                if b == CR {
                    let name = std::str::from_utf8(&buf[header_name_start..header_name_end])
                        .map_err(|_| Error::new_parse(Parse::HeaderNameEmpty))?
                        .to_owned();
                    let raw_value = &buf[header_value_start..pos];
                    let value = String::from_utf8_lossy(raw_value)
                        .trim_end_matches(|c: char| c == ' ' || c == '\t')
                        .to_owned();
                    headers.append(name, value);
                    state = State::HeaderLineEnd;
                    pos += 1;
                } else if is_vchar_or_obs_text(b) || b == SP || b == HTAB {
                    pos += 1;
                } else {
                    return Err(Error::new_parse(Parse::HeaderNameEmpty));
                }
            }
            State::HeaderLineEnd => {
                if b != LF {
                    return Err(Error::new_parse(Parse::HeaderNameEmpty));
                }
                pos += 1;
                header_name_start = pos;
                state = State::HeaderNameStart;
            }
            State::HeadersEnd => {
                if b != LF {
                    return Err(Error::new_parse(Parse::HeaderNameEmpty));
                }
                pos += 1;
                let version = resolve_version(major, minor, minor_present)?;
                let method = Method::from_bytes(&buf[method_start..target_start - 1])
                    .map_err(|_| Error::new_parse(Parse::Method))?;
                let raw_target =
                    String::from_utf8_lossy(&buf[target_start..target_end]).into_owned();
                return Ok(ParseOutcome::Complete(
                    RequestHead {
                        method,
                        raw_target,
                        version,
                        headers,
                    },
                    pos,
                ));
            }
        }
    }

    Ok(ParseOutcome::Incomplete)
}

fn resolve_version(major: u32, minor: u32, minor_present: bool) -> Result<Version, Error> {
    match (major, minor_present, minor) {
        (0, true, 9) => Ok(Version::HTTP_09),
        (0, true, _) => Err(Error::new_parse(Parse::MajorUnsupported)),
        (0, false, _) => Err(Error::new_parse(Parse::MinorRequired)),
        (1, true, 0) => Ok(Version::HTTP_10),
        (1, true, 1) => Ok(Version::HTTP_11),
        (1, true, _) => Err(Error::new_parse(Parse::MajorUnsupported)),
        (1, false, _) => Err(Error::new_parse(Parse::MinorRequired)),
        (2, false, _) => Ok(Version::HTTP_2),
        (2, true, _) => Err(Error::new_parse(Parse::MinorUnexpected)),
        (3, false, _) => Ok(Version::HTTP_3),
        (3, true, _) => Err(Error::new_parse(Parse::MinorUnexpected)),
        _ => Err(Error::new_parse(Parse::MajorUnsupported)),
    }
}

fn contains_headers_end(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}
