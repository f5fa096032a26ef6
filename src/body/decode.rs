//! The chunked-transfer-encoding decode state machine.
//!
//! Expressed as a synchronous decode-over-buffer function rather than a
//! `Future::poll` state machine: the state progression (`Size` ->
//! `SizeLws`/`Extension` -> `SizeLf` -> `Body` -> `BodyCr` -> `BodyLf`
//! -> ... -> `Trailer` -> `EndCr` -> `EndLf` -> `End`) mirrors RFC 7230's
//! chunked-body grammar directly; hand-rolling a new `Poll` state
//! machine without a compiler to check it is too risky for this
//! exercise (see `DESIGN.md`).

use bytes::{Buf, Bytes, BytesMut};

/// Chunk-extension / trailer size caps, generous enough for real
/// traffic while bounding how much of either a malicious peer can force
/// this decoder to buffer.
const CHUNK_EXTENSIONS_LIMIT: u64 = 1024 * 16;
const TRAILER_LIMIT: usize = 1024 * 16;

#[derive(Debug, Clone, Copy)]
enum State {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

pub enum DecodeResult {
    /// A body chunk is available.
    Chunk(Bytes),
    /// The terminating `0\r\n\r\n` (plus any trailers) has been consumed.
    End,
    /// `buf` does not yet contain enough bytes to make progress.
    NeedMore,
    /// The chunked framing itself is malformed.
    Invalid,
}

pub struct ChunkedDecoder {
    state: State,
    size: u64,
    remaining: u64,
    extension_count: u64,
    trailer_count: usize,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            state: State::Size,
            size: 0,
            remaining: 0,
            extension_count: 0,
            trailer_count: 0,
        }
    }

    /// Attempts to decode one unit of progress from `buf`, consuming the
    /// bytes it uses. Call repeatedly (after feeding more bytes into
    /// `buf` on [`DecodeResult::NeedMore`]) until [`DecodeResult::End`].
    pub fn decode(&mut self, buf: &mut BytesMut) -> DecodeResult {
        loop {
            match self.state {
                State::Size => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    match hex_value(buf[0]) {
                        Some(v) => {
                            buf.advance(1);
                            self.size = match self.size.checked_mul(16).and_then(|s| s.checked_add(v as u64)) {
                                Some(s) => s,
                                None => return DecodeResult::Invalid,
                            };
                        }
                        None => self.state = State::SizeLws,
                    }
                }
                State::SizeLws => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    match buf[0] {
                        b' ' | b'\t' => buf.advance(1),
                        b';' => {
                            buf.advance(1);
                            self.state = State::Extension;
                        }
                        b'\r' => self.state = State::SizeLf,
                        _ => return DecodeResult::Invalid,
                    }
                }
                State::Extension => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] == b'\r' {
                        self.state = State::SizeLf;
                    } else {
                        self.extension_count += 1;
                        if self.extension_count > CHUNK_EXTENSIONS_LIMIT {
                            return DecodeResult::Invalid;
                        }
                        buf.advance(1);
                    }
                }
                State::SizeLf => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] != b'\n' {
                        return DecodeResult::Invalid;
                    }
                    buf.advance(1);
                    if self.size == 0 {
                        self.state = State::Trailer;
                    } else {
                        self.remaining = self.size;
                        self.size = 0;
                        self.state = State::Body;
                    }
                }
                State::Body => {
                    if self.remaining == 0 {
                        self.state = State::BodyCr;
                        continue;
                    }
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    let take = (self.remaining as usize).min(buf.len());
                    let chunk = buf.split_to(take).freeze();
                    self.remaining -= take as u64;
                    return DecodeResult::Chunk(chunk);
                }
                State::BodyCr => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] != b'\r' {
                        return DecodeResult::Invalid;
                    }
                    buf.advance(1);
                    self.state = State::BodyLf;
                }
                State::BodyLf => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] != b'\n' {
                        return DecodeResult::Invalid;
                    }
                    buf.advance(1);
                    self.state = State::Size;
                }
                State::Trailer => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] == b'\r' {
                        self.state = State::TrailerLf;
                    } else {
                        self.trailer_count += 1;
                        if self.trailer_count > TRAILER_LIMIT {
                            return DecodeResult::Invalid;
                        }
                        buf.advance(1);
                    }
                }
                State::TrailerLf => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] != b'\n' {
                        return DecodeResult::Invalid;
                    }
                    buf.advance(1);
                    self.state = State::EndCr;
                }
                State::EndCr => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] == b'\r' {
                        buf.advance(1);
                        self.state = State::EndLf;
                    } else {
                        self.state = State::Trailer;
                    }
                }
                State::EndLf => {
                    if buf.is_empty() {
                        return DecodeResult::NeedMore;
                    }
                    if buf[0] != b'\n' {
                        return DecodeResult::Invalid;
                    }
                    buf.advance(1);
                    self.state = State::End;
                }
                State::End => return DecodeResult::End,
            }
        }
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[test]
    fn decodes_single_chunk_then_end() {
        let mut d = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"5\r\nhello\r\n0\r\n\r\n"[..]);

        let chunk = match d.decode(&mut buf) {
            DecodeResult::Chunk(b) => b,
            _ => panic!("expected chunk"),
        };
        assert_eq!(&chunk[..], b"hello");

        match d.decode(&mut buf) {
            DecodeResult::End => {}
            _ => panic!("expected end"),
        }
    }

    #[test]
    fn needs_more_on_partial_size_line() {
        let mut d = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"5\r\nhel"[..]);
        match d.decode(&mut buf) {
            DecodeResult::Chunk(b) => assert_eq!(&b[..], b"hel"),
            _ => panic!("expected partial chunk"),
        }
        match d.decode(&mut buf) {
            DecodeResult::NeedMore => {}
            _ => panic!("expected need more"),
        }
    }

    #[test]
    fn rejects_bad_size_terminator() {
        let mut d = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"5Xhello\r\n"[..]);
        assert_matches!(d.decode(&mut buf), DecodeResult::Invalid);
    }

    #[test]
    fn skips_chunk_extensions() {
        let mut d = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"5;foo=bar\r\nhello\r\n0\r\n\r\n"[..]);
        match d.decode(&mut buf) {
            DecodeResult::Chunk(b) => assert_eq!(&b[..], b"hello"),
            _ => panic!("expected chunk"),
        }
    }
}
