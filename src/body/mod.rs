//! Body Reader: resolves which of the four framing modes applies
//! to an incoming request, and exposes the result as a lazy, restartable-
//! once, pull-based chunk source.
//!
//! Mode resolution follows `Transfer-Encoding`/`Content-Length`
//! precedence per RFC 7230; the chunked state machine lives in
//! [`decode`]. The sharing model favors a single
//! `Arc<tokio::sync::Mutex<ConnState>>` over an `mpsc`/`oneshot`
//! channel-based split, since the body reader and the orchestrator's
//! post-handler drain both just need serialized access to the same
//! connection buffer — see `DESIGN.md`.

pub mod decode;

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::Method;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, Notify};

use crate::error::{Error, Kind};
use crate::headers::HeaderMap;
use decode::{ChunkedDecoder, DecodeResult};

const READ_CHUNK: usize = 8 * 1024;

/// Which of the four body resolution outcomes applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyMode {
    /// HEAD/CONNECT, or a status class that forbids a body.
    Empty,
    /// `Content-Length: N`.
    Fixed(u64),
    /// `Transfer-Encoding`'s last token is `chunked`.
    Chunked,
}

/// Resolves the body mode for a request head. `forbids_body`
/// covers CONNECT and any other caller-known body-forbidding condition
/// beyond the method itself.
pub(crate) fn resolve_mode(
    method: &Method,
    forbids_body: bool,
    headers: &HeaderMap,
) -> Result<BodyMode, Error> {
    if forbids_body || *method == Method::HEAD {
        return Ok(BodyMode::Empty);
    }

    if let Some(te) = headers.get("transfer-encoding") {
        let last = te.split(',').map(|t| t.trim()).last().unwrap_or("");
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyMode::Chunked);
        }
        return Err(Error::new(Kind::BadHeader));
    }

    let lengths: Vec<&str> = headers.get_all("content-length").collect();
    if !lengths.is_empty() {
        if lengths.len() > 1 || lengths.iter().any(|v| *v != lengths[0]) {
            return Err(Error::new(Kind::BadHeader));
        }
        let n: u64 = lengths[0]
            .trim()
            .parse()
            .map_err(|_| Error::new(Kind::BadHeader))?;
        return Ok(BodyMode::Fixed(n));
    }

    Ok(BodyMode::Empty)
}

/// Read-progress for the body of the request currently in flight. Lives
/// on [`ConnState`] (not on [`Incoming`]) so the orchestrator can resume
/// draining leftover bytes even after the handler has dropped its
/// `Incoming` value.
struct BodyRead {
    mode: BodyMode,
    remaining: u64,
    chunked: ChunkedDecoder,
    exhausted: bool,
}

impl BodyRead {
    fn new(mode: BodyMode) -> Self {
        let remaining = match mode {
            BodyMode::Fixed(n) => n,
            _ => 0,
        };
        let exhausted = matches!(mode, BodyMode::Empty | BodyMode::Fixed(0));
        BodyRead {
            mode,
            remaining,
            chunked: ChunkedDecoder::new(),
            exhausted,
        }
    }
}

/// Connection-scoped read state: the buffered byte stream plus the
/// in-flight request's body-read progress, shared between the body
/// reader and the orchestrator's post-handler drain.
pub(crate) struct ConnState {
    io: Pin<Box<dyn AsyncRead + Send>>,
    buf: BytesMut,
    body: BodyRead,
}

impl ConnState {
    pub(crate) fn new(io: Pin<Box<dyn AsyncRead + Send>>, leftover: BytesMut) -> Self {
        ConnState {
            io,
            buf: leftover,
            body: BodyRead::new(BodyMode::Empty),
        }
    }

    pub(crate) async fn fill(&mut self) -> std::io::Result<usize> {
        let mut tmp = [0u8; READ_CHUNK];
        let n = self.io.as_mut().read(&mut tmp).await?;
        if n > 0 {
            self.buf.extend_from_slice(&tmp[..n]);
        }
        Ok(n)
    }

    /// Alias used by the head-reading loop, which waits for more bytes
    /// under the same contract as [`ConnState::fill`].
    pub(crate) async fn fill_more(&mut self) -> std::io::Result<usize> {
        self.fill().await
    }

    /// The bytes currently buffered but not yet consumed by either the
    /// head parser or a body reader.
    pub(crate) fn buf_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drops `n` bytes from the front of the buffer once a caller (the
    /// head parser) has consumed them.
    pub(crate) fn consume(&mut self, n: usize) {
        let _ = self.buf.split_to(n);
    }

    /// Resets body-read progress for the next request's mode. Called by
    /// the orchestrator once per request, before handing out an
    /// [`Incoming`] over this connection.
    pub(crate) fn begin_body(&mut self, mode: BodyMode) {
        self.body = BodyRead::new(mode);
    }

    fn body_exhausted(&self) -> bool {
        self.body.exhausted
    }

    /// Pulls one chunk of the in-flight request's body, reading more
    /// bytes off the socket as needed. Shared by [`Incoming::next_chunk`]
    /// and [`ConnState::drain_stale_body`].
    async fn next_body_chunk(&mut self) -> Option<Result<Bytes, Error>> {
        if self.body.exhausted {
            return None;
        }
        match self.body.mode {
            BodyMode::Empty => {
                self.body.exhausted = true;
                None
            }
            BodyMode::Fixed(_) => loop {
                if self.body.remaining == 0 {
                    self.body.exhausted = true;
                    return None;
                }
                if !self.buf.is_empty() {
                    let take = self.body.remaining.min(self.buf.len() as u64) as usize;
                    let chunk = self.buf.split_to(take);
                    self.body.remaining -= take as u64;
                    if self.body.remaining == 0 {
                        self.body.exhausted = true;
                    }
                    return Some(Ok(chunk.freeze()));
                }
                match self.fill().await {
                    Ok(0) => {
                        self.body.exhausted = true;
                        return Some(Err(Error::new_incomplete()));
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        self.body.exhausted = true;
                        return Some(Err(Error::new_io(e)));
                    }
                }
            },
            BodyMode::Chunked => loop {
                match self.body.chunked.decode(&mut self.buf) {
                    DecodeResult::Chunk(b) => return Some(Ok(b)),
                    DecodeResult::End => {
                        self.body.exhausted = true;
                        return None;
                    }
                    DecodeResult::Invalid => {
                        self.body.exhausted = true;
                        return Some(Err(Error::new(Kind::BadHeader)));
                    }
                    DecodeResult::NeedMore => match self.fill().await {
                        Ok(0) => {
                            self.body.exhausted = true;
                            return Some(Err(Error::new_incomplete()));
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            self.body.exhausted = true;
                            return Some(Err(Error::new_io(e)));
                        }
                    },
                }
            },
        }
    }

    /// Drains any bytes the handler left unread, so they are not
    /// mistaken for the next request's head.
    /// A no-op once the body is already exhausted.
    pub(crate) async fn drain_stale_body(&mut self) -> Result<(), Error> {
        while let Some(chunk) = self.next_body_chunk().await {
            chunk?;
        }
        Ok(())
    }
}

/// The request body: a lazy, pull-based chunk source that may be
/// consumed at most once per chunk.
pub struct Incoming {
    shared: Option<Arc<Mutex<ConnState>>>,
    mode: BodyMode,
    drained: Arc<AtomicBool>,
    expect_continue: Arc<AtomicBool>,
    continue_notify: Option<Arc<Notify>>,
}

impl Incoming {
    /// A body known, statically, to carry zero bytes — used for
    /// HEAD/CONNECT requests and in tests.
    pub fn empty() -> Self {
        Incoming {
            shared: None,
            mode: BodyMode::Empty,
            drained: Arc::new(AtomicBool::new(true)),
            expect_continue: Arc::new(AtomicBool::new(false)),
            continue_notify: None,
        }
    }

    /// Builds a body over `shared`, whose [`ConnState::begin_body`] has
    /// already been primed with `mode` by the caller (the orchestrator,
    /// which owns the one `ConnState` per connection).
    pub(crate) fn new(shared: Arc<Mutex<ConnState>>, mode: BodyMode) -> Self {
        let exhausted = matches!(mode, BodyMode::Empty | BodyMode::Fixed(0));
        Incoming {
            shared: Some(shared),
            mode,
            drained: Arc::new(AtomicBool::new(exhausted)),
            expect_continue: Arc::new(AtomicBool::new(false)),
            continue_notify: None,
        }
    }

    /// Arms the 100-Continue trigger: the first call to
    /// [`Incoming::next_chunk`] after this notifies `notify` exactly
    /// once; further body reads are silent no-ops on the trigger.
    pub(crate) fn arm_continue(&mut self, notify: Arc<Notify>) {
        self.expect_continue.store(true, Ordering::SeqCst);
        self.continue_notify = Some(notify);
    }

    /// A shared flag this body flips to `true` once fully consumed —
    /// the orchestrator reads it after the handler returns to decide
    /// whether the connection can be kept alive without risking the
    /// next request head parsing into stale body bytes. Cheaper than
    /// resurrecting ownership of a body the handler already consumed by
    /// value.
    pub(crate) fn drained_flag(&self) -> Arc<AtomicBool> {
        self.drained.clone()
    }

    /// True if the body is known, statically, to carry zero bytes.
    pub fn is_known_empty(&self) -> bool {
        matches!(self.mode, BodyMode::Empty)
    }

    /// The body's total length if known ahead of time (mode `Fixed`);
    /// `None` for chunked or empty-but-unsized bodies.
    pub fn known_length(&self) -> Option<u64> {
        match self.mode {
            BodyMode::Empty => Some(0),
            BodyMode::Fixed(n) => Some(n),
            BodyMode::Chunked => None,
        }
    }

    /// Pulls the next chunk, or `None` once the body is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, Error>> {
        if self.expect_continue.swap(false, Ordering::SeqCst) {
            if let Some(notify) = &self.continue_notify {
                notify.notify_one();
            }
        }

        let shared = self.shared.as_ref()?.clone();
        let mut guard = shared.lock().await;
        let chunk = guard.next_body_chunk().await;
        if guard.body_exhausted() {
            self.drained.store(true, Ordering::SeqCst);
        }
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;
    use crate::headers::HeaderMap;

    #[test]
    fn head_request_forces_empty_mode() {
        let headers = HeaderMap::new();
        let mode = resolve_mode(&Method::HEAD, false, &headers).unwrap();
        assert_eq!(mode, BodyMode::Empty);
    }

    #[test]
    fn content_length_resolves_fixed_mode() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "42");
        let mode = resolve_mode(&Method::POST, false, &headers).unwrap();
        assert_eq!(mode, BodyMode::Fixed(42));
    }

    #[test]
    fn chunked_transfer_encoding_resolves_chunked_mode() {
        let mut headers = HeaderMap::new();
        headers.append("Transfer-Encoding", "chunked");
        let mode = resolve_mode(&Method::POST, false, &headers).unwrap();
        assert_eq!(mode, BodyMode::Chunked);
    }

    #[test]
    fn conflicting_content_lengths_rejected() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "1");
        headers.append("Content-Length", "2");
        let err = resolve_mode(&Method::POST, false, &headers).unwrap_err();
        assert_matches!(err.kind(), Kind::BadHeader);
    }

    #[test]
    fn empty_body_reports_known_zero_length() {
        let body = Incoming::empty();
        assert!(body.is_known_empty());
        assert_eq!(body.known_length(), Some(0));
    }

    #[tokio::test]
    async fn empty_body_yields_no_chunks() {
        let mut body = Incoming::empty();
        assert!(body.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn fixed_body_reads_through_conn_state_and_drains() {
        let reader = tokio_test::io::Builder::new().read(b"hello").build();
        let conn = Arc::new(Mutex::new(ConnState::new(
            Box::pin(reader),
            BytesMut::new(),
        )));
        conn.lock().await.begin_body(BodyMode::Fixed(5));
        let mut body = Incoming::new(conn.clone(), BodyMode::Fixed(5));
        let chunk = body.next_chunk().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"hello");
        assert!(body.next_chunk().await.is_none());
        assert!(conn.lock().await.body_exhausted());
    }
}
