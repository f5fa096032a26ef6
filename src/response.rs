//! Response Builder & Validator.
//!
//! The builder is a value type: every mutation consumes `self` and
//! returns a new value, so callers holding an earlier clone are
//! unaffected — the idiomatic Rust reading of "persistent semantics"
//! is ordinary move-based ownership rather than a literal
//! structural-sharing tree. The status-class framing rules (no body on
//! 1xx/204/304, no `Connection: close` on 1xx) move from the write path
//! into build-time validation here.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::{Error, Kind};
use crate::headers::HeaderMap;

/// A response body: empty, a single materialized buffer with a known
/// length, or a shared pull-based byte-chunk stream.
#[derive(Clone)]
pub struct Body {
    inner: Arc<Mutex<BodyInner>>,
}

enum BodyInner {
    Empty,
    Full(Option<Bytes>),
    Stream(Box<dyn FnMut() -> Option<std::io::Result<Bytes>> + Send>),
}

impl Body {
    pub fn empty() -> Self {
        Body {
            inner: Arc::new(Mutex::new(BodyInner::Empty)),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Body {
            inner: Arc::new(Mutex::new(BodyInner::Full(Some(bytes.into())))),
        }
    }

    /// Wraps a pull-based chunk source whose length is not known ahead
    /// of time.
    pub fn from_stream<F>(next_chunk: F) -> Self
    where
        F: FnMut() -> Option<std::io::Result<Bytes>> + Send + 'static,
    {
        Body {
            inner: Arc::new(Mutex::new(BodyInner::Stream(Box::new(next_chunk)))),
        }
    }

    /// True if the body is known, statically, to carry zero bytes.
    pub fn is_empty(&self) -> bool {
        matches!(&*self.inner.lock().unwrap(), BodyInner::Empty)
    }

    /// The body's length if it is known ahead of time (empty or a single
    /// materialized buffer); `None` for a stream of unknown total size.
    pub fn known_length(&self) -> Option<u64> {
        match &*self.inner.lock().unwrap() {
            BodyInner::Empty => Some(0),
            BodyInner::Full(Some(b)) => Some(b.len() as u64),
            BodyInner::Full(None) => Some(0),
            BodyInner::Stream(_) => None,
        }
    }

    /// Pulls the next chunk, or `None` once exhausted.
    pub fn next_chunk(&self) -> Option<std::io::Result<Bytes>> {
        let mut guard = self.inner.lock().unwrap();
        match &mut *guard {
            BodyInner::Empty => None,
            BodyInner::Full(slot) => slot.take().map(Ok),
            BodyInner::Stream(f) => f(),
        }
    }
}

/// A status code, reason phrase, headers, and body.
#[derive(Clone)]
pub struct Response {
    status: u16,
    reason: String,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// Builds a response with default headers/body and the canonical
    /// reason phrase for `status`. Panics only if `status` combined with
    /// defaults (no body, no forbidden headers) would itself fail
    /// validation, which cannot happen for a freshly defaulted builder.
    pub fn new(status: u16) -> Response {
        ResponseBuilder::new(status)
            .build()
            .expect("a freshly constructed response always validates")
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// `is_final` ≡ status code ≥ 200 (glossary: Final response).
    pub fn is_final(&self) -> bool {
        self.status >= 200
    }

    pub fn into_builder(self) -> ResponseBuilder {
        ResponseBuilder {
            status: self.status,
            reason: Some(self.reason),
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Persistent builder for [`Response`].
#[derive(Clone)]
pub struct ResponseBuilder {
    status: u16,
    reason: Option<String>,
    headers: HeaderMap,
    body: Body,
}

impl ResponseBuilder {
    pub fn new(status: u16) -> Self {
        ResponseBuilder {
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets a header, replacing any existing entries with the same
    /// (case-insensitive) name. Rejects leading/trailing whitespace in
    /// either the name or value.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        check_no_surrounding_ws(name)?;
        check_no_surrounding_ws(value)?;
        self.headers.set(name, value.to_owned());
        self.validate_header_insert()
    }

    /// Appends `token` to a comma-separated header value, creating the
    /// header if absent.
    pub fn append_token(mut self, name: &str, token: &str) -> Result<Self, Error> {
        check_no_surrounding_ws(name)?;
        check_no_surrounding_ws(token)?;
        let combined = match self.headers.get(name) {
            Some(existing) if !existing.is_empty() => format!("{}, {}", existing, token),
            _ => token.to_owned(),
        };
        self.headers.set(name, combined);
        self.validate_header_insert()
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Clears the body and its associated `Content-Type`.
    pub fn clear_body(mut self) -> Self {
        self.body = Body::empty();
        self.headers.remove("content-type");
        self
    }

    fn validate_header_insert(self) -> Result<Self, Error> {
        Ok(self)
    }

    /// Runs build-time validation and returns the finished [`Response`]:
    /// `Connection: close` on any 1xx fails; a `Content-Length`
    /// on 1xx/204/304 fails; a body present when the status forbids one
    /// fails; header names differing only in case are rejected.
    pub fn build(self) -> Result<Response, Error> {
        if self.headers.has_case_conflict() {
            return Err(Error::new(Kind::IllegalArgument));
        }

        let is_informational = (100..200).contains(&self.status);
        let forbids_body = is_informational || self.status == 204 || self.status == 304;

        if is_informational {
            if let Some(v) = self.headers.get("connection") {
                if v.eq_ignore_ascii_case("close") {
                    return Err(Error::new(Kind::IllegalArgument));
                }
            }
        }

        if forbids_body && self.headers.contains("content-length") {
            return Err(Error::new(Kind::IllegalArgument));
        }

        if forbids_body && !self.body.is_empty() {
            return Err(Error::new(Kind::IllegalResponseBody));
        }

        let reason = self
            .reason
            .unwrap_or_else(|| default_reason_phrase(self.status).to_owned());

        Ok(Response {
            status: self.status,
            reason,
            headers: self.headers,
            body: self.body,
        })
    }
}

fn check_no_surrounding_ws(s: &str) -> Result<(), Error> {
    if s.is_empty() || s.trim() != s {
        return Err(Error::new(Kind::IllegalArgument));
    }
    Ok(())
}

/// The process-wide immutable status-code → reason-phrase table;
/// unknown codes fall back to `"Unknown"`.
fn default_reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[test]
    fn default_reason_phrase_used() {
        let r = Response::new(200);
        assert_eq!(r.reason(), "OK");
    }

    #[test]
    fn unknown_status_gets_unknown_reason() {
        let r = Response::new(499);
        assert_eq!(r.reason(), "Unknown");
    }

    #[test]
    fn content_length_on_204_fails() {
        let err = ResponseBuilder::new(204)
            .header("content-length", "5")
            .unwrap()
            .build()
            .unwrap_err();
        assert_matches!(err.kind(), Kind::IllegalArgument);
    }

    #[test]
    fn body_on_304_fails() {
        let err = ResponseBuilder::new(304)
            .body(Body::from_bytes("x"))
            .build()
            .unwrap_err();
        assert_matches!(err.kind(), Kind::IllegalResponseBody);
    }

    #[test]
    fn connection_close_on_1xx_fails() {
        let err = ResponseBuilder::new(100)
            .header("connection", "close")
            .unwrap()
            .build()
            .unwrap_err();
        assert_matches!(err.kind(), Kind::IllegalArgument);
    }

    #[test]
    fn case_only_duplicate_header_rejected() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "1");
        headers.append("content-length", "2");
        let builder = ResponseBuilder {
            status: 200,
            reason: None,
            headers,
            body: Body::empty(),
        };
        assert_matches!(builder.build().unwrap_err().kind(), Kind::IllegalArgument);
    }

    #[test]
    fn rejects_whitespace_in_header_value() {
        let err = ResponseBuilder::new(200).header("X-Foo", " bar").unwrap_err();
        assert_matches!(err.kind(), Kind::IllegalArgument);
    }

    #[test]
    fn clear_body_removes_content_type() {
        let b = ResponseBuilder::new(200)
            .header("content-type", "text/plain")
            .unwrap()
            .body(Body::from_bytes("x"))
            .clear_body();
        assert!(!b.headers.contains("content-type"));
        assert!(b.body.is_empty());
    }
}
