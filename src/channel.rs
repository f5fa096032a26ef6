//! Channel Writer: the single per-connection `write` entry point
//! that turns a [`Response`] into bytes on the wire.
//!
//! The three wire-framing strategies — chunked, fixed-length,
//! close-delimited — are the three arms of [`Framing`]; the `Date`
//! header comes from [`crate::date`].

use std::pin::Pin;

use bytes::{BufMut, BytesMut};
use http::Version;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::error::{Error, Kind};
use crate::response::Response;

enum Framing {
    ContentLength(u64),
    Chunked,
    CloseDelimited,
    /// Status forbids a body (1xx, 204, 304): no `Content-Length`, no
    /// `Transfer-Encoding`, no bytes after the head.
    Forbidden,
}

/// Per-connection response writer. Not reentrant, not thread-safe
/// across threads — serialized by construction, one per connection.
pub struct ChannelWriter {
    io: Pin<Box<dyn AsyncWrite + Send>>,
    peer_version: Version,
    discard_rejected_informational: bool,
    sent_100_continue: bool,
    wrote_final: bool,
    corrupt: bool,
    pub(crate) should_close: bool,
}

impl ChannelWriter {
    pub fn new(io: Pin<Box<dyn AsyncWrite + Send>>, peer_version: Version, config: &Config) -> Self {
        ChannelWriter {
            io,
            peer_version,
            discard_rejected_informational: config.discard_rejected_informational,
            sent_100_continue: false,
            wrote_final: false,
            corrupt: false,
            should_close: false,
        }
    }

    /// Resets per-request state for the next request on this connection,
    /// keeping the same underlying socket and corruption flag.
    pub(crate) fn begin_next(&mut self, peer_version: Version) {
        self.peer_version = peer_version;
        self.sent_100_continue = false;
        self.wrote_final = false;
        self.should_close = false;
    }

    /// Writes `response`, returning the number of bytes written to the
    /// wire (0 on a short-circuit).
    pub async fn write(&mut self, response: &Response) -> Result<u64, Error> {
        if self.corrupt {
            return Err(Error::new(Kind::IllegalState));
        }
        if self.wrote_final {
            return Err(Error::new(Kind::IllegalState));
        }

        let is_informational = (100..200).contains(&response.status());

        if is_informational && response.status() == 100 && self.sent_100_continue {
            return Ok(0);
        }

        if is_informational && self.peer_version < Version::HTTP_11 {
            if !self.discard_rejected_informational {
                tracing::warn!(
                    status = response.status(),
                    version = ?self.peer_version,
                    "suppressing informational response for pre-HTTP/1.1 peer"
                );
            }
            return Ok(0);
        }

        if response.is_final() {
            self.wrote_final = true;
        } else if response.status() == 100 {
            self.sent_100_continue = true;
        }

        let framing = self.decide_framing(response);
        let head = self.encode_head(response, &framing);

        if let Err(e) = self.io.write_all(&head).await {
            self.corrupt = true;
            return Err(Error::new_io(e));
        }
        let mut written = head.len() as u64;

        written += match self.write_body(response, &framing).await {
            Ok(n) => n,
            Err(e) => {
                self.corrupt = true;
                return Err(e);
            }
        };

        if let Err(e) = self.io.flush().await {
            self.corrupt = true;
            return Err(Error::new_io(e));
        }

        Ok(written)
    }

    fn decide_framing(&self, response: &Response) -> Framing {
        let forbids_body = (100..200).contains(&response.status())
            || response.status() == 204
            || response.status() == 304;

        if forbids_body {
            return Framing::Forbidden;
        }
        if response.body().is_empty() {
            return Framing::ContentLength(0);
        }
        match response.body().known_length() {
            Some(n) => Framing::ContentLength(n),
            None => {
                if self.peer_version >= Version::HTTP_11 {
                    Framing::Chunked
                } else {
                    Framing::CloseDelimited
                }
            }
        }
    }

    fn encode_head(&mut self, response: &Response, framing: &Framing) -> BytesMut {
        let mut buf = BytesMut::with_capacity(256);
        let version_str = match self.peer_version {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };
        let mut int_buf = itoa::Buffer::new();
        buf.put_slice(version_str.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(int_buf.format(response.status()).as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(response.reason().as_bytes());
        buf.put_slice(b"\r\n");

        let mut saw_date = false;
        for (name, value) in response.headers().iter() {
            if name.as_str().eq_ignore_ascii_case("date") {
                saw_date = true;
            }
            buf.put_slice(name.as_str().as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        if !saw_date {
            buf.put_slice(b"date: ");
            buf.put_slice(crate::date::now().as_bytes());
            buf.put_slice(b"\r\n");
        }

        match framing {
            Framing::ContentLength(n) => {
                if !response.headers().contains("content-length") {
                    buf.put_slice(b"content-length: ");
                    buf.put_slice(int_buf.format(*n).as_bytes());
                    buf.put_slice(b"\r\n");
                }
            }
            Framing::Chunked => {
                buf.put_slice(b"transfer-encoding: chunked\r\n");
            }
            Framing::CloseDelimited => {
                self.should_close = true;
                buf.put_slice(b"connection: close\r\n");
            }
            Framing::Forbidden => {}
        }

        if let Some(v) = response.headers().get("connection") {
            if v.eq_ignore_ascii_case("close") {
                self.should_close = true;
            }
        }

        buf.put_slice(b"\r\n");
        buf
    }

    async fn write_body(&mut self, response: &Response, framing: &Framing) -> Result<u64, Error> {
        if matches!(framing, Framing::ContentLength(0) | Framing::Forbidden) {
            return Ok(0);
        }

        let chunked = matches!(framing, Framing::Chunked);
        let mut written = 0u64;

        while let Some(chunk) = response.body().next_chunk() {
            let chunk = chunk.map_err(Error::new_io)?;
            if chunked {
                let size_line = format!("{:x}\r\n", chunk.len());
                self.io
                    .write_all(size_line.as_bytes())
                    .await
                    .map_err(Error::new_io)?;
                self.io.write_all(&chunk).await.map_err(Error::new_io)?;
                self.io.write_all(b"\r\n").await.map_err(Error::new_io)?;
            } else {
                self.io.write_all(&chunk).await.map_err(Error::new_io)?;
            }
            written += chunk.len() as u64;
        }

        if chunked {
            self.io
                .write_all(b"0\r\n\r\n")
                .await
                .map_err(Error::new_io)?;
        }

        Ok(written)
    }
}
