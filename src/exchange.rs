//! Exchange Orchestrator: the per-connection request/response
//! cycle — parse head, run before-actions, resolve and invoke the
//! handler, run after-actions, write the response, drain the body,
//! repeat or close.
//!
//! Expressed as a sequential `async fn` per connection rather than a
//! hand-rolled `Future::poll` state machine — the result sum type the
//! orchestrator pattern-matches at each stage reads directly as a
//! straight-line `async fn` with early returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::BytesMut;
use http::Version;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;

use crate::body::{self, ConnState, Incoming};
use crate::channel::ChannelWriter;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Kind, Parse};
use crate::events::EventSink;
use crate::media::{self, AcceptEntry};
use crate::parse::{parse_request_head, ParseOutcome};
use crate::request::{PathParams, Request, RequestHead};
use crate::response::{Response, ResponseBuilder};
use crate::routing::action::BeforeOutcome;
use crate::routing::route::RouteRegistry;
use crate::routing::ActionRegistry;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// `(error, next) -> Option<Response>`, executed in order until one
/// returns `Some`.
pub type ExceptionHandler = Arc<dyn Fn(&Error) -> BoxFuture<Option<Response>> + Send + Sync>;

/// The shared, read-mostly state every connection's orchestrator
/// consults: registries, configuration, and optional collaborators.
pub struct Exchange {
    pub routes: Arc<RouteRegistry>,
    pub actions: Arc<ActionRegistry>,
    pub config: Arc<Config>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl Exchange {
    /// Drives one connection to completion: repeated request/response
    /// cycles until the peer or either side asks for `Connection: close`,
    /// the idle timeout fires, or the socket errors.
    pub async fn serve_connection<IO>(&self, io: IO)
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let conn = Arc::new(tokio::sync::Mutex::new(ConnState::new(
            Box::pin(read_half),
            BytesMut::new(),
        )));
        let mut writer = ChannelWriter::new(Box::pin(write_half), Version::HTTP_11, &self.config);
        let mut error_count = 0u32;

        loop {
            let head = match self.read_head(&conn).await {
                ReadHeadOutcome::Closed => break,
                ReadHeadOutcome::TimedOut => {
                    let response = Response::new(408);
                    let _ = self.write_with_timeout(&mut writer, &response).await;
                    break;
                }
                ReadHeadOutcome::Parsed(head) => head,
                ReadHeadOutcome::Err(err) => {
                    error_count += 1;
                    let response = self.error_response(&err).await;
                    let _ = self.write_with_timeout(&mut writer, &response).await;
                    if error_count >= self.config.max_error_responses {
                        break;
                    }
                    continue;
                }
            };

            writer.begin_next(head.version);
            let peer_wants_close = wants_close(&head);

            // HTTP/2 and HTTP/3 request lines parse
            // successfully (see `parse::resolve_version`) but this server
            // only dispatches HTTP/0.9-1.1 framing; reject explicitly
            // rather than silently downgrading.
            if head.version == Version::HTTP_2 || head.version == Version::HTTP_3 {
                let err = Error::new(Kind::VersionNotImplemented);
                let response = self.error_response(&err).await;
                let _ = self.write_with_timeout(&mut writer, &response).await;
                break;
            }

            let start = std::time::Instant::now();
            let body_mode = match body::resolve_mode(&head.method, false, &head.headers) {
                Ok(m) => m,
                Err(err) => {
                    let response = self.error_response(&err).await;
                    let _ = self.write_with_timeout(&mut writer, &response).await;
                    break;
                }
            };

            let expects_continue = head
                .headers
                .get("expect")
                .map(|v| v.eq_ignore_ascii_case("100-continue"))
                .unwrap_or(false);

            conn.lock().await.begin_body(body_mode);
            let mut body = body::Incoming::new(conn.clone(), body_mode);
            let continue_notify = Arc::new(Notify::new());
            if expects_continue {
                body.arm_continue(continue_notify.clone());
            }

            self.events.on_request_head(&head, 0, start.elapsed());

            let raw_target = head.raw_target.clone();
            let exchange_fut = self.run_exchange(head, body, &raw_target);
            tokio::pin!(exchange_fut);

            let response = loop {
                tokio::select! {
                    resp = &mut exchange_fut => break resp,
                    _ = continue_notify.notified(), if expects_continue => {
                        let interim = Response::new(100);
                        if self.write_with_timeout(&mut writer, &interim).await.is_err() {
                            break Response::new(500);
                        }
                    }
                }
            };

            let write_start = std::time::Instant::now();
            let write_result = self.write_with_timeout(&mut writer, &response).await;
            if write_result.is_err() {
                break;
            }
            self.events
                .on_response_sent(&response, write_result.unwrap_or(0), write_start.elapsed());

            // A handler that never fully read its body leaves bytes in
            // the shared connection buffer that would otherwise be
            // mistaken for the next request's head; drain them now.
            if self.drain_body(&conn).await.is_err() {
                break;
            }

            if peer_wants_close || writer.should_close {
                break;
            }
        }
    }

    async fn write_with_timeout(
        &self,
        writer: &mut ChannelWriter,
        response: &Response,
    ) -> Result<u64, Error> {
        match tokio::time::timeout(self.config.write_timeout, writer.write(response)).await {
            Ok(result) => result,
            Err(_) => Err(Error::new(Kind::Timeout)),
        }
    }

    async fn read_head(&self, conn: &Arc<tokio::sync::Mutex<ConnState>>) -> ReadHeadOutcome {
        let sleep = self.clock.sleep(self.config.idle_connection_timeout);
        tokio::pin!(sleep);

        loop {
            let mut guard = conn.lock().await;
            match parse_request_head(guard.buf_bytes(), self.config.max_request_head_size) {
                Ok(ParseOutcome::Complete(head, consumed)) => {
                    guard.consume(consumed);
                    return ReadHeadOutcome::Parsed(head);
                }
                Ok(ParseOutcome::Incomplete) => {}
                Err(err) => return ReadHeadOutcome::Err(err),
            }
            drop(guard);

            let fill = async {
                let mut guard = conn.lock().await;
                guard.fill_more().await
            };
            tokio::select! {
                res = fill => match res {
                    Ok(0) => return ReadHeadOutcome::Closed,
                    Ok(_) => continue,
                    Err(e) => return ReadHeadOutcome::Err(Error::new_io(e)),
                },
                _ = &mut sleep => return ReadHeadOutcome::TimedOut,
            }
        }
    }

    async fn drain_body(&self, conn: &Arc<tokio::sync::Mutex<ConnState>>) -> Result<(), Error> {
        let mut guard = conn.lock().await;
        guard.drain_stale_body().await
    }

    async fn run_exchange(
        &self,
        head: RequestHead,
        body: Incoming,
        raw_target: &str,
    ) -> Response {
        let (before, after) = self.actions.matched(raw_target);

        let mut request = Request::new(head, PathParams::new(), body);
        for action in before {
            match action(request).await {
                BeforeOutcome::Continue(r) => request = r,
                BeforeOutcome::Respond(response) => {
                    return self.run_after(after, response).await;
                }
            }
        }

        let response = match self.dispatch(&request, raw_target) {
            Ok(route_handler) => {
                let (handler, params) = route_handler;
                request.params = params;
                (handler)(request).await
            }
            Err(err) => self.error_response(&err).await,
        };

        self.run_after(after, response).await
    }

    fn dispatch(
        &self,
        request: &Request<Incoming>,
        raw_target: &str,
    ) -> Result<(crate::routing::route::HandlerFn, PathParams), Error> {
        let path = raw_target.split('?').next().unwrap_or(raw_target);
        let (route, params) = self.routes.lookup(path).ok_or_else(|| Error::new(Kind::RouteNotFound))?;

        let content_type = request
            .head
            .headers
            .get("content-type")
            .and_then(|v| media::parse_concrete(v).ok());
        let accept: Vec<AcceptEntry> = request
            .head
            .headers
            .get("accept")
            .map(media::parse_accept)
            .unwrap_or_default();

        let handler = RouteRegistry::resolve_handler(
            route,
            &request.head.method,
            content_type.as_ref(),
            &accept,
        )?;

        Ok((handler.call.clone(), params))
    }

    async fn run_after(
        &self,
        after: Vec<crate::routing::action::AfterFn>,
        mut response: Response,
    ) -> Response {
        for action in after {
            response = action(response).await;
        }
        response
    }

    /// Routes an error through the user-supplied exception-handler chain
    /// falls back to a fixed default response per kind.
    async fn error_response(&self, err: &Error) -> Response {
        for handler in &self.exception_handlers {
            if let Some(response) = handler(err).await {
                return response;
            }
        }
        default_error_response(err)
    }
}

enum ReadHeadOutcome {
    Parsed(RequestHead),
    Err(Error),
    TimedOut,
    Closed,
}

fn wants_close(head: &RequestHead) -> bool {
    let declared_close = head
        .headers
        .get("connection")
        .map(|v| v.eq_ignore_ascii_case("close"))
        .unwrap_or(false);
    let declared_keepalive = head
        .headers
        .get("connection")
        .map(|v| v.eq_ignore_ascii_case("keep-alive"))
        .unwrap_or(false);

    if declared_close {
        return true;
    }
    match head.version {
        Version::HTTP_10 | Version::HTTP_09 => !declared_keepalive,
        _ => false,
    }
}

fn default_error_response(err: &Error) -> Response {
    let status = match err.kind() {
        Kind::Parse(Parse::MajorUnsupported) | Kind::Parse(Parse::MinorRequired) | Kind::Parse(Parse::MinorUnexpected) => 505,
        Kind::Parse(_) | Kind::BadHeader => 400,
        Kind::RouteNotFound => 404,
        Kind::MethodNotAllowed => 405,
        Kind::MediaTypeUnsupported => 415,
        Kind::MediaTypeNotAccepted => 406,
        Kind::AmbiguousHandler => 500,
        Kind::Timeout => 408,
        Kind::VersionNotImplemented => 501,
        _ => 500,
    };

    let mut builder = ResponseBuilder::new(status);
    if matches!(err.kind(), Kind::MethodNotAllowed) && !err.allowed_methods().is_empty() {
        let allow = err
            .allowed_methods()
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        builder = builder
            .header("allow", &allow)
            .expect("method tokens never contain surrounding whitespace");
    }

    builder
        .build()
        .expect("a freshly constructed error response always validates")
}
