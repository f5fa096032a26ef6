//! End-to-end exercises of the six concrete scenarios over a real TCP
//! loopback connection: a running [`conduit_http::server::Server`] on one
//! side, a bare [`tokio::net::TcpStream`] writing raw request bytes and
//! reading raw response bytes on the other.

use std::sync::Arc;

use conduit_http::media::ConcreteType;
use conduit_http::routing::action::BeforeOutcome;
use conduit_http::routing::route::Handler;
use conduit_http::server::{Builder, Server};
use conduit_http::{Body, MediaRange, Method, Response, ResponseBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A parsed HTTP/1.x response: status line's code, header lines
/// (lowercased names), and the body bytes framed by whichever of
/// `Content-Length`/`chunked` the server chose.
struct ParsedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ParsedResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A loopback client that keeps its own leftover-bytes buffer across
/// calls, the same way a real keep-alive client would, so a sequence of
/// `request()` calls on one connection never reads into the next
/// response's bytes.
struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Client {
            stream,
            buf: Vec::new(),
        }
    }

    async fn request(&mut self, raw: &[u8]) -> ParsedResponse {
        self.stream.write_all(raw).await.unwrap();
        self.read_one().await
    }

    async fn fill(&mut self) {
        let mut tmp = [0u8; 4096];
        let n = self.stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed before a full response arrived");
        self.buf.extend_from_slice(&tmp[..n]);
    }

    async fn read_one(&mut self) -> ParsedResponse {
        let head_end = loop {
            if let Some(pos) = find(&self.buf, b"\r\n\r\n") {
                break pos + 4;
            }
            self.fill().await;
        };

        let head_text = String::from_utf8_lossy(&self.buf[..head_end]).into_owned();
        let mut lines = head_text.split("\r\n");
        let status_line = lines.next().unwrap();
        let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_owned(), value.trim().to_owned()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse::<usize>().unwrap());
        let chunked = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked"));

        let body = if chunked {
            self.read_chunked_body(head_end).await
        } else {
            let want = content_length.unwrap_or(0);
            while self.buf.len() < head_end + want {
                self.fill().await;
            }
            let body = self.buf[head_end..head_end + want].to_vec();
            self.buf.drain(..head_end + want);
            body
        };

        ParsedResponse { status, headers, body }
    }

    async fn read_chunked_body(&mut self, head_end: usize) -> Vec<u8> {
        let mut cursor = head_end;
        let mut out = Vec::new();
        loop {
            let size_end = loop {
                if let Some(pos) = find(&self.buf[cursor..], b"\r\n") {
                    break cursor + pos;
                }
                self.fill().await;
            };
            let size_line = String::from_utf8_lossy(&self.buf[cursor..size_end]).into_owned();
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
            let chunk_start = size_end + 2;
            let chunk_end = chunk_start + size;
            while self.buf.len() < chunk_end + 2 {
                self.fill().await;
            }
            if size == 0 {
                cursor = chunk_end + 2;
                break;
            }
            out.extend_from_slice(&self.buf[chunk_start..chunk_end]);
            cursor = chunk_end + 2;
        }
        self.buf.drain(..cursor);
        out
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

async fn spawn(exchange: conduit_http::exchange::Exchange) -> std::net::SocketAddr {
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), exchange)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

fn text(status: u16, body: &str) -> Response {
    ResponseBuilder::new(status)
        .header("content-type", "text/plain")
        .unwrap()
        .body(Body::from_bytes(body.to_owned()))
        .build()
        .unwrap()
}

/// Scenario: a route with no request/response body requirement returns
/// a fixed greeting.
#[tokio::test(flavor = "multi_thread")]
async fn hello_route_returns_greeting() {
    let exchange = Builder::new()
        .route(
            "/hello",
            Method::GET,
            MediaRange::NothingAndAll,
            MediaRange::NothingAndAll,
            Arc::new(|_req| Box::pin(async { text(200, "Hello, World!") })),
        )
        .unwrap()
        .build();
    let addr = spawn(exchange).await;

    let mut client = Client::connect(addr).await;
    let resp = client
        .request(b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"Hello, World!");
}

/// Scenario: a single-segment path parameter is bound and echoed back.
#[tokio::test(flavor = "multi_thread")]
async fn path_param_is_echoed() {
    let exchange = Builder::new()
        .route(
            "/greet/:name",
            Method::GET,
            MediaRange::NothingAndAll,
            MediaRange::NothingAndAll,
            Arc::new(|req| {
                Box::pin(async move {
                    let name = req.path_param("name").unwrap_or("stranger").to_owned();
                    text(200, &format!("Hello, {}!", name))
                })
            }),
        )
        .unwrap()
        .build();
    let addr = spawn(exchange).await;

    let mut client = Client::connect(addr).await;
    let resp = client
        .request(b"GET /greet/Ada HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"Hello, Ada!");
}

/// Scenario: a catch-all segment absorbs the remainder of the path,
/// including the case of matching the mount point itself.
#[tokio::test(flavor = "multi_thread")]
async fn catch_all_matches_deep_and_root_paths() {
    let exchange = Builder::new()
        .route(
            "/files/*path",
            Method::GET,
            MediaRange::NothingAndAll,
            MediaRange::NothingAndAll,
            Arc::new(|req| {
                Box::pin(async move {
                    let path = req.path_param("path").unwrap_or("").to_owned();
                    text(200, &path)
                })
            }),
        )
        .unwrap()
        .build();
    let addr = spawn(exchange).await;

    let mut deep = Client::connect(addr).await;
    let resp = deep
        .request(b"GET /files/a/b/c.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"/a/b/c.txt");

    let mut root = Client::connect(addr).await;
    let resp = root
        .request(b"GET /files HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await;
    assert_eq!(resp.status, 200);
}

struct Banner(&'static str);

/// Scenario: a before-action stashes an attribute the handler reads, and
/// an after-action observes the handler's response.
#[tokio::test(flavor = "multi_thread")]
async fn before_and_after_actions_compose_around_the_handler() {
    let exchange = Builder::new()
        .route(
            "/announce",
            Method::GET,
            MediaRange::NothingAndAll,
            MediaRange::NothingAndAll,
            Arc::new(|req| {
                Box::pin(async move {
                    let banner = req.attributes.get::<Banner>().map(|b| b.0).unwrap_or("(none)");
                    text(200, banner)
                })
            }),
        )
        .unwrap()
        .before(
            "/announce",
            Arc::new(|mut req| {
                Box::pin(async move {
                    req.attributes.insert(Banner("launch day"));
                    BeforeOutcome::Continue(req)
                })
            }),
        )
        .unwrap()
        .after(
            "/announce",
            Arc::new(|response| {
                Box::pin(async move {
                    response
                        .into_builder()
                        .header("x-after-ran", "yes")
                        .unwrap()
                        .build()
                        .unwrap()
                })
            }),
        )
        .unwrap()
        .build();
    let addr = spawn(exchange).await;

    let mut client = Client::connect(addr).await;
    let resp = client
        .request(b"GET /announce HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"launch day");
    assert_eq!(resp.header("x-after-ran"), Some("yes"));
}

fn concrete(type_: &str, subtype: &str) -> ConcreteType {
    ConcreteType {
        type_: type_.to_owned(),
        subtype: subtype.to_owned(),
        params: Vec::new(),
    }
}

/// Scenario: two handlers registered on the same route/method negotiate
/// on `Accept`, and a missing `Accept` falls back to the first
/// registered handler.
#[tokio::test(flavor = "multi_thread")]
async fn content_negotiation_picks_handler_by_accept_header() {
    let plain = Handler::new(
        Method::GET,
        MediaRange::NothingAndAll,
        MediaRange::Concrete(concrete("text", "plain")),
        Arc::new(|_req| Box::pin(async { text(200, "plain") })),
    );
    let json = Handler::new(
        Method::GET,
        MediaRange::NothingAndAll,
        MediaRange::Concrete(concrete("application", "json")),
        Arc::new(|_req| {
            Box::pin(async {
                ResponseBuilder::new(200)
                    .header("content-type", "application/json")
                    .unwrap()
                    .body(Body::from_bytes("{\"ok\":true}"))
                    .build()
                    .unwrap()
            })
        }),
    );
    let exchange = Builder::new()
        .route_handlers("/negotiate", vec![plain, json])
        .unwrap()
        .build();
    let addr = spawn(exchange).await;

    let mut wants_json = Client::connect(addr).await;
    let resp = wants_json
        .request(b"GET /negotiate HTTP/1.1\r\nHost: x\r\nAccept: application/json\r\nConnection: close\r\n\r\n")
        .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"{\"ok\":true}");

    let mut no_accept = Client::connect(addr).await;
    let resp = no_accept
        .request(b"GET /negotiate HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"plain");
}

/// Scenario: a single keep-alive connection carries 200 sequential
/// requests of varying body sizes, each answered before the next is
/// read, with the connection never closed in between.
#[tokio::test(flavor = "multi_thread")]
async fn keep_alive_connection_serves_many_sequential_requests() {
    let exchange = Builder::new()
        .route(
            "/echo",
            Method::POST,
            MediaRange::NothingAndAll,
            MediaRange::NothingAndAll,
            Arc::new(|mut req| {
                Box::pin(async move {
                    let mut collected = Vec::new();
                    while let Some(chunk) = req.body.next_chunk().await {
                        collected.extend_from_slice(&chunk.unwrap());
                    }
                    ResponseBuilder::new(200)
                        .header("content-type", "text/plain")
                        .unwrap()
                        .body(Body::from_bytes(collected))
                        .build()
                        .unwrap()
                })
            }),
        )
        .unwrap()
        .build();
    let addr = spawn(exchange).await;

    let mut client = Client::connect(addr).await;
    for i in 0..200u32 {
        let size = ((i * 7 + 3) % 97) as usize + 1;
        let payload: Vec<u8> = (0..size).map(|j| b'a' + ((i as u8).wrapping_add(j as u8) % 26)).collect();
        let mut raw = format!(
            "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n",
            payload.len()
        )
        .into_bytes();
        raw.extend_from_slice(&payload);

        let resp = client.request(&raw).await;
        assert_eq!(resp.status, 200, "iteration {} failed", i);
        assert_eq!(resp.body, payload, "iteration {} body mismatch", i);
    }
}
