#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]

//! # conduit-http
//!
//! conduit-http is a minimal, embeddable HTTP/1.x server library: routes
//! with method and media-type negotiation, before/after actions that run
//! around route dispatch, and a per-connection exchange orchestrator
//! with keep-alive support.
//!
//! It speaks HTTP/0.9 through HTTP/1.1 on the wire; HTTP/2 and HTTP/3
//! request lines are recognized but rejected at dispatch time with a
//! `501 Not Implemented` response rather than silently downgraded.
//!
//! ## Building a server
//!
//! ```no_run
//! use std::sync::Arc;
//! use conduit_http::server::Builder;
//! use conduit_http::{Method, MediaRange};
//!
//! # async fn run() -> Result<(), conduit_http::Error> {
//! let exchange = Builder::new()
//!     .route(
//!         "/hello",
//!         Method::GET,
//!         MediaRange::NothingAndAll,
//!         MediaRange::NothingAndAll,
//!         Arc::new(|_req| Box::pin(async { conduit_http::Response::new(200) })),
//!     )?
//!     .build();
//!
//! let server = conduit_http::server::Server::bind("127.0.0.1:0".parse().unwrap(), exchange).await?;
//! server.serve().await
//! # }
//! ```
//!
//! ## Stability
//!
//! This crate does not re-export `http`'s `HeaderMap`/`Request`/
//! `Response` types: request and response headers, and the response
//! body/builder, are this crate's own types (see [`headers::HeaderMap`],
//! [`request::Request`], [`response::Response`]) so that build-time
//! validation and case-preserving-but-insensitive header storage
//! can be enforced at the type level. [`Method`], [`Version`], and
//! [`Uri`] are re-exported as-is since this crate adds no behavior on
//! top of them.

#[doc(no_inline)]
pub use http::{Method, Uri, Version};

pub use crate::error::{Error, Kind, Parse, Result};
pub use crate::headers::{HeaderMap, HeaderName};
pub use crate::media::MediaRange;
pub use crate::request::{PathParams, Request, RequestHead};
pub use crate::response::{Body, Response, ResponseBuilder};

pub mod body;
pub mod channel;
pub mod clock;
pub mod config;
mod date;
mod error;
pub mod events;
pub mod exchange;
mod headers;
pub mod media;
mod parse;
mod request;
pub mod response;
pub mod routing;
pub mod server;
