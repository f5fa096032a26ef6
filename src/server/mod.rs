//! Server: a
//! `Builder` that assembles a [`RouteRegistry`](crate::routing::RouteRegistry),
//! [`ActionRegistry`](crate::routing::ActionRegistry), [`Config`] and
//! collaborators into an [`Exchange`], then a [`Server`] that accepts
//! TCP connections and spawns one task per connection running
//! [`Exchange::serve_connection`].
//!
//! The chained-setter-over-a-config-struct shape and the accept-loop
//! structure follow a conventional connection-builder API, built on
//! `tokio::net::TcpListener` directly rather than a generic `Accept`
//! trait — see `DESIGN.md` for why a single `tokio::sync::Notify` plus
//! an in-flight counter backs graceful shutdown instead of a dedicated
//! drain channel.

mod shutdown;
mod tcp;

pub use shutdown::GracefulShutdown;
pub use tcp::Server;

use std::sync::Arc;

use http::Method;

use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::error::Error;
use crate::events::{EventSink, NoopEventSink};
use crate::exchange::{Exchange, ExceptionHandler};
use crate::media::MediaRange;
use crate::routing::action::{AfterFn, BeforeFn};
use crate::routing::route::{Handler, HandlerFn};
use crate::routing::{ActionRegistry, RouteRegistry};

/// Assembles routes, actions, and configuration into a [`Server`]
pub struct Builder {
    routes: RouteRegistry,
    actions: ActionRegistry,
    config: Config,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    exception_handlers: Vec<ExceptionHandler>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder {
    /// Starts from an empty route/action registry and default [`Config`].
    pub fn new() -> Self {
        Builder {
            routes: RouteRegistry::new(),
            actions: ActionRegistry::new(),
            config: Config::default(),
            events: Arc::new(NoopEventSink),
            clock: Arc::new(TokioClock),
            exception_handlers: Vec::new(),
        }
    }

    /// Registers a route pattern with its handlers.
    pub fn route(
        mut self,
        pattern: &str,
        method: Method,
        consumes: MediaRange,
        produces: MediaRange,
        handler: HandlerFn,
    ) -> Result<Self, Error> {
        self.routes
            .add(pattern, vec![Handler::new(method, consumes, produces, handler)])?;
        Ok(self)
    }

    /// Registers additional handlers on an already-registered pattern.
    /// Useful for declaring several methods or media types on one path
    /// across multiple calls.
    pub fn route_handlers(mut self, pattern: &str, handlers: Vec<Handler>) -> Result<Self, Error> {
        self.routes.add(pattern, handlers)?;
        Ok(self)
    }

    /// Registers a before-action at `pattern`.
    pub fn before(mut self, pattern: &str, action: BeforeFn) -> Result<Self, Error> {
        self.actions.add_before(pattern, action)?;
        Ok(self)
    }

    /// Registers an after-action at `pattern`.
    pub fn after(mut self, pattern: &str, action: AfterFn) -> Result<Self, Error> {
        self.actions.add_after(pattern, action)?;
        Ok(self)
    }

    /// Appends an exception handler, tried in registration order before
    /// the built-in default error response.
    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handlers.push(handler);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Freezes the registries and configuration into a shareable
    /// [`Exchange`].
    pub fn build(self) -> Exchange {
        Exchange {
            routes: Arc::new(self.routes),
            actions: Arc::new(self.actions),
            config: Arc::new(self.config),
            events: self.events,
            clock: self.clock,
            exception_handlers: self.exception_handlers,
        }
    }
}
