//! The optional event sink external collaborator.
//!
//! The crate treats metrics/event-bus integration as out of scope; it only
//! emits these synchronous, non-blocking hook calls on the exchange task.
//! Applications that want metrics wire up their own [`EventSink`].

use std::time::Duration;

use crate::request::RequestHead;
use crate::response::Response;

/// Observer invoked synchronously by the exchange orchestrator.
///
/// Implementations must not block; they run inline on the connection's
/// task between protocol stages.
pub trait EventSink: Send + Sync {
    /// Called once the request head has been parsed successfully.
    fn on_request_head(&self, _head: &RequestHead, _byte_count: u64, _elapsed: Duration) {}

    /// Called once a final response has been written.
    fn on_response_sent(&self, _response: &Response, _byte_count: u64, _elapsed: Duration) {}

    /// Called once the listening socket has started accepting.
    fn on_server_started(&self) {}

    /// Called once the server has finished graceful shutdown.
    fn on_server_stopped(&self) {}
}

/// An [`EventSink`] that does nothing, used when the application supplies
/// none.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {}
