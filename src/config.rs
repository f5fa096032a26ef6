//! Server configuration.
//!
//! A plain struct with sensible defaults, mutated through chained
//! `fn name(mut self, v: T) -> Self` setters, consumed once at serve time.

use std::time::Duration;

/// Tunables for a running server.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) max_request_head_size: usize,
    pub(crate) discard_rejected_informational: bool,
    pub(crate) idle_connection_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) max_error_responses: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_request_head_size: 8192,
            discard_rejected_informational: true,
            idle_connection_timeout: Duration::from_secs(90),
            write_timeout: Duration::from_secs(30),
            max_error_responses: 10,
        }
    }
}

impl Config {
    /// Starts from the documented defaults.
    pub fn new() -> Self {
        Config::default()
    }

    /// Maximum size, in bytes, of a request's start line plus headers.
    /// Default: 8192.
    pub fn max_request_head_size(mut self, n: usize) -> Self {
        self.max_request_head_size = n;
        self
    }

    /// Whether a 1xx response rejected because the peer is older than
    /// HTTP/1.1 is merely suppressed (`true`, default) or additionally
    /// logged as a notable event (`false`).
    pub fn discard_rejected_informational(mut self, v: bool) -> Self {
        self.discard_rejected_informational = v;
        self
    }

    /// How long a connection may sit idle (no bytes read) before it is
    /// closed. Default: 90s.
    pub fn idle_connection_timeout(mut self, dur: Duration) -> Self {
        self.idle_connection_timeout = dur;
        self
    }

    /// How long a single write may block before the connection is closed.
    /// Default: 30s.
    pub fn write_timeout(mut self, dur: Duration) -> Self {
        self.write_timeout = dur;
        self
    }

    /// Per-connection cap on consecutive error responses before the
    /// connection is hard-closed. Default: 10.
    pub fn max_error_responses(mut self, n: u32) -> Self {
        self.max_error_responses = n;
        self
    }
}
