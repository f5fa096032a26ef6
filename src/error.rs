//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;

use http::Method;

/// Result type returned from methods that can fail with a crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// The single error type returned by this crate.
///
/// Carries a [`Kind`] describing what went wrong, plus an optional
/// underlying cause (e.g. an `io::Error`). Use [`Error::kind`] to match on
/// the category of failure; most callers outside this crate only need
/// `Display`.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
    allowed: Vec<Method>,
}

/// The category of an [`Error`].
#[derive(Debug)]
#[non_exhaustive]
pub enum Kind {
    /// The request head could not be parsed.
    Parse(Parse),
    /// A header value could not be interpreted (e.g. a malformed
    /// `Content-Length` or `Transfer-Encoding`).
    BadHeader,
    /// No route matched the request path.
    RouteNotFound,
    /// A route matched, but no handler accepts the request method.
    MethodNotAllowed,
    /// A route and method matched, but no handler accepts the request's
    /// `Content-Type`.
    MediaTypeUnsupported,
    /// A handler was found, but none satisfies the request's `Accept`.
    MediaTypeNotAccepted,
    /// More than one handler scored equally highest during negotiation.
    AmbiguousHandler,
    /// A response failed build-time framing or header validation.
    IllegalArgument,
    /// An operation was attempted that the current channel/response state
    /// forbids (e.g. writing a second final response).
    IllegalState,
    /// A response carried a body on a status that forbids one.
    IllegalResponseBody,
    /// An idle, read, or write timeout elapsed.
    Timeout,
    /// The peer closed the connection before a message completed.
    IncompleteMessage,
    /// An `io::Error` occurred on the underlying socket.
    Io,
    /// Error creating or binding the listening socket.
    Listen,
    /// Error accepting a connection.
    Accept,
    /// The request declared an HTTP version this server parses but does
    /// not dispatch (`HTTP/2`, `HTTP/3`).
    VersionNotImplemented,

    /// A registered route pattern was malformed.
    RoutePatternInvalid,
    /// A route equivalent (after parameter-name erasure) to one already
    /// registered was added again.
    RouteCollision,
    /// Two handlers on the same route compared equal on
    /// `(method, consumes, produces)`.
    HandlerCollision,
    /// A registered action pattern was malformed.
    ActionPatternInvalid,
    /// The same action closure was registered twice at one node.
    ActionNonUnique,
}

/// Head-parser error detail.
#[derive(Debug)]
#[non_exhaustive]
pub enum Parse {
    /// The request-target did not contain the separating slash expected by
    /// the tokenizer (reserved for future absolute-form parsing).
    NoSlash,
    /// The version field did not start with the literal `HTTP/`.
    NotHttpName,
    /// The major version digit was not a valid decimal digit.
    BadMajor,
    /// The minor version digit was not a valid decimal digit.
    BadMinor,
    /// Major version 0 or 1 requires a minor version but none was given.
    MinorRequired,
    /// Major version 2 or 3 forbids a minor version but one was given.
    MinorUnexpected,
    /// The (major, minor) pair is not in the supported set
    /// `{0.9, 1.0, 1.1, 2, 3}`.
    MajorUnsupported,
    /// The method token was empty or contained illegal bytes.
    Method,
    /// A header name was empty.
    HeaderNameEmpty,
    /// The request head exceeded the configured maximum size.
    HeadTooLarge,
    /// The connection reached EOF mid-head.
    UnexpectedEof,
}

impl Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Returns true if this was a request-head parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(_))
    }

    /// Returns true if this error was caused by a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::Timeout)
    }

    /// The methods a [`Kind::MethodNotAllowed`] error's route does accept,
    /// for building the response's `Allow` header. Empty for every other
    /// kind.
    pub fn allowed_methods(&self) -> &[Method] {
        &self.inner.allowed
    }

    /// Consumes the error, returning its underlying cause, if any.
    pub fn into_cause(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.inner.cause
    }

    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                cause: None,
                allowed: Vec::new(),
            }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn new_parse(p: Parse) -> Error {
        Error::new(Kind::Parse(p))
    }

    pub(crate) fn new_bad_header() -> Error {
        Error::new(Kind::BadHeader)
    }

    pub(crate) fn new_io(cause: std::io::Error) -> Error {
        Error::new(Kind::Io).with(cause)
    }

    pub(crate) fn new_listen<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Listen).with(cause)
    }

    pub(crate) fn new_accept<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Accept).with(cause)
    }

    pub(crate) fn new_timeout() -> Error {
        Error::new(Kind::Timeout)
    }

    pub(crate) fn new_incomplete() -> Error {
        Error::new(Kind::IncompleteMessage)
    }

    pub(crate) fn new_method_not_allowed(allowed: Vec<Method>) -> Error {
        let mut err = Error::new(Kind::MethodNotAllowed);
        err.inner.allowed = allowed;
        err
    }

    fn description(&self) -> &'static str {
        match self.inner.kind {
            Kind::Parse(Parse::NoSlash) => "request-target missing expected slash",
            Kind::Parse(Parse::NotHttpName) => "expected literal \"HTTP/\"",
            Kind::Parse(Parse::BadMajor) => "invalid HTTP major version digit",
            Kind::Parse(Parse::BadMinor) => "invalid HTTP minor version digit",
            Kind::Parse(Parse::MinorRequired) => "HTTP major version requires a minor version",
            Kind::Parse(Parse::MinorUnexpected) => "HTTP major version forbids a minor version",
            Kind::Parse(Parse::MajorUnsupported) => "unsupported HTTP version",
            Kind::Parse(Parse::Method) => "invalid HTTP method",
            Kind::Parse(Parse::HeaderNameEmpty) => "empty header name",
            Kind::Parse(Parse::HeadTooLarge) => "request head exceeded maximum size",
            Kind::Parse(Parse::UnexpectedEof) => "connection closed before head completed",
            Kind::BadHeader => "malformed Content-Length or Transfer-Encoding header",
            Kind::RouteNotFound => "no route matches the request path",
            Kind::MethodNotAllowed => "no handler accepts the request method",
            Kind::MediaTypeUnsupported => "no handler accepts the request Content-Type",
            Kind::MediaTypeNotAccepted => "no handler satisfies the request Accept header",
            Kind::AmbiguousHandler => "more than one handler scored equally during negotiation",
            Kind::IllegalArgument => "response failed build-time validation",
            Kind::IllegalState => "operation not permitted in the current channel state",
            Kind::IllegalResponseBody => "response carried a body on a status that forbids one",
            Kind::Timeout => "operation timed out",
            Kind::IncompleteMessage => "connection closed before message completed",
            Kind::Io => "connection error",
            Kind::Listen => "error creating server listener",
            Kind::Accept => "error accepting connection",
            Kind::VersionNotImplemented => "HTTP version not implemented by this server",
            Kind::RoutePatternInvalid => "invalid route pattern",
            Kind::RouteCollision => "route collides with an already-registered route",
            Kind::HandlerCollision => "handler collides with an already-registered handler",
            Kind::ActionPatternInvalid => "invalid action pattern",
            Kind::ActionNonUnique => "action already registered at this pattern",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("conduit_http::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

#[doc(hidden)]
trait AssertSendSync: Send + Sync + 'static {}
#[doc(hidden)]
impl AssertSendSync for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[test]
    fn error_size_of() {
        assert_eq!(std::mem::size_of::<Error>(), std::mem::size_of::<usize>());
    }

    #[test]
    fn display_includes_cause() {
        let err = Error::new_io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn kind_matches() {
        let err = Error::new(Kind::RouteNotFound);
        assert_matches!(err.kind(), Kind::RouteNotFound);
    }
}
