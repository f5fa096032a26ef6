//! Request head and the matched-parameter/attribute bag carried through
//! one exchange.

use std::collections::HashMap;

use http::{Extensions, Method, Version};

use crate::headers::HeaderMap;

/// The parsed, immutable request head.
///
/// Produced once by [`crate::parse`] and never mutated afterward — the
/// mutable per-exchange state (path params, attributes set by before
/// actions) lives alongside it in [`Request`], not on this type.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    /// The raw request-target exactly as sent on the wire (before
    /// normalization/percent-decoding, which routing performs on its own
    /// copy).
    pub raw_target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

/// Path parameters produced by a successful route or action match.
///
/// Single-segment values are percent-decoded and never contain `/`;
/// catch-all values always begin with `/`.
#[derive(Clone, Debug, Default)]
pub struct PathParams {
    values: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        PathParams {
            values: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the matched value for `name`, if the matched route/action
    /// declared a parameter by that name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }
}

/// The full per-request view handed to actions and handlers: the
/// immutable head, the path parameters from the winning route match, a
/// free-form attribute bag actions use to pass data forward (a
/// before-action sets an attribute a handler or after-action reads),
/// and the body handle.
pub struct Request<Body> {
    pub head: RequestHead,
    pub params: PathParams,
    pub attributes: Extensions,
    pub body: Body,
}

impl<Body> Request<Body> {
    pub fn new(head: RequestHead, params: PathParams, body: Body) -> Self {
        Request {
            head,
            params,
            attributes: Extensions::new(),
            body,
        }
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_params_roundtrip() {
        let mut p = PathParams::new();
        p.insert("name", "John");
        assert_eq!(p.get("name"), Some("John"));
        assert_eq!(p.get("missing"), None);
    }
}
