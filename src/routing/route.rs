//! Route Registry & handler resolution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::Method;

use crate::error::{Error, Kind};
use crate::media::{self, ConcreteType, MediaRange, Score};
use crate::request::{PathParams, Request};
use crate::response::Response;
use crate::routing::segment::{parse_pattern, PatternError, Segment};
use crate::routing::tree::{Exclusivity, Tree};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The terminal user function that produces the response for a request
/// (glossary: Handler).
pub type HandlerFn = Arc<dyn Fn(Request<crate::body::Incoming>) -> BoxFuture<Response> + Send + Sync>;

/// A 4-tuple: method, consumes media-type, produces media-type, closure.
#[derive(Clone)]
pub struct Handler {
    pub method: Method,
    pub consumes: MediaRange,
    pub produces: MediaRange,
    pub call: HandlerFn,
}

impl Handler {
    pub fn new(
        method: Method,
        consumes: MediaRange,
        produces: MediaRange,
        call: HandlerFn,
    ) -> Self {
        Handler {
            method,
            consumes,
            produces,
            call,
        }
    }

    /// Two handlers comparing equal on `(method, consumes, produces)` may
    /// not both be registered on the same route.
    fn collides_with(&self, other: &Handler) -> bool {
        self.method == other.method
            && self.consumes == other.consumes
            && self.produces == other.produces
    }

    /// `<nothing>` + `<nothing-and-all>` on the same method make an
    /// explicit `*/*` redundant; registering all three for one method is
    /// rejected as ambiguous.
    fn ambiguous_triple(handlers: &[Handler], method: &Method) -> bool {
        let mut has_nothing = false;
        let mut has_nothing_and_all = false;
        let mut has_wild = false;
        for h in handlers.iter().filter(|h| &h.method == method) {
            match &h.consumes {
                MediaRange::Nothing => has_nothing = true,
                MediaRange::NothingAndAll => has_nothing_and_all = true,
                MediaRange::Concrete(c) if c.type_ == "*" && c.subtype == "*" => has_wild = true,
                _ => {}
            }
        }
        has_nothing && has_nothing_and_all && has_wild
    }
}

/// An ordered list of segments plus a set of handlers.
pub struct Route {
    pub segments: Vec<Segment>,
    pub handlers: Vec<Handler>,
}

/// Maps request paths to routes and resolves the winning handler via
/// method and media-type negotiation.
pub struct RouteRegistry {
    tree: Tree<Route>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        RouteRegistry { tree: Tree::new() }
    }

    /// Registers a route pattern with its handlers. Two routes that are
    /// equal after parameter-name erasure collide (`RouteCollision`);
    /// structurally incompatible patterns (static/param exclusivity, or
    /// a catch-all alongside an existing terminal route) also collide.
    pub fn add(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<(), Error> {
        let segments = parse_pattern(pattern).map_err(pattern_error_to_route_error)?;

        for a in &handlers {
            for b in &handlers {
                if !std::ptr::eq(a as *const _, b as *const _) && a.collides_with(b) {
                    return Err(Error::new(Kind::HandlerCollision));
                }
            }
            if Handler::ambiguous_triple(&handlers, &a.method) {
                return Err(Error::new(Kind::HandlerCollision));
            }
        }

        let idx = self
            .tree
            .insert_path(&segments, Exclusivity::Enforced)
            .map_err(|_| Error::new(Kind::RouteCollision))?;

        if !self.tree.node(idx).payload.is_empty() {
            return Err(Error::new(Kind::RouteCollision));
        }

        self.tree.payload_mut(idx).push(Route { segments, handlers });
        Ok(())
    }

    /// Looks up the route matching `path`, returning the route and bound
    /// path parameters.
    pub fn lookup<'a>(&'a self, path: &str) -> Option<(&'a Route, PathParams)> {
        let segs = crate::routing::segment::normalize_path(path).ok()?;
        let matched = self.tree.match_path(&segs)?;
        let node_idx = *matched.node_chain.last()?;
        let route = self.tree.node(node_idx).payload.first()?;
        let mut params = PathParams::new();
        for (name, value) in matched.params {
            params.insert(name, value);
        }
        Some((route, params))
    }

    /// The three stages of handler resolution: method, then request
    /// media type, then `Accept` negotiation.
    pub fn resolve_handler<'a>(
        route: &'a Route,
        method: &Method,
        content_type: Option<&ConcreteType>,
        accept: &[media::AcceptEntry],
    ) -> Result<&'a Handler, Error> {
        let by_method: Vec<&Handler> = route
            .handlers
            .iter()
            .filter(|h| &h.method == method)
            .collect();
        if by_method.is_empty() {
            return Err(Error::new_method_not_allowed(Self::allowed_methods(route)));
        }

        let by_content_type: Vec<&Handler> = by_method
            .into_iter()
            .filter(|h| media::content_type_matches(&h.consumes, content_type))
            .collect();
        if by_content_type.is_empty() {
            return Err(Error::new(Kind::MediaTypeUnsupported));
        }

        if accept.is_empty() {
            // No Accept header: any surviving handler is acceptable; pick
            // deterministically (first registered).
            return Ok(by_content_type[0]);
        }

        // Each handler's own best score against any accept entry, before
        // comparing across handlers — otherwise one handler matching two
        // accept entries at the same top score looks like a tie with
        // itself.
        let mut handler_scores: Vec<(&Handler, Score)> = Vec::new();
        for h in by_content_type {
            let mut best_for_handler: Option<Score> = None;
            for entry in accept {
                if let Some(score) = Score::compute(&h.produces, entry) {
                    if score.is_zero() {
                        continue;
                    }
                    best_for_handler = Some(match best_for_handler {
                        None => score,
                        Some(existing) if score.partial_cmp(&existing) == Some(std::cmp::Ordering::Greater) => score,
                        Some(existing) => existing,
                    });
                }
            }
            if let Some(score) = best_for_handler {
                handler_scores.push((h, score));
            }
        }

        let mut best: Option<(&Handler, Score)> = None;
        let mut tied = false;
        for (h, score) in handler_scores {
            match &best {
                None => best = Some((h, score)),
                Some((_, best_score)) => match score.partial_cmp(best_score) {
                    Some(std::cmp::Ordering::Greater) => {
                        best = Some((h, score));
                        tied = false;
                    }
                    Some(std::cmp::Ordering::Equal) => {
                        tied = true;
                    }
                    _ => {}
                },
            }
        }

        match best {
            None => Err(Error::new(Kind::MediaTypeNotAccepted)),
            Some(_) if tied => Err(Error::new(Kind::AmbiguousHandler)),
            Some((h, _)) => Ok(h),
        }
    }

    /// The distinct methods registered on `route`, for the `Allow` header
    /// on a 405 response.
    pub fn allowed_methods(route: &Route) -> Vec<Method> {
        let mut methods = Vec::new();
        for h in &route.handlers {
            if !methods.contains(&h.method) {
                methods.push(h.method.clone());
            }
        }
        methods
    }
}

fn pattern_error_to_route_error(e: PatternError) -> Error {
    let _ = e;
    Error::new(Kind::RoutePatternInvalid)
}
