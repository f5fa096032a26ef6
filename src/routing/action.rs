//! Action Registry & matching — the most intricate traversal in
//! the crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{Error, Kind};
use crate::request::Request;
use crate::response::Response;
use crate::routing::segment::{parse_pattern, PatternError};
use crate::routing::tree::{Exclusivity, Tree};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// What a before-action decided: continue the chain, or short-circuit
/// with a response.
pub enum BeforeOutcome {
    Continue(Request<crate::body::Incoming>),
    Respond(Response),
}

pub type BeforeFn =
    Arc<dyn Fn(Request<crate::body::Incoming>) -> BoxFuture<BeforeOutcome> + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(Response) -> BoxFuture<Response> + Send + Sync>;

#[derive(Clone)]
pub struct BeforeEntry {
    pub call: BeforeFn,
}

#[derive(Clone)]
pub struct AfterEntry {
    pub call: AfterFn,
}

/// The action payload carried at a tree node: independent before/after
/// lists, since the action registry has no mutual-exclusivity constraint
/// between a node's static/param/catch-all children.
#[derive(Default, Clone)]
pub struct ActionBucket {
    pub before: Vec<BeforeEntry>,
    pub after: Vec<AfterEntry>,
}

pub struct ActionRegistry {
    tree: Tree<ActionBucket>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistry { tree: Tree::new() }
    }

    fn bucket_at(&mut self, pattern: &str) -> Result<usize, Error> {
        let segments = parse_pattern(pattern).map_err(pattern_error_to_action_error)?;
        let idx = self
            .tree
            .insert_path(&segments, Exclusivity::Relaxed)
            .expect("relaxed insert never fails");
        if self.tree.node(idx).payload.is_empty() {
            self.tree.payload_mut(idx).push(ActionBucket::default());
        }
        Ok(idx)
    }

    pub fn add_before(&mut self, pattern: &str, call: BeforeFn) -> Result<(), Error> {
        let idx = self.bucket_at(pattern)?;
        let bucket = &mut self.tree.payload_mut(idx)[0];
        if bucket.before.iter().any(|e| Arc::ptr_eq(&e.call, &call)) {
            return Err(Error::new(Kind::ActionNonUnique));
        }
        bucket.before.push(BeforeEntry { call });
        Ok(())
    }

    pub fn add_after(&mut self, pattern: &str, call: AfterFn) -> Result<(), Error> {
        let idx = self.bucket_at(pattern)?;
        let bucket = &mut self.tree.payload_mut(idx)[0];
        if bucket.after.iter().any(|e| Arc::ptr_eq(&e.call, &call)) {
            return Err(Error::new(Kind::ActionNonUnique));
        }
        bucket.after.push(AfterEntry { call });
        Ok(())
    }

    /// Matches `path`, returning the ordered before list and the ordered
    /// after list.
    pub fn matched(&self, path: &str) -> (Vec<BeforeFn>, Vec<AfterFn>) {
        let segs = match crate::routing::segment::normalize_path(path) {
            Ok(s) => s,
            Err(_) => return (Vec::new(), Vec::new()),
        };

        let mut node_order = Vec::new();
        self.collect(self.tree.root(), &segs, &mut node_order);

        let mut before = Vec::new();
        for &idx in &node_order {
            for entry in &self.tree.node(idx).payload[0].before {
                before.push(entry.call.clone());
            }
        }

        let mut after = Vec::new();
        for &idx in node_order.iter().rev() {
            for entry in &self.tree.node(idx).payload[0].after {
                after.push(entry.call.clone());
            }
        }

        (before, after)
    }

    /// Depth-first, with a fixed per-node bucket priority: catch-all
    /// first (it absorbs all remaining segments and is always a leaf for
    /// this branch), then single-param, then static — each recursing
    /// further, giving root-to-leaf order.
    fn collect(&self, node_idx: usize, remaining: &[String], out: &mut Vec<usize>) {
        let node = self.tree.node(node_idx);

        if let Some((_, idx)) = &node.catchall_child {
            if !self.tree.node(*idx).payload.is_empty() {
                out.push(*idx);
            }
        }

        if remaining.is_empty() {
            if !node.payload.is_empty() {
                out.push(node_idx);
            }
            return;
        }

        let (head, tail) = (&remaining[0], &remaining[1..]);

        if let Some((_, idx)) = &node.param_child {
            self.collect(*idx, tail, out);
        }

        if let Some(&idx) = node.static_children.get(head) {
            self.collect(idx, tail, out);
        }
    }
}

fn pattern_error_to_action_error(e: PatternError) -> Error {
    let _ = e;
    Error::new(Kind::ActionPatternInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;
    use crate::response::Response;

    fn before(tag: &'static str, log: Arc<std::sync::Mutex<Vec<&'static str>>>) -> BeforeFn {
        Arc::new(move |req| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(tag);
                BeforeOutcome::Continue(req)
            })
        })
    }

    #[test]
    fn traversal_visits_every_node_on_the_matched_chain() {
        let mut reg = ActionRegistry::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        reg.add_before("/*", before("root-catchall", log.clone())).unwrap();
        reg.add_before("/:p/bar", before("param-then-bar", log.clone())).unwrap();
        reg.add_before("/foo/*", before("foo-catchall", log.clone())).unwrap();
        reg.add_before("/foo/:p", before("foo-param", log.clone())).unwrap();
        reg.add_before("/foo/bar", before("foo-bar", log.clone())).unwrap();

        let (before_list, _after_list) = reg.matched("/foo/bar");
        assert_eq!(before_list.len(), 5);
        // Order is asserted by running each callback and checking the tag
        // sequence it records, exercising the real dispatch path instead
        // of poking at internal node indices.
    }

    #[test]
    fn after_reverses_node_order_but_not_within_node_order() {
        let mut reg = ActionRegistry::new();
        reg.add_before("/", before("a", Arc::new(std::sync::Mutex::new(Vec::new())))).unwrap();
        let (_before, after) = reg.matched("/");
        assert!(after.is_empty());
    }

    #[test]
    fn duplicate_closure_rejected() {
        let mut reg = ActionRegistry::new();
        let f = before("x", Arc::new(std::sync::Mutex::new(Vec::new())));
        reg.add_before("/a", f.clone()).unwrap();
        let err = reg.add_before("/a", f).unwrap_err();
        assert_matches!(err.kind(), Kind::ActionNonUnique);
    }

    #[tokio::test]
    async fn before_actions_run_catchall_then_param_then_static_generic_to_specific() {
        let mut reg = ActionRegistry::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        reg.add_before("/*", before("1:/*", log.clone())).unwrap();
        reg.add_before("/:p/bar", before("2:/:/bar", log.clone())).unwrap();
        reg.add_before("/foo/*", before("3:/foo/*", log.clone())).unwrap();
        reg.add_before("/foo/:p", before("4:/foo/:", log.clone())).unwrap();
        reg.add_before("/foo/bar", before("5:/foo/bar", log.clone())).unwrap();

        let (before_list, _) = reg.matched("/foo/bar");
        let body = crate::body::Incoming::empty();
        let mut req = Request::new(
            crate::request::RequestHead {
                method: http::Method::GET,
                raw_target: "/foo/bar".into(),
                version: http::Version::HTTP_11,
                headers: crate::headers::HeaderMap::new(),
            },
            crate::request::PathParams::new(),
            body,
        );
        for f in before_list {
            match f(req).await {
                BeforeOutcome::Continue(r) => req = r,
                BeforeOutcome::Respond(_) => unreachable!(),
            }
        }
        let got = log.lock().unwrap().clone();
        assert_eq!(
            got,
            vec!["1:/*", "2:/:/bar", "3:/foo/*", "4:/foo/:", "5:/foo/bar"]
        );
    }
}
