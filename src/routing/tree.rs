//! The segment tree shared by the route registry and the action
//! registry.
//!
//! Arena-allocated nodes addressed by index, so that a route and its
//! descendants can be walked and mutated without fighting the borrow
//! checker over parent/child references.

use std::collections::HashMap;

use super::segment::Segment;

#[derive(Default)]
pub struct Node<P> {
    pub static_children: HashMap<String, usize>,
    pub param_child: Option<(String, usize)>,
    pub catchall_child: Option<(String, usize)>,
    pub payload: Vec<P>,
}

impl<P> Node<P> {
    fn new() -> Self {
        Node {
            static_children: HashMap::new(),
            param_child: None,
            catchall_child: None,
            payload: Vec::new(),
        }
    }
}

/// Whether the structural mutual-exclusivity rule ("at a node, either
/// static children or a param child, never both") is enforced on
/// insert. The route registry enforces it; the action registry does
/// not.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Exclusivity {
    Enforced,
    Relaxed,
}

pub struct Tree<P> {
    nodes: Vec<Node<P>>,
}

/// Returned by a matched traversal: the index chain from root to the
/// deepest matched node, and the parameters bound along the way. Used by
/// the action registry to replay the root-to-leaf order for before/after
/// traversal.
pub struct Matched {
    pub node_chain: Vec<usize>,
    pub params: Vec<(String, String)>,
}

impl<P> Tree<P> {
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node::new()],
        }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, idx: usize) -> &Node<P> {
        &self.nodes[idx]
    }

    fn alloc(&mut self) -> usize {
        self.nodes.push(Node::new());
        self.nodes.len() - 1
    }

    /// Walks/creates the path described by `segments`, returning the
    /// terminal node index. Returns `Err(())` if `exclusivity` is
    /// `Enforced` and the walk would violate the static/param mutual
    /// exclusivity rule, or would place a catch-all child alongside an
    /// existing route payload on the same node (the `/src` vs
    /// `/src/*path` boundary case).
    pub fn insert_path(
        &mut self,
        segments: &[Segment],
        exclusivity: Exclusivity,
    ) -> Result<usize, ()> {
        let mut cur = self.root();
        for seg in segments {
            cur = match seg {
                Segment::Static(name) => {
                    if exclusivity == Exclusivity::Enforced && self.nodes[cur].param_child.is_some()
                    {
                        return Err(());
                    }
                    if let Some(&idx) = self.nodes[cur].static_children.get(name) {
                        idx
                    } else {
                        let idx = self.alloc();
                        self.nodes[cur].static_children.insert(name.clone(), idx);
                        idx
                    }
                }
                Segment::Param(name) => {
                    if exclusivity == Exclusivity::Enforced
                        && !self.nodes[cur].static_children.is_empty()
                    {
                        return Err(());
                    }
                    if let Some((existing_name, idx)) = &self.nodes[cur].param_child {
                        if existing_name != name {
                            return Err(());
                        }
                        *idx
                    } else {
                        let idx = self.alloc();
                        self.nodes[cur].param_child = Some((name.clone(), idx));
                        idx
                    }
                }
                Segment::CatchAll(name) => {
                    if exclusivity == Exclusivity::Enforced && !self.nodes[cur].payload.is_empty() {
                        return Err(());
                    }
                    if let Some((existing_name, idx)) = &self.nodes[cur].catchall_child {
                        if existing_name != name {
                            return Err(());
                        }
                        *idx
                    } else {
                        let idx = self.alloc();
                        self.nodes[cur].catchall_child = Some((name.clone(), idx));
                        idx
                    }
                }
            };
        }
        if exclusivity == Exclusivity::Enforced
            && segments
                .last()
                .map(|s| !matches!(s, Segment::CatchAll(_)))
                .unwrap_or(true)
            && self.nodes[cur].catchall_child.is_some()
        {
            return Err(());
        }
        Ok(cur)
    }

    /// Matches `path_segments` left-to-right: static first, then
    /// single-param, then catch-all. Returns every node visited
    /// along the winning path (root to leaf) plus bound parameters.
    pub fn match_path(&self, path_segments: &[String]) -> Option<Matched> {
        self.match_from(self.root(), path_segments, Vec::new(), Vec::new())
    }

    fn match_from(
        &self,
        node_idx: usize,
        remaining: &[String],
        mut chain: Vec<usize>,
        mut params: Vec<(String, String)>,
    ) -> Option<Matched> {
        chain.push(node_idx);
        let node = &self.nodes[node_idx];

        if remaining.is_empty() {
            if !node.payload.is_empty() {
                return Some(Matched {
                    node_chain: chain,
                    params,
                });
            }
            // A catch-all may still match the empty remainder (`/*p`
            // matches `/` with p == "/").
            if let Some((name, idx)) = &node.catchall_child {
                let mut chain2 = chain.clone();
                chain2.push(*idx);
                let mut params2 = params.clone();
                params2.push((name.clone(), "/".to_owned()));
                if !self.nodes[*idx].payload.is_empty() {
                    return Some(Matched {
                        node_chain: chain2,
                        params: params2,
                    });
                }
            }
            return None;
        }

        let (head, tail) = (&remaining[0], &remaining[1..]);

        if let Some(&idx) = node.static_children.get(head) {
            if let Some(m) = self.match_from(idx, tail, chain.clone(), params.clone()) {
                return Some(m);
            }
        }

        if let Some((name, idx)) = &node.param_child {
            let mut params2 = params.clone();
            params2.push((name.clone(), head.clone()));
            if let Some(m) = self.match_from(*idx, tail, chain.clone(), params2) {
                return Some(m);
            }
        }

        if let Some((name, idx)) = &node.catchall_child {
            chain.push(*idx);
            let value = format!("/{}", remaining.join("/"));
            params.push((name.clone(), value));
            return Some(Matched {
                node_chain: chain,
                params,
            });
        }

        None
    }

    pub fn payload_mut(&mut self, idx: usize) -> &mut Vec<P> {
        &mut self.nodes[idx].payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::segment::parse_pattern;

    #[test]
    fn static_and_param_exclusivity_enforced_for_routes() {
        let mut tree: Tree<u32> = Tree::new();
        let segs_static = parse_pattern("/foo").unwrap();
        tree.insert_path(&segs_static, Exclusivity::Enforced).unwrap();
        let segs_param = parse_pattern("/:name").unwrap();
        assert!(tree.insert_path(&segs_param, Exclusivity::Enforced).is_err());
    }

    #[test]
    fn relaxed_allows_overlap_for_actions() {
        let mut tree: Tree<u32> = Tree::new();
        let segs_static = parse_pattern("/foo").unwrap();
        tree.insert_path(&segs_static, Exclusivity::Relaxed).unwrap();
        let segs_param = parse_pattern("/:name").unwrap();
        assert!(tree.insert_path(&segs_param, Exclusivity::Relaxed).is_ok());
    }

    #[test]
    fn src_and_catchall_conflict() {
        let mut tree: Tree<u32> = Tree::new();
        let src = parse_pattern("/src").unwrap();
        let idx = tree.insert_path(&src, Exclusivity::Enforced).unwrap();
        tree.payload_mut(idx).push(1);
        let catchall = parse_pattern("/src/*path").unwrap();
        assert!(tree.insert_path(&catchall, Exclusivity::Enforced).is_err());
    }

    #[test]
    fn catchall_matches_root_with_empty_prefix() {
        let mut tree: Tree<u32> = Tree::new();
        let segs = parse_pattern("/*p").unwrap();
        let idx = tree.insert_path(&segs, Exclusivity::Enforced).unwrap();
        tree.payload_mut(idx).push(1);
        let m = tree.match_path(&[]).unwrap();
        assert_eq!(m.params, vec![("p".to_owned(), "/".to_owned())]);
    }
}
