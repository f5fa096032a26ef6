//! The segment tree (C), route registry (D), and action registry (E).

pub mod action;
pub mod route;
pub mod segment;
pub mod tree;

pub use action::ActionRegistry;
pub use route::{Handler, Route, RouteRegistry};
