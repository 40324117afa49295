//! Stack collapsing: unique call paths weighted by sample count

pub mod path_tree;

pub use path_tree::{NodeId, PathNode, PathTree};
