//! Arena-based storage for parsed XML documents.
//!
//! One [`ForestStore`] holds all nodes of one document: elements, text
//! runs and attributes, each identified by a forest-local [`NodeId`].
//! The parser appends nodes and rollup hashes; the diff engine later
//! writes one [`MatchState`] annotation per node. The tree structure
//! itself is immutable after parsing.

mod node;
mod store;

pub use node::{MatchState, NodeId, NodeKind, TagId};
pub use store::ForestStore;
