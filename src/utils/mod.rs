//! Shared utilities.

pub mod hash;

pub use hash::content_hash;
