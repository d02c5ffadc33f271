//! Tree-matching engine.
//!
//! The engine pairs the nodes of two parsed forests bottom-up. The
//! cost model lives in [`distance`], the exact assignment solver in
//! [`assignment`], the distance cache in [`memo`], and the
//! annotation-writing pass in [`engine`].

mod assignment;
mod config;
mod distance;
mod engine;
mod memo;

pub use assignment::{solve, Assignment, CostMatrix, INFINITE_COST};
pub use config::{DiffConfig, MatchMode};
pub use engine::DiffEngine;
pub use memo::MatchMemo;
