//! **Structural diff for XML documents with unordered tree matching.**
//!
//! `xmldiff` compares two XML documents by content rather than by line:
//! sibling order is ignored, subtrees are paired by a minimum-cost edit
//! distance, and the result is an edit script that marks deletions,
//! insertions and updates inline as processing instructions.
//!
//! ## How it works
//!
//! Both documents are parsed into arena forests ([`forest`]) where every
//! node carries an order-independent rollup hash. Subtrees with equal
//! hashes are matched outright; the remainder is paired bottom-up by the
//! [`diff`] engine, which solves a minimum-cost assignment per group of
//! same-tag siblings. For wide fan-outs an optional sampling mode trades
//! optimality for bounded running time. The [`writer`] then renders the
//! annotated trees as an edit script.
//!
//! ## Core modules
//!
//! - **[`parser`]**: Builds a hashed forest from XML text or a file.
//! - **[`forest`]**: The arena store, node handles and match states.
//! - **[`diff`]**: Cost model, assignment solver and matching engine.
//! - **[`writer`]**: Edit script rendering.
//! - **[`pipeline`]**: File-to-file convenience entry point.
//!
//! ## Getting started
//!
//! ```no_run
//! use xmldiff::{diff_paths, DiffConfig, DiffOutcome};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let outcome = diff_paths("old.xml", "new.xml", "delta.xml", DiffConfig::default())?;
//!     if outcome == DiffOutcome::Identical {
//!         println!("No difference!");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For finer control parse and diff in separate steps:
//!
//! ```
//! use xmldiff::{parse_str, DiffEngine};
//!
//! # fn main() -> xmldiff::Result<()> {
//! let mut left = parse_str("<a><b>1</b><c/></a>")?;
//! let mut right = parse_str("<a><c/><b>2</b></a>")?;
//! let changed = DiffEngine::new().diff(&mut left, &mut right)?;
//! assert!(changed);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::unwrap_used)]
#![allow(
    // Cost arithmetic mixes u32 cells with f64 rejection ratios; all
    // values are bounded well below the lossy ranges.
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]

pub mod diff;
pub mod error;
pub mod forest;
pub mod parser;
pub mod pipeline;
pub mod utils;
pub mod writer;

pub use diff::{DiffConfig, DiffEngine, MatchMode};
pub use error::{Result, XmlDiffError};
pub use forest::{ForestStore, MatchState, NodeId};
pub use parser::{parse_file, parse_str, TreeParser};
pub use pipeline::{diff_paths, DiffOutcome};
pub use writer::DiffWriter;
