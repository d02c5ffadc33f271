//! Configuration for the diff engine.
//!
//! All tuning knobs live in one immutable value handed to the engine at
//! construction; nothing is process-global.

use crate::error::{Result, XmlDiffError};

/// Strategy used when a same-tag sibling group needs cost-based pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Build the full pairwise cost matrix and solve the assignment
    /// exactly. Minimum edit distance, slowest on wide fan-out.
    #[default]
    Exact,
    /// Probe a bounded random sample of candidates and accept pairings
    /// below a threshold. Bounded running time, not guaranteed optimal.
    Sampling,
}

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Assignment strategy for large same-tag groups.
    pub mode: MatchMode,
    /// Rejection ratio in (0, 1]: a candidate pairing whose distance
    /// reaches this fraction of the combined delete/insert cost is
    /// treated as unmatchable. With a ratio below 1.0 the rejection is
    /// applied per matrix cell even in exact mode, so the solved
    /// assignment is only locally optimal then.
    pub reject_ratio: f64,
    /// Number of random probes drawn by sampling mode before the sweep
    /// phase. sqrt(group size) is a safe choice; 3 works well.
    pub sample_count: usize,
    /// Seed for the sampling RNG. Fixed and explicit so runs are
    /// reproducible; never derived from the clock.
    pub seed: u64,
    /// Maximum element nesting accepted by the parser. Bounds the
    /// recursion depth of the matching pass.
    pub max_depth: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::Exact,
            reject_ratio: 1.0,
            sample_count: 3,
            seed: 0x9e37_79b9_7f4a_7c15,
            max_depth: 512,
        }
    }
}

impl DiffConfig {
    /// Configuration for a mode with its conventional default ratio:
    /// 1.0 for exact, 0.3 for sampling.
    pub fn for_mode(mode: MatchMode) -> Self {
        let reject_ratio = match mode {
            MatchMode::Exact => 1.0,
            MatchMode::Sampling => 0.3,
        };
        Self {
            mode,
            reject_ratio,
            ..Self::default()
        }
    }

    /// Override the rejection ratio.
    pub fn with_reject_ratio(mut self, ratio: f64) -> Self {
        self.reject_ratio = ratio;
        self
    }

    /// Override the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check value ranges. Called by the engine constructor.
    pub fn validate(&self) -> Result<()> {
        if !(self.reject_ratio > 0.0 && self.reject_ratio <= 1.0) {
            return Err(XmlDiffError::config(format!(
                "rejection ratio must be in (0, 1], got {}",
                self.reject_ratio
            )));
        }
        if self.sample_count == 0 {
            return Err(XmlDiffError::config("sample count must be at least 1"));
        }
        if self.max_depth == 0 {
            return Err(XmlDiffError::config("depth limit must be at least 1"));
        }
        Ok(())
    }
}
