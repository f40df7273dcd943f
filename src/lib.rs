//! # soc-graph
//!
//! Strength-of-connection graphs for algebraic multigrid.
//!
//! Given a sparse square operator A, every measure builds a sparse,
//! non-negative matrix S on the same node set in which a large `S[i, j]`
//! means node i strongly depends on node j. All outputs share one contract:
//! each non-empty row peaks at exactly 1 and a diagonal entry is present
//! wherever A has a nonzero diagonal.
//!
//! Measures:
//! - `pairwise`: pairwise-aggregation compatibility over a mirrored traversal
//! - `evolution`: relaxation-evolved point sources scored against B
//! - `distance`: coordinate distance, affinity, algebraic distance
//! - `energy`: energy change of approximate inverse columns
//! - `classical`: Ruge-Stüben and symmetric thresholds
//!
//! `StrengthBuilder` is the usual entry point:
//!
//! ```ignore
//! use soc_graph::builder::StrengthBuilder;
//! use soc_graph::graph::MeasureKind;
//!
//! let s = StrengthBuilder::new()
//!     .with_measure(MeasureKind::Pairwise)
//!     .build(&a)?;
//! assert!(s.verify_contract(1e-12).is_valid);
//! ```

pub mod builder;
pub mod classical;
pub mod classify;
pub mod distance;
pub mod energy;
pub mod evolution;
pub mod graph;
pub mod pairwise;
pub mod scoring;

pub use soc_core;
pub use soc_core::{Advisory, BlockNorm, SparseGraph, StrengthError, StrengthResult};

#[cfg(test)]
mod tests;
