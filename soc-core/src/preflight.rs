// soc-core/src/preflight.rs
//! Preflight stage: prepare an operator for strength computation
//!
//! Runs before every measure:
//! - Square / block-size validation and CSR normalisation
//! - Explicit-zero removal (optional, the evolution measure needs it)
//! - Diagonal diagnostics (missing, zero, negative entries)
//!
//! Zero or missing diagonals are not errors: each measure resolves them to a
//! documented value. The statistics are logged so a degenerate input is easy
//! to spot.

use sprs::CsMat;

use crate::error::StrengthResult;
use crate::sparse::SparseGraph;

/// Configuration for the preflight stage
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Uniform block size of the operator (1 for scalar problems)
    pub block_size: usize,

    /// Remove explicitly stored zeros before the measure runs
    pub drop_explicit_zeros: bool,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            block_size: 1,
            drop_explicit_zeros: false,
        }
    }
}

/// Statistics about the diagonal of the operator
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalStats {
    pub missing: usize,
    pub zero: usize,
    pub negative: usize,
    pub min_abs: f64,
    pub max_abs: f64,
}

impl DiagonalStats {
    pub fn is_degenerate(&self) -> bool {
        self.missing > 0 || self.zero > 0
    }

    /// Pretty-print statistics
    pub fn summary(&self) -> String {
        format!(
            "missing={}, zero={}, negative={}, |d| in [{:.4e}, {:.4e}]",
            self.missing, self.zero, self.negative, self.min_abs, self.max_abs
        )
    }
}

/// Output of the preflight stage
pub struct PreflightOutput {
    /// Validated CSR view with sorted rows
    pub graph: SparseGraph,

    /// Explicit zeros found in the input
    pub explicit_zeros: usize,

    pub diagonal_stats: DiagonalStats,
}

/// Preflight stage executor
pub struct PreflightStage {
    config: PreflightConfig,
}

impl PreflightStage {
    pub fn new(config: PreflightConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PreflightConfig::default())
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self::new(PreflightConfig {
            block_size,
            ..PreflightConfig::default()
        })
    }

    /// Execute preflight checks and transformations
    pub fn execute(&self, a: &CsMat<f64>) -> StrengthResult<PreflightOutput> {
        log::info!("╔═══════════════════════════════════════════════════════╗");
        log::info!("║  PREFLIGHT                                            ║");
        log::info!("╚═══════════════════════════════════════════════════════╝");
        log::info!(
            "🔍 Analyzing {}x{} operator with {} non-zeros",
            a.rows(),
            a.cols(),
            a.nnz()
        );

        // STEP 1: layout and shape
        log::debug!("Step 1/3: Validating layout...");
        let graph = SparseGraph::from_matrix(a)?.with_block_size(self.config.block_size)?;

        // STEP 2: explicit zeros
        log::debug!("Step 2/3: Scanning explicit zeros...");
        let explicit_zeros = graph.data().iter().filter(|&&v| v == 0.0).count();
        let graph = if explicit_zeros > 0 && self.config.drop_explicit_zeros {
            log::info!("  🔧 Dropping {} explicit zeros", explicit_zeros);
            graph.without_explicit_zeros()
        } else {
            if explicit_zeros > 0 {
                log::debug!("  Keeping {} explicit zeros", explicit_zeros);
            }
            graph
        };

        // STEP 3: diagonal diagnostics
        log::debug!("Step 3/3: Checking diagonal...");
        let diagonal_stats = self.compute_diagonal_stats(&graph);
        if diagonal_stats.is_degenerate() {
            log::warn!(
                "  ⚠️  Degenerate diagonal: {}",
                diagonal_stats.summary()
            );
        } else {
            log::info!("  ✓ Diagonal: {}", diagonal_stats.summary());
        }

        log::info!(
            "  • Block size: {} ({} supernodes)",
            graph.block_size(),
            graph.num_nodes()
        );

        Ok(PreflightOutput {
            graph,
            explicit_zeros,
            diagonal_stats,
        })
    }

    pub(crate) fn compute_diagonal_stats(&self, graph: &SparseGraph) -> DiagonalStats {
        let mut stats = DiagonalStats {
            missing: 0,
            zero: 0,
            negative: 0,
            min_abs: f64::INFINITY,
            max_abs: 0.0,
        };
        for i in 0..graph.rows() {
            match graph.diagonal_index(i) {
                None => stats.missing += 1,
                Some(k) => {
                    let d = graph.value_at(k);
                    if d == 0.0 {
                        stats.zero += 1;
                    } else if d < 0.0 {
                        stats.negative += 1;
                    }
                    stats.min_abs = stats.min_abs.min(d.abs());
                    stats.max_abs = stats.max_abs.max(d.abs());
                }
            }
        }
        if stats.min_abs == f64::INFINITY {
            stats.min_abs = 0.0;
        }
        stats
    }
}
