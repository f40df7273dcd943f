//! Strength-of-connection builder.
//!
//! `StrengthBuilder` collects the measure and its options, runs the preflight
//! stage on the operator and dispatches to the measure driver:
//!
//! ```ignore
//! let graph = StrengthBuilder::new()
//!     .with_measure(MeasureKind::Evolution)
//!     .with_theta(4.0)
//!     .with_steps(4)
//!     .build(&a)?;
//! ```
//!
//! `theta` and `norm` default per measure when left unset.

use log::{debug, info};
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::collections::HashMap;
use std::fmt;

use soc_core::blocks::BlockNorm;
use soc_core::preflight::{PreflightConfig, PreflightStage};
use soc_core::{StrengthError, StrengthResult};

use crate::classical::{ClassicalParams, SymmetricParams, classical_strength, symmetric_strength};
use crate::distance::{
    DistanceParams, DropMode, PNorm, RelaxationParams, affinity_distance, algebraic_distance,
    distance_strength,
};
use crate::energy::{EnergyParams, energy_strength};
use crate::evolution::{EvolutionParams, ProjectionType, evolution_strength};
use crate::graph::{MeasureKind, StrengthGraph};
use crate::pairwise::{PairwiseFallback, PairwiseParams, pairwise_strength};
use crate::scoring::default_tolerance;

/// Near-null-space vectors for the evolution measure
#[derive(Debug, Clone, PartialEq)]
pub enum NearNullSpace {
    Real(DMatrix<f64>),
    Complex(DMatrix<Complex64>),
}

impl NearNullSpace {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            NearNullSpace::Real(b) => b.shape(),
            NearNullSpace::Complex(b) => b.shape(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrengthBuilder {
    pub(crate) measure: MeasureKind,

    // drop tolerance (theta or epsilon), measure default when None
    pub(crate) theta: Option<f64>,
    pub(crate) block_size: usize,

    // pairwise
    pub(crate) reciprocal: bool,
    pub(crate) fallback: PairwiseFallback,

    // evolution, energy
    pub(crate) steps: usize,
    pub(crate) projection: ProjectionType,
    pub(crate) block_flag: bool,
    pub(crate) symmetrize: bool,
    pub(crate) tolerance: f64,
    pub near_null_space: Option<NearNullSpace>,

    /// Block reduction: `abs` for classical, `min` for evolution when None
    pub(crate) norm: Option<BlockNorm>,
    /// classical: reduce blocks before thresholding
    pub(crate) block: bool,

    // coordinate distance
    pub(crate) drop_mode: DropMode,
    pub coordinates: Option<DMatrix<f64>>,

    // relaxation vectors (affinity, algebraic)
    pub(crate) alpha: f64,
    pub(crate) vectors: usize,
    pub(crate) iterations: usize,
    pub(crate) p: PNorm,
    pub(crate) seed: u64,
}

impl Default for StrengthBuilder {
    fn default() -> Self {
        debug!("Creating StrengthBuilder with default parameters");
        Self {
            measure: MeasureKind::Classical,
            theta: None,
            block_size: 1,
            reciprocal: true,
            fallback: PairwiseFallback::Zero,
            steps: 2,
            projection: ProjectionType::L2,
            block_flag: false,
            symmetrize: true,
            tolerance: default_tolerance(),
            near_null_space: None,
            norm: None,
            block: true,
            drop_mode: DropMode::Relative,
            coordinates: None,
            alpha: 0.5,
            vectors: 5,
            iterations: 20,
            p: PNorm::Finite(2.0),
            seed: 42,
        }
    }
}

impl StrengthBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measure(mut self, measure: MeasureKind) -> Self {
        self.measure = measure;
        self
    }

    /// Drop tolerance: theta for the threshold measures, epsilon for the
    /// distance-like ones
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = Some(theta);
        self
    }

    /// Degrees of freedom per node
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_reciprocal(mut self, reciprocal: bool) -> Self {
        self.reciprocal = reciprocal;
        self
    }

    pub fn with_fallback(mut self, fallback: PairwiseFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionType) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_block_flag(mut self, block_flag: bool) -> Self {
        self.block_flag = block_flag;
        self
    }

    pub fn with_symmetrize(mut self, symmetrize: bool) -> Self {
        self.symmetrize = symmetrize;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_near_null_space(mut self, b: DMatrix<f64>) -> Self {
        self.near_null_space = Some(NearNullSpace::Real(b));
        self
    }

    pub fn with_complex_near_null_space(mut self, b: DMatrix<Complex64>) -> Self {
        self.near_null_space = Some(NearNullSpace::Complex(b));
        self
    }

    pub fn with_norm(mut self, norm: BlockNorm) -> Self {
        self.norm = Some(norm);
        self
    }

    pub fn with_block_reduction(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    pub fn with_drop_mode(mut self, drop_mode: DropMode) -> Self {
        self.drop_mode = drop_mode;
        self
    }

    pub fn with_coordinates(mut self, coordinates: DMatrix<f64>) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Relaxation test vectors: Jacobi weight, number of vectors, sweeps
    pub fn with_relaxation(mut self, alpha: f64, vectors: usize, iterations: usize) -> Self {
        self.alpha = alpha;
        self.vectors = vectors;
        self.iterations = iterations;
        self
    }

    pub fn with_p_norm(mut self, p: PNorm) -> Self {
        self.p = p;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn theta(&self) -> f64 {
        self.theta.unwrap_or_else(|| self.measure.default_theta())
    }

    pub fn measure(&self) -> MeasureKind {
        self.measure
    }

    pub fn classical_params(&self) -> ClassicalParams {
        ClassicalParams {
            theta: self.theta(),
            block: self.block,
            norm: self.norm.unwrap_or(BlockNorm::Abs),
        }
    }

    pub fn pairwise_params(&self) -> PairwiseParams {
        PairwiseParams {
            theta: self.theta(),
            reciprocal: self.reciprocal,
            fallback: self.fallback,
        }
    }

    pub fn evolution_params(&self) -> EvolutionParams {
        EvolutionParams {
            epsilon: self.theta(),
            steps: self.steps,
            projection: self.projection,
            block_flag: self.block_flag,
            symmetrize: self.symmetrize,
            norm: self.norm.unwrap_or(BlockNorm::Min),
            tolerance: self.tolerance,
        }
    }

    pub fn energy_params(&self) -> EnergyParams {
        EnergyParams {
            theta: self.theta(),
            steps: self.steps,
        }
    }

    pub fn relaxation_params(&self) -> RelaxationParams {
        RelaxationParams {
            alpha: self.alpha,
            vectors: self.vectors,
            iterations: self.iterations,
            epsilon: self.theta(),
            seed: self.seed,
        }
    }

    /// Build the strength graph of `a`.
    pub fn build(&self, a: &CsMat<f64>) -> StrengthResult<StrengthGraph> {
        info!("Building {} strength graph: {}", self.measure, self);
        let start = std::time::Instant::now();

        let preflight = PreflightStage::new(PreflightConfig {
            block_size: self.block_size,
            drop_explicit_zeros: matches!(
                self.measure,
                MeasureKind::Evolution | MeasureKind::Affinity | MeasureKind::Algebraic
            ),
        })
        .execute(a)?;
        let graph = preflight.graph;

        let result = match self.measure {
            MeasureKind::Classical => classical_strength(&graph, &self.classical_params()),
            MeasureKind::Symmetric => symmetric_strength(
                &graph,
                &SymmetricParams {
                    theta: self.theta(),
                },
            ),
            MeasureKind::Pairwise => pairwise_strength(&graph, &self.pairwise_params()),
            MeasureKind::Evolution => {
                let params = self.evolution_params();
                match &self.near_null_space {
                    None => evolution_strength::<f64>(&graph, None, &params),
                    Some(NearNullSpace::Real(b)) => evolution_strength(&graph, Some(b), &params),
                    Some(NearNullSpace::Complex(b)) => {
                        evolution_strength(&graph, Some(b), &params)
                    }
                }
            }
            MeasureKind::Distance => {
                let coordinates = self.coordinates.as_ref().ok_or_else(|| {
                    StrengthError::invalid("distance measure requires node coordinates")
                })?;
                distance_strength(
                    &graph,
                    coordinates,
                    &DistanceParams {
                        theta: self.theta(),
                        drop: self.drop_mode,
                    },
                )
            }
            MeasureKind::Affinity => affinity_distance(&graph, &self.relaxation_params()),
            MeasureKind::Algebraic => {
                algebraic_distance(&graph, &self.relaxation_params(), self.p)
            }
            MeasureKind::Energy => energy_strength(&graph, &self.energy_params()),
        }?;

        info!(
            "Strength graph built in {:?}: {}x{} with {} non-zeros, {} advisories",
            start.elapsed(),
            result.nnodes,
            result.nnodes,
            result.nnz(),
            result.advisories.len()
        );
        Ok(result)
    }
}

impl fmt::Display for StrengthBuilder {
    /// Format StrengthBuilder as comma-separated key=value pairs (cookie-style).
    ///
    /// Output format: "key1=value1, key2=value2, ..."
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "measure={}, \
             theta={}, \
             block_size={}, \
             reciprocal={}, \
             fallback={}, \
             steps={}, \
             proj_type={}, \
             block_flag={}, \
             symmetrize={}, \
             tolerance={}, \
             near_null_space={}, \
             norm={}, \
             block={}, \
             drop_mode={}, \
             coordinates={}, \
             alpha={}, \
             vectors={}, \
             iterations={}, \
             p={}, \
             seed={}",
            self.measure,
            self.theta.map_or("None".to_string(), |v| v.to_string()),
            self.block_size,
            self.reciprocal,
            self.fallback,
            self.steps,
            self.projection,
            self.block_flag,
            self.symmetrize,
            self.tolerance,
            self.near_null_space
                .as_ref()
                .map_or("None".to_string(), |b| format!("{}x{}", b.shape().0, b.shape().1)),
            self.norm.map_or("None".to_string(), |n| n.to_string()),
            self.block,
            self.drop_mode,
            self.coordinates
                .as_ref()
                .map_or("None".to_string(), |v| format!("{}x{}", v.nrows(), v.ncols())),
            self.alpha,
            self.vectors,
            self.iterations,
            self.p,
            self.seed
        )
    }
}

/// Configuration value that can hold different types while preserving type information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    Usize(usize),
    F64(f64),
    U64(u64),
    String(String),
    OptionF64(Option<f64>),
    Measure(MeasureKind),
    Fallback(PairwiseFallback),
    Projection(ProjectionType),
    Norm(Option<BlockNorm>),
    DropMode(DropMode),
    PNorm(PNorm),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ConfigValue::Usize(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::F64(v) => Some(*v),
            ConfigValue::OptionF64(v) => *v,
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_measure(&self) -> Option<MeasureKind> {
        match self {
            ConfigValue::Measure(v) => Some(*v),
            _ => None,
        }
    }
}

impl StrengthBuilder {
    pub fn builder_config_typed(&self) -> HashMap<String, ConfigValue> {
        let mut config = HashMap::new();

        config.insert("measure".to_string(), ConfigValue::Measure(self.measure));
        config.insert("theta".to_string(), ConfigValue::OptionF64(self.theta));
        config.insert(
            "block_size".to_string(),
            ConfigValue::Usize(self.block_size),
        );
        config.insert(
            "reciprocal".to_string(),
            ConfigValue::Bool(self.reciprocal),
        );
        config.insert(
            "fallback".to_string(),
            ConfigValue::Fallback(self.fallback),
        );
        config.insert("steps".to_string(), ConfigValue::Usize(self.steps));
        config.insert(
            "proj_type".to_string(),
            ConfigValue::Projection(self.projection),
        );
        config.insert(
            "block_flag".to_string(),
            ConfigValue::Bool(self.block_flag),
        );
        config.insert(
            "symmetrize".to_string(),
            ConfigValue::Bool(self.symmetrize),
        );
        config.insert("tolerance".to_string(), ConfigValue::F64(self.tolerance));
        config.insert("norm".to_string(), ConfigValue::Norm(self.norm));
        config.insert("block".to_string(), ConfigValue::Bool(self.block));
        config.insert(
            "drop_mode".to_string(),
            ConfigValue::DropMode(self.drop_mode),
        );
        config.insert("alpha".to_string(), ConfigValue::F64(self.alpha));
        config.insert("vectors".to_string(), ConfigValue::Usize(self.vectors));
        config.insert(
            "iterations".to_string(),
            ConfigValue::Usize(self.iterations),
        );
        config.insert("p".to_string(), ConfigValue::PNorm(self.p));
        config.insert("seed".to_string(), ConfigValue::U64(self.seed));

        config
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Primitive types
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Usize(v) => write!(f, "{}", v),
            ConfigValue::F64(v) => write!(f, "{}", v),
            ConfigValue::U64(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "{}", v),

            // Optional primitive types
            ConfigValue::OptionF64(opt) => match opt {
                Some(v) => write!(f, "{}", v),
                None => write!(f, "None"),
            },

            // Option enums
            ConfigValue::Measure(v) => write!(f, "{}", v),
            ConfigValue::Fallback(v) => write!(f, "{}", v),
            ConfigValue::Projection(v) => write!(f, "{}", v),
            ConfigValue::Norm(opt) => match opt {
                Some(v) => write!(f, "{}", v),
                None => write!(f, "None"),
            },
            ConfigValue::DropMode(v) => write!(f, "{}", v),
            ConfigValue::PNorm(v) => write!(f, "{}", v),
        }
    }
}
