use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("Failed to read configuration file: {0}")]
    Io(String),

    #[error("Failed to parse configuration file: {0}")]
    Parse(String),
}

/// Which part of a symmetric torsion range the search explores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymmetryMode {
    /// Explore every branch; mirror solutions are both produced.
    #[default]
    All,
    /// Explore only the first half of the branches at the first branching
    /// vertex, suppressing one of the two mirror subtrees.
    LeftHalf,
    /// Explore only the second half.
    RightHalf,
}

/// Fixed parameters of the spectral projected gradient refiner.
///
/// Defaults follow the reference formulation; they rarely need changing and
/// are grouped so a configuration file can override them as one block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpgParams {
    /// Blending factor of the nonmonotone line-search reference value.
    pub eta: f64,
    /// Sufficient-decrease coefficient of the line search.
    pub gamma: f64,
    /// Objective value below which the refinement counts as converged.
    pub obj_tol: f64,
    /// Direction norm below which the refinement counts as stalled.
    pub direction_tol: f64,
    /// Step length below which backtracking gives up.
    pub step_tol: f64,
    /// Clamp range of the Barzilai-Borwein spectral parameter.
    pub mu_min: f64,
    pub mu_max: f64,
    /// How often the caller may re-invoke the refiner on one branch, each
    /// time doubling the box expansion margin.
    pub max_box_expansions: usize,
}

impl Default for SpgParams {
    fn default() -> Self {
        Self {
            eta: 0.99,
            gamma: 1e-4,
            obj_tol: 1e-7,
            direction_tol: 1e-8,
            step_tol: 1e-12,
            mu_min: 1e-12,
            mu_max: 1e12,
            max_box_expansions: 3,
        }
    }
}

/// Parameters of one solve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolverConfig {
    /// Tolerance separating exact from interval distances and grading
    /// feasibility.
    pub eps: f64,
    /// Upper bound on the spatial displacement a single torsion sub-arc may
    /// represent; smaller values subdivide arcs more finely.
    pub resolution: f64,
    /// Stop after the first solution.
    #[serde(default)]
    pub single_solution: bool,
    /// Stop once this many solutions were recorded (0 = unlimited).
    #[serde(default)]
    pub max_solutions: usize,
    /// Wall-clock budget for the whole search.
    #[serde(default, with = "optional_seconds")]
    pub time_limit: Option<Duration>,
    #[serde(default)]
    pub symmetry: SymmetryMode,
    #[serde(default)]
    pub spg: SpgParams,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            eps: 1e-3,
            resolution: 0.1,
            single_solution: false,
            max_solutions: 0,
            time_limit: None,
            symmetry: SymmetryMode::default(),
            spg: SpgParams::default(),
        }
    }
}

impl SolverConfig {
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder::default()
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.eps > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "eps",
                message: format!("{} is not a positive tolerance", self.eps),
            });
        }
        if !(self.resolution > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "resolution",
                message: format!("{} is not a positive resolution", self.resolution),
            });
        }
        Ok(())
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}

#[derive(Debug, Default)]
pub struct SolverConfigBuilder {
    eps: Option<f64>,
    resolution: Option<f64>,
    single_solution: bool,
    max_solutions: usize,
    time_limit: Option<Duration>,
    symmetry: SymmetryMode,
    spg: Option<SpgParams>,
}

impl SolverConfigBuilder {
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = Some(eps);
        self
    }
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }
    pub fn single_solution(mut self, single: bool) -> Self {
        self.single_solution = single;
        self
    }
    pub fn max_solutions(mut self, max: usize) -> Self {
        self.max_solutions = max;
        self
    }
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
    pub fn symmetry(mut self, mode: SymmetryMode) -> Self {
        self.symmetry = mode;
        self
    }
    pub fn spg(mut self, spg: SpgParams) -> Self {
        self.spg = Some(spg);
        self
    }

    pub fn build(self) -> Result<SolverConfig, ConfigError> {
        let config = SolverConfig {
            eps: self.eps.ok_or(ConfigError::MissingParameter("eps"))?,
            resolution: self
                .resolution
                .ok_or(ConfigError::MissingParameter("resolution"))?,
            single_solution: self.single_solution,
            max_solutions: self.max_solutions,
            time_limit: self.time_limit,
            symmetry: self.symmetry,
            spg: self.spg.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}
