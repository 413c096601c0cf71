// src/config/file.rs
// File-based configuration from ~/.orbit-chaos/config.toml

use super::env::ConfigValidation;
use crate::batch::BatchConfig;
use crate::error::{OrbitError, Result};
use crate::exponent::{ExponentConfig, Thresholds};
use crate::oracle::DEFAULT_MAX_ITERATIONS;
use crate::perturb::{FallbackPolicy, PerturbationEngine, PerturbationOperator};
use crate::sequence::Alphabet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Directory under $HOME holding config and records
const APP_DIR: &str = ".orbit-chaos";

/// Top-level config structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub oracle: OracleSection,
    pub sequence: SequenceSection,
    pub perturbation: PerturbationSection,
    pub classification: Thresholds,
    pub batch: BatchSection,
    pub store: StoreSection,
}

/// External engine invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    /// Engine executable
    pub program: String,
    /// Arguments placed before the per-query ones
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Where per-query output files go (default: system temp dir)
    pub scratch_dir: Option<PathBuf>,
    pub max_iterations: u64,
    /// Fixed part of the per-query timeout
    pub timeout_base_secs: u64,
    /// Per-iteration part of the per-query timeout, in microseconds
    pub timeout_per_iteration_us: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            program: "ctrl".to_string(),
            args: vec!["--puzzle".to_string(), "ft_hypercube:3".to_string()],
            working_dir: None,
            scratch_dir: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_base_secs: 30,
            timeout_per_iteration_us: 200,
        }
    }
}

/// The puzzle's move set
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SequenceSection {
    /// Moves base sequences may use; the 48-move hypercube set when unset
    pub alphabet: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerturbationSection {
    /// Perturbations per base sequence
    pub count: usize,
    pub operator: PerturbationOperator,
    pub fallback: FallbackPolicy,
    /// Token pool; `sequence.alphabet` or the common 19-move subset when unset
    pub alphabet: Option<Vec<String>>,
    /// Root seed; drawn at random (and logged) when unset
    pub seed: Option<u64>,
}

impl Default for PerturbationSection {
    fn default() -> Self {
        Self {
            count: 10,
            operator: PerturbationOperator::default(),
            fallback: FallbackPolicy::default(),
            alphabet: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub workers: usize,
    /// Whole-batch deadline; none by default
    pub timeout_secs: Option<u64>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreSection {
    /// Defaults to ~/.orbit-chaos/records
    pub records_dir: Option<PathBuf>,
}

impl AnalysisConfig {
    /// Load config from ~/.orbit-chaos/config.toml, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Load an explicitly named config file; it must exist and parse
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OrbitError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = toml::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config from file");
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        app_dir().join("config.toml")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.store
            .records_dir
            .clone()
            .unwrap_or_else(|| app_dir().join("records"))
    }

    /// Moves submitted sequences are validated against. A perturbation pool
    /// configured on its own stands in for the puzzle's move set.
    pub fn sequence_alphabet(&self) -> Result<Alphabet> {
        self.configured_alphabet(&self.sequence.alphabet, &self.perturbation.alphabet)
            .unwrap_or_else(|| Ok(Alphabet::hypercube()))
    }

    /// The perturbation pool: the configured pool, else the configured move
    /// set, else the common subset
    pub fn perturbation_alphabet(&self) -> Result<Alphabet> {
        self.configured_alphabet(&self.perturbation.alphabet, &self.sequence.alphabet)
            .unwrap_or_else(|| Ok(Alphabet::common()))
    }

    /// Moves crossed by the pair and self-composition grids
    pub fn grid_alphabet(&self) -> Result<Alphabet> {
        self.configured_alphabet(&self.sequence.alphabet, &self.perturbation.alphabet)
            .unwrap_or_else(|| Ok(Alphabet::base_moves()))
    }

    fn configured_alphabet(
        &self,
        preferred: &Option<Vec<String>>,
        fallback: &Option<Vec<String>>,
    ) -> Option<Result<Alphabet>> {
        preferred
            .as_ref()
            .or(fallback.as_ref())
            .map(|names| Alphabet::from_names(names.as_slice()))
    }

    pub fn perturbation_engine(&self) -> Result<PerturbationEngine> {
        Ok(PerturbationEngine::new(self.perturbation_alphabet()?)
            .with_fallback(self.perturbation.fallback))
    }

    /// The configured seed, or a fresh one that is logged so the run can be
    /// repeated
    pub fn resolve_seed(&self) -> u64 {
        match self.perturbation.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!(seed, "No seed configured, drew one at random");
                seed
            }
        }
    }

    pub fn exponent_config(&self, seed: u64) -> ExponentConfig {
        ExponentConfig {
            perturbations: self.perturbation.count,
            operator: self.perturbation.operator,
            max_iterations: self.oracle.max_iterations,
            thresholds: self.classification,
            seed,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            workers: self.batch.workers,
            timeout: self.batch.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Check the values that would otherwise fail deep inside a run
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if let Err(e) = self.classification.check() {
            validation.add_error(e.to_string());
        }
        if self.batch.workers == 0 {
            validation.add_error("batch.workers must be at least 1");
        } else if self.batch.workers > 32 {
            validation.add_warning(format!(
                "batch.workers = {} runs that many engine processes at once",
                self.batch.workers
            ));
        }
        if self.batch.timeout_secs == Some(0) {
            validation.add_error("batch.timeout_secs must be positive when set");
        }
        if self.perturbation.count == 0 {
            validation.add_error("perturbation.count must be at least 1");
        }
        if self.oracle.max_iterations == 0 {
            validation.add_error("oracle.max_iterations must be at least 1");
        }
        if self.oracle.program.trim().is_empty() {
            validation.add_error("oracle.program is empty");
        }

        let moves = match self.sequence_alphabet() {
            Ok(moves) => Some(moves),
            Err(e) => {
                validation.add_error(format!("sequence.alphabet: {}", e));
                None
            }
        };

        match self.perturbation_alphabet() {
            Ok(pool) if pool.len() < 2 => {
                validation.add_error("perturbation.alphabet needs at least two distinct moves");
            }
            Ok(pool) => {
                if let Some(moves) = &moves {
                    let foreign: Vec<&str> = pool
                        .tokens()
                        .iter()
                        .filter(|t| !moves.contains(t))
                        .map(|t| t.as_str())
                        .collect();
                    if !foreign.is_empty() {
                        validation.add_warning(format!(
                            "perturbation.alphabet has moves outside the sequence alphabet: {}",
                            foreign.join(", ")
                        ));
                    }
                }
            }
            Err(e) => validation.add_error(format!("perturbation.alphabet: {}", e)),
        }

        validation
    }

    /// One-line description for startup logs
    pub fn summary(&self) -> String {
        format!(
            "oracle={} max_iter={} perturbations={} operator={} workers={} thresholds={}/{}",
            self.oracle.program,
            self.oracle.max_iterations,
            self.perturbation.count,
            self.perturbation.operator,
            self.batch.workers,
            self.classification.weak,
            self.classification.strong
        )
    }
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
