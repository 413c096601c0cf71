// src/config/env.rs
// Environment overrides - every ORBIT_* variable is read here

use super::file::AnalysisConfig;
use crate::perturb::FallbackPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

/// Values taken from ORBIT_* environment variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    /// ORBIT_WORKERS
    pub workers: Option<usize>,
    /// ORBIT_MAX_ITERATIONS
    pub max_iterations: Option<u64>,
    /// ORBIT_PERTURBATIONS
    pub perturbations: Option<usize>,
    /// ORBIT_SEED
    pub seed: Option<u64>,
    /// ORBIT_RECORDS_DIR
    pub records_dir: Option<PathBuf>,
    /// ORBIT_ORACLE_PROGRAM
    pub oracle_program: Option<String>,
    /// ORBIT_REJECT_SHORT: refuse swap/delete on one-move sequences
    pub reject_short: Option<bool>,
}

impl EnvOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            workers: parse_env(&read, "ORBIT_WORKERS"),
            max_iterations: parse_env(&read, "ORBIT_MAX_ITERATIONS"),
            perturbations: parse_env(&read, "ORBIT_PERTURBATIONS"),
            seed: parse_env(&read, "ORBIT_SEED"),
            records_dir: read("ORBIT_RECORDS_DIR").map(PathBuf::from),
            oracle_program: read("ORBIT_ORACLE_PROGRAM"),
            reject_short: read("ORBIT_REJECT_SHORT").and_then(|v| {
                let parsed = parse_bool(&v);
                if parsed.is_none() {
                    warn!(value = %v, "Ignoring unparsable ORBIT_REJECT_SHORT");
                }
                parsed
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay the set values onto a file-loaded config
    pub fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.oracle.max_iterations = max_iterations;
        }
        if let Some(count) = self.perturbations {
            config.perturbation.count = count;
        }
        if let Some(seed) = self.seed {
            config.perturbation.seed = Some(seed);
        }
        if let Some(dir) = &self.records_dir {
            config.store.records_dir = Some(dir.clone());
        }
        if let Some(program) = &self.oracle_program {
            config.oracle.program = program.clone();
        }
        if let Some(reject) = self.reject_short {
            config.perturbation.fallback = if reject {
                FallbackPolicy::Reject
            } else {
                FallbackPolicy::Substitute
            };
        }
        if !self.is_empty() {
            debug!(overrides = ?self, "Applied environment overrides");
        }
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

fn parse_env<T, F>(read: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = read(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
