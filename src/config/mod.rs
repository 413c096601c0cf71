// src/config/mod.rs
// Configuration: TOML file plus environment overrides

pub mod env;
pub mod file;

pub use env::{ConfigValidation, EnvOverrides};
pub use file::{
    AnalysisConfig, BatchSection, OracleSection, PerturbationSection, SequenceSection, StoreSection,
};

use crate::error::Result;
use std::path::Path;

/// Load the config the way the binary does: an explicit file must parse, the
/// default location falls back to defaults. Environment overrides win.
pub fn load(explicit: Option<&Path>) -> Result<AnalysisConfig> {
    let mut config = match explicit {
        Some(path) => AnalysisConfig::load_from(path)?,
        None => AnalysisConfig::load(),
    };
    EnvOverrides::from_env().apply(&mut config);
    Ok(config)
}
