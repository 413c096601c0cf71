// src/exponent/classify.rs
// Exponent -> qualitative class. Pure, so stored records can be reclassified
// without touching the oracle again.

use crate::error::{OrbitError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative sensitivity bucket, ordered least to most chaotic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Trivial,
    WeaklyChaotic,
    StronglyChaotic,
    ExtremelyChaotic,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Trivial,
        Classification::WeaklyChaotic,
        Classification::StronglyChaotic,
        Classification::ExtremelyChaotic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::WeaklyChaotic => "weakly_chaotic",
            Self::StronglyChaotic => "strongly_chaotic",
            Self::ExtremelyChaotic => "extremely_chaotic",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class boundaries on the exponent λ:
/// `λ == 0` trivial, `(0, weak)` weakly, `[weak, strong)` strongly,
/// `[strong, ∞)` extremely chaotic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub weak: f64,
    pub strong: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            weak: 2.0,
            strong: 4.0,
        }
    }
}

impl Thresholds {
    pub fn new(weak: f64, strong: f64) -> Result<Self> {
        let thresholds = Self { weak, strong };
        thresholds.check()?;
        Ok(thresholds)
    }

    /// Boundaries must be finite with `0 < weak <= strong`
    pub fn check(&self) -> Result<()> {
        if !(self.weak.is_finite() && self.strong.is_finite()) {
            return Err(OrbitError::Config("thresholds must be finite".to_string()));
        }
        if self.weak <= 0.0 || self.weak > self.strong {
            return Err(OrbitError::Config(format!(
                "thresholds must satisfy 0 < weak <= strong (got weak={}, strong={})",
                self.weak, self.strong
            )));
        }
        Ok(())
    }

    /// Classify an exponent. Exponents are never negative; anything that is
    /// not strictly positive (including NaN) is trivial.
    pub fn classify(&self, exponent: f64) -> Classification {
        if exponent.is_nan() || exponent <= 0.0 {
            Classification::Trivial
        } else if exponent < self.weak {
            Classification::WeaklyChaotic
        } else if exponent < self.strong {
            Classification::StronglyChaotic
        } else {
            Classification::ExtremelyChaotic
        }
    }
}
