// src/perturb.rs
// Perturbation operators: small, well-defined edits of a base sequence

use crate::error::{OrbitError, Result};
use crate::sequence::{Alphabet, MoveSequence, MoveToken};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The edit applied to a base sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationOperator {
    /// Replace one move with a different move
    #[default]
    Substitute,
    /// Exchange two adjacent moves
    Swap,
    /// Insert one move anywhere (including either end)
    Insert,
    /// Remove one move
    Delete,
}

impl PerturbationOperator {
    pub const ALL: [PerturbationOperator; 4] = [
        PerturbationOperator::Substitute,
        PerturbationOperator::Swap,
        PerturbationOperator::Insert,
        PerturbationOperator::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Substitute => "substitute",
            Self::Swap => "swap",
            Self::Insert => "insert",
            Self::Delete => "delete",
        }
    }

    /// Swap and delete need two moves to act on
    fn needs_two_moves(&self) -> bool {
        matches!(self, Self::Swap | Self::Delete)
    }
}

impl fmt::Display for PerturbationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerturbationOperator {
    type Err = OrbitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "substitute" => Ok(Self::Substitute),
            "swap" => Ok(Self::Swap),
            "insert" => Ok(Self::Insert),
            "delete" => Ok(Self::Delete),
            other => Err(OrbitError::Config(format!(
                "unknown perturbation type '{}'. Valid: substitute, swap, insert, delete",
                other
            ))),
        }
    }
}

/// What swap/delete do on a one-move sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Degrade to a substitution (output length unchanged)
    #[default]
    Substitute,
    /// Refuse with `InvalidSequence`
    Reject,
}

/// A concrete perturbation and the sequence it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Perturbation {
    pub requested: PerturbationOperator,
    /// Differs from `requested` when a fallback kicked in
    pub applied: PerturbationOperator,
    pub position: usize,
    /// New token for substitute and insert
    pub replacement: Option<MoveToken>,
    pub sequence: MoveSequence,
}

/// Applies perturbation operators using tokens from a fixed pool.
///
/// Holds no random state: every call takes the random source explicitly, so
/// a seeded source reproduces the exact output.
#[derive(Debug, Clone)]
pub struct PerturbationEngine {
    pool: Alphabet,
    fallback: FallbackPolicy,
}

impl PerturbationEngine {
    pub fn new(pool: Alphabet) -> Self {
        Self {
            pool,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn perturb<R: Rng + ?Sized>(
        &self,
        sequence: &MoveSequence,
        operator: PerturbationOperator,
        rng: &mut R,
    ) -> Result<MoveSequence> {
        self.perturb_detailed(sequence, operator, rng)
            .map(|p| p.sequence)
    }

    pub fn perturb_detailed<R: Rng + ?Sized>(
        &self,
        sequence: &MoveSequence,
        operator: PerturbationOperator,
        rng: &mut R,
    ) -> Result<Perturbation> {
        let applied = if operator.needs_two_moves() && sequence.len() < 2 {
            match self.fallback {
                FallbackPolicy::Substitute => PerturbationOperator::Substitute,
                FallbackPolicy::Reject => {
                    return Err(OrbitError::InvalidSequence(format!(
                        "{} needs at least two moves, got {}",
                        operator, sequence
                    )));
                }
            }
        } else {
            operator
        };

        let mut tokens = sequence.to_vec();
        let (position, replacement) = match applied {
            PerturbationOperator::Substitute => {
                // Only positions where the pool offers a different token qualify
                let positions: Vec<usize> = (0..tokens.len())
                    .filter(|&i| self.pool.tokens().iter().any(|t| *t != tokens[i]))
                    .collect();
                if positions.is_empty() {
                    return Err(OrbitError::InvalidSequence(format!(
                        "no substitute available for any move of {}",
                        sequence
                    )));
                }
                let position = positions[rng.random_range(0..positions.len())];
                let replacement = self
                    .pool
                    .choose_except(Some(&tokens[position]), rng)
                    .ok_or_else(|| {
                        OrbitError::InvalidSequence("perturbation pool is empty".to_string())
                    })?;
                tokens[position] = replacement.clone();
                (position, Some(replacement))
            }
            PerturbationOperator::Swap => {
                let position = rng.random_range(0..tokens.len() - 1);
                tokens.swap(position, position + 1);
                (position, None)
            }
            PerturbationOperator::Insert => {
                let position = rng.random_range(0..=tokens.len());
                let inserted = self.pool.choose_except(None, rng).ok_or_else(|| {
                    OrbitError::InvalidSequence("perturbation pool is empty".to_string())
                })?;
                tokens.insert(position, inserted.clone());
                (position, Some(inserted))
            }
            PerturbationOperator::Delete => {
                let position = rng.random_range(0..tokens.len());
                tokens.remove(position);
                (position, None)
            }
        };

        Ok(Perturbation {
            requested: operator,
            applied,
            position,
            replacement,
            sequence: MoveSequence::new(tokens)?,
        })
    }
}
