// src/sequence/generate.rs
// Candidate sets for batch runs: random samples and exhaustive grids

use super::{Alphabet, MoveSequence, random_sequence};
use crate::error::{OrbitError, Result};
use rand::Rng;

/// Generate `count` random sequences with lengths drawn uniformly from
/// `min_len..=max_len`.
pub fn random_batch<R: Rng + ?Sized>(
    count: usize,
    min_len: usize,
    max_len: usize,
    subset: &Alphabet,
    avoid_immediate_repeat: bool,
    rng: &mut R,
) -> Result<Vec<MoveSequence>> {
    if min_len == 0 || min_len > max_len {
        return Err(OrbitError::InvalidSequence(format!(
            "invalid length range {}..={}",
            min_len, max_len
        )));
    }

    (0..count)
        .map(|_| {
            let length = rng.random_range(min_len..=max_len);
            random_sequence(length, subset, avoid_immediate_repeat, rng)
        })
        .collect()
}

/// Every ordered 2-move combination over `subset` (k x k sequences)
pub fn all_pairs(subset: &Alphabet) -> Vec<MoveSequence> {
    let tokens = subset.tokens();
    let mut out = Vec::with_capacity(tokens.len() * tokens.len());
    for first in tokens {
        for second in tokens {
            out.push(MoveSequence(vec![first.clone(), second.clone()]));
        }
    }
    out
}

/// `[X, X]` for every move X in `subset`
pub fn self_compositions(subset: &Alphabet) -> Vec<MoveSequence> {
    subset
        .tokens()
        .iter()
        .map(|t| MoveSequence(vec![t.clone(), t.clone()]))
        .collect()
}
