// src/sequence/mod.rs
// Move tokens, move sequences and the alphabets they are drawn from

pub mod generate;

use crate::error::{OrbitError, Result};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use generate::{all_pairs, random_batch, self_compositions};

/// Separator used when rendering a sequence for people
pub const DISPLAY_SEPARATOR: &str = " → ";

/// Separator used when rendering a sequence into a file name
pub const FILE_SEPARATOR: &str = "_";

/// One named move, e.g. `FR` (rotate the F cell towards R)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MoveToken(String);

impl MoveToken {
    /// Parse a token, rejecting empty names and names that would break the
    /// comma-separated wire format.
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(OrbitError::InvalidSequence("empty move token".to_string()));
        }
        if name.chars().any(|c| c == ',' || c.is_whitespace()) {
            return Err(OrbitError::InvalidSequence(format!(
                "move token '{}' contains a separator",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MoveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MoveToken {
    type Err = OrbitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MoveToken {
    type Error = OrbitError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<MoveToken> for String {
    fn from(token: MoveToken) -> Self {
        token.0
    }
}

/// An ordered, non-empty, immutable list of move tokens.
///
/// Two sequences are the same key iff their token lists are equal position by
/// position, which is what the store deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<MoveToken>", into = "Vec<MoveToken>")]
pub struct MoveSequence(Vec<MoveToken>);

impl MoveSequence {
    pub fn new(tokens: Vec<MoveToken>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(OrbitError::InvalidSequence(
                "sequence must contain at least one move".to_string(),
            ));
        }
        Ok(Self(tokens))
    }

    /// Build a sequence from plain names, e.g. `["FR", "UF"]`
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let tokens = names
            .iter()
            .map(|n| MoveToken::parse(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(tokens)
    }

    pub fn tokens(&self) -> &[MoveToken] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with slices
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|t| t.0.clone()).collect()
    }

    pub fn render(&self, separator: &str) -> String {
        self.0
            .iter()
            .map(MoveToken::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Comma-separated form used on the oracle command line
    pub fn to_wire(&self) -> String {
        self.render(",")
    }

    /// File-name-safe stem, e.g. `FR_UF_OR`
    pub fn file_stem(&self) -> String {
        self.0
            .iter()
            .map(|t| {
                t.as_str()
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(FILE_SEPARATOR)
    }

    /// Copy of the token list, for building a perturbed variant
    pub(crate) fn to_vec(&self) -> Vec<MoveToken> {
        self.0.clone()
    }
}

impl fmt::Display for MoveSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DISPLAY_SEPARATOR))
    }
}

impl TryFrom<Vec<MoveToken>> for MoveSequence {
    type Error = OrbitError;

    fn try_from(tokens: Vec<MoveToken>) -> Result<Self> {
        Self::new(tokens)
    }
}

impl From<MoveSequence> for Vec<MoveToken> {
    fn from(seq: MoveSequence) -> Self {
        seq.0
    }
}

/// Parse a comma-separated sequence such as `FR,UF,OR`
pub fn parse_sequence(raw: &str) -> Result<MoveSequence> {
    let names: Vec<&str> = raw.split(',').collect();
    MoveSequence::from_names(&names)
}

/// All 2D rotation moves on the 3x3x3x3 hypercube
const HYPERCUBE_MOVES: [&str; 48] = [
    "FR", "FL", "FU", "FD", "FO", "FI", //
    "BR", "BL", "BU", "BD", "BO", "BI", //
    "UR", "UL", "UF", "UB", "UO", "UI", //
    "DR", "DL", "DF", "DB", "DO", "DI", //
    "RU", "RD", "RF", "RB", "RO", "RI", //
    "LU", "LD", "LF", "LB", "LO", "LI", //
    "OR", "OL", "OU", "OD", "OF", "OB", //
    "IR", "IL", "IU", "ID", "IF", "IB",
];

/// Subset that resolves quickly; used as the default perturbation pool
const COMMON_MOVES: [&str; 19] = [
    "FR", "FL", "FU", "FD", "FO", //
    "UF", "UB", "UR", "UL", "UO", //
    "RF", "RB", "RU", "RD", "RO", //
    "OR", "OL", "OU", "OF",
];

/// 6 faces x 2 directions, used for exhaustive pair grids
const BASE_MOVES: [&str; 12] = [
    "FR", "FL", "FU", "FO", "RF", "RO", "UR", "UF", "UO", "UL", "OR", "OL",
];

/// The set of tokens a sequence may be built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    tokens: Vec<MoveToken>,
}

impl Alphabet {
    /// Build an alphabet, dropping duplicates but keeping first-seen order
    pub fn new(tokens: Vec<MoveToken>) -> Result<Self> {
        let mut unique: Vec<MoveToken> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !unique.contains(&token) {
                unique.push(token);
            }
        }
        if unique.is_empty() {
            return Err(OrbitError::InvalidSequence("alphabet is empty".to_string()));
        }
        Ok(Self { tokens: unique })
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let tokens = names
            .iter()
            .map(|n| MoveToken::parse(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(tokens)
    }

    pub fn hypercube() -> Self {
        Self::from_static(&HYPERCUBE_MOVES)
    }

    pub fn common() -> Self {
        Self::from_static(&COMMON_MOVES)
    }

    pub fn base_moves() -> Self {
        Self::from_static(&BASE_MOVES)
    }

    fn from_static(names: &[&'static str]) -> Self {
        Self {
            tokens: names.iter().map(|n| MoveToken(n.to_string())).collect(),
        }
    }

    pub fn tokens(&self) -> &[MoveToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &MoveToken) -> bool {
        self.tokens.contains(token)
    }

    /// Reject sequences using tokens outside this alphabet
    pub fn validate(&self, sequence: &MoveSequence) -> Result<()> {
        let unknown: Vec<&str> = sequence
            .tokens()
            .iter()
            .filter(|t| !self.contains(t))
            .map(MoveToken::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(OrbitError::InvalidSequence(format!(
                "{} uses moves outside the alphabet: {}",
                sequence,
                unknown.join(", ")
            )))
        }
    }

    /// Pick one token, optionally excluding one value
    pub(crate) fn choose_except<R: Rng + ?Sized>(
        &self,
        excluded: Option<&MoveToken>,
        rng: &mut R,
    ) -> Option<MoveToken> {
        let candidates: Vec<&MoveToken> = self
            .tokens
            .iter()
            .filter(|t| Some(*t) != excluded)
            .collect();
        candidates.choose(rng).map(|t| (*t).clone())
    }
}

/// Produce a random sequence of `length` moves drawn from `subset`.
///
/// With `avoid_immediate_repeat`, no two adjacent tokens are equal. The random
/// source is explicit so a fixed seed always reproduces the same sequence.
pub fn random_sequence<R: Rng + ?Sized>(
    length: usize,
    subset: &Alphabet,
    avoid_immediate_repeat: bool,
    rng: &mut R,
) -> Result<MoveSequence> {
    if length == 0 {
        return Err(OrbitError::InvalidSequence(
            "cannot generate a sequence of length 0".to_string(),
        ));
    }
    if avoid_immediate_repeat && length > 1 && subset.len() < 2 {
        return Err(OrbitError::InvalidSequence(
            "need at least two moves to avoid immediate repeats".to_string(),
        ));
    }

    let mut tokens: Vec<MoveToken> = Vec::with_capacity(length);
    for _ in 0..length {
        let excluded = if avoid_immediate_repeat { tokens.last() } else { None };
        let token = subset
            .choose_except(excluded, rng)
            .ok_or_else(|| OrbitError::InvalidSequence("alphabet is empty".to_string()))?;
        tokens.push(token);
    }
    MoveSequence::new(tokens)
}
