use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::PostMetadata;

/// An engagement counter the score can be weighted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Likes,
    Shares,
}

impl Signal {
    pub fn read(self, metadata: &PostMetadata) -> u64 {
        match self {
            Signal::Likes => metadata.like_count,
            Signal::Shares => metadata.share_count,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Likes => f.write_str("likes"),
            Signal::Shares => f.write_str("shares"),
        }
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "likes" => Ok(Signal::Likes),
            "shares" => Ok(Signal::Shares),
            other => Err(Error::Config(format!("unknown score signal `{other}`"))),
        }
    }
}

/// Weight per signal. Every weight is finite and non-negative, which keeps
/// the score total and non-decreasing in each counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    weights: BTreeMap<Signal, f64>,
}

impl ScoreWeights {
    pub fn new(weights: impl IntoIterator<Item = (Signal, f64)>) -> Result<Self> {
        let weights: BTreeMap<Signal, f64> = weights.into_iter().collect();
        for (signal, weight) in &weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::Config(format!(
                    "weight for `{signal}` must be a finite non-negative number, got {weight}"
                )));
            }
        }
        Ok(ScoreWeights { weights })
    }

    pub fn weight(&self, signal: Signal) -> f64 {
        self.weights.get(&signal).copied().unwrap_or(0.0)
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            weights: BTreeMap::from([(Signal::Likes, 1.0), (Signal::Shares, 2.0)]),
        }
    }
}

/// Parses `likes=1,shares=2.5`. Signals left out weigh nothing.
impl FromStr for ScoreWeights {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut weights = Vec::new();
        for pair in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (signal, weight) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected `signal=weight`, got `{pair}`")))?;
            let weight = weight
                .trim()
                .parse::<f64>()
                .map_err(|e| Error::Config(format!("bad weight in `{pair}`: {e}")))?;
            weights.push((signal.parse::<Signal>()?, weight));
        }
        ScoreWeights::new(weights)
    }
}

/// Maps a post's engagement counters to its feed rank.
///
/// The score is a weighted sum of the counters. It has no side effects and
/// the same metadata always produces the same bits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreEngine {
    weights: ScoreWeights,
}

impl ScoreEngine {
    pub fn new(weights: ScoreWeights) -> Self {
        ScoreEngine { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn score(&self, metadata: &PostMetadata) -> f64 {
        // BTreeMap iteration order is fixed, so the summation order is too.
        self.weights
            .weights
            .iter()
            .map(|(signal, weight)| weight * signal.read(metadata) as f64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    fn metadata(like_count: u64, share_count: u64) -> PostMetadata {
        PostMetadata {
            author: UserId("u1".to_string()),
            headline: String::new(),
            like_count,
            share_count,
        }
    }

    #[test]
    fn default_weights_favour_shares() {
        let engine = ScoreEngine::default();
        assert_eq!(engine.score(&metadata(3, 0)), 3.0);
        assert_eq!(engine.score(&metadata(3, 1)), 5.0);
        assert_eq!(engine.score(&metadata(0, 0)), 0.0);
    }

    #[test]
    fn parses_weight_list() {
        let weights: ScoreWeights = "likes=0.5, shares=4".parse().unwrap();
        assert_eq!(weights.weight(Signal::Likes), 0.5);
        assert_eq!(weights.weight(Signal::Shares), 4.0);

        let likes_only: ScoreWeights = "likes=1".parse().unwrap();
        assert_eq!(likes_only.weight(Signal::Shares), 0.0);
        assert_eq!(ScoreEngine::new(likes_only).score(&metadata(2, 9)), 2.0);
    }

    #[test]
    fn rejects_bad_weights() {
        assert!(matches!("likes=-1".parse::<ScoreWeights>(), Err(Error::Config(_))));
        assert!(matches!("likes=inf".parse::<ScoreWeights>(), Err(Error::Config(_))));
        assert!(matches!("views=1".parse::<ScoreWeights>(), Err(Error::Config(_))));
        assert!(matches!("likes".parse::<ScoreWeights>(), Err(Error::Config(_))));
    }

    #[test]
    fn extreme_counters_stay_finite() {
        let engine = ScoreEngine::default();
        assert!(engine.score(&metadata(u64::MAX, u64::MAX)).is_finite());
    }
}
