//! Pluggable scoring for [`KeepBest`](crate::KeepBest).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use thoughts::{ScoringError, Thought};

/// Named scores assigned to one Thought.
pub type Scores = BTreeMap<String, f64>;

/// Scores Thoughts and ranks score sets against each other.
///
/// `compare` must be a total order: `Greater` means `a` ranks above `b`.
pub trait Scorer: Send + Sync {
    /// Computes the named scores for `thought`.
    fn assign_scores(&self, thought: &Thought) -> Result<Scores, ScoringError>;

    /// Ranks two score sets. Defaults to [`Ranking::Lexicographic`] over every
    /// score name in sorted order.
    fn compare(&self, a: &Scores, b: &Scores) -> Ordering {
        Ranking::default().compare(a, b)
    }
}

/// Built-in total orders over [`Scores`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ranking {
    /// Compare the sum of all scores.
    Sum,
    /// Compare the named scores in order, falling through on ties.
    ///
    /// An empty list compares every score name present in either set, in
    /// sorted order.
    Lexicographic(Vec<String>),
}

impl Default for Ranking {
    fn default() -> Self {
        Self::Lexicographic(Vec::new())
    }
}

impl Ranking {
    /// Lexicographic over the given names.
    pub fn by<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self::Lexicographic(keys.into_iter().map(Into::into).collect())
    }

    /// Compares `a` against `b`. Absent scores rank below every present one.
    pub fn compare(&self, a: &Scores, b: &Scores) -> Ordering {
        match self {
            Self::Sum => a.values().sum::<f64>().total_cmp(&b.values().sum::<f64>()),
            Self::Lexicographic(keys) if keys.is_empty() => {
                let mut names: Vec<&String> = a.keys().chain(b.keys()).collect();
                names.sort();
                names.dedup();
                compare_keys(names.into_iter().map(String::as_str), a, b)
            }
            Self::Lexicographic(keys) => compare_keys(keys.iter().map(String::as_str), a, b),
        }
    }
}

fn compare_keys<'k>(keys: impl Iterator<Item = &'k str>, a: &Scores, b: &Scores) -> Ordering {
    for key in keys {
        let ord = match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => x.total_cmp(y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Adapts a closure into a [`Scorer`].
pub struct FnScorer<F> {
    score: F,
    ranking: Ranking,
}

impl<F> FnScorer<F>
where
    F: Fn(&Thought) -> Result<Scores, ScoringError> + Send + Sync,
{
    /// Wraps `score`, ranking lexicographically over sorted names.
    pub fn new(score: F) -> Self {
        Self {
            score,
            ranking: Ranking::default(),
        }
    }

    /// Replaces the default lexicographic ranking.
    #[must_use]
    pub fn with_ranking(mut self, ranking: Ranking) -> Self {
        self.ranking = ranking;
        self
    }
}

impl<F> std::fmt::Debug for FnScorer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnScorer")
            .field("ranking", &self.ranking)
            .finish_non_exhaustive()
    }
}

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&Thought) -> Result<Scores, ScoringError> + Send + Sync,
{
    fn assign_scores(&self, thought: &Thought) -> Result<Scores, ScoringError> {
        (self.score)(thought)
    }

    fn compare(&self, a: &Scores, b: &Scores) -> Ordering {
        self.ranking.compare(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> Scores {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn sum_ranks_by_total() {
        let a = scores(&[("x", 0.5), ("y", 0.5)]);
        let b = scores(&[("x", 0.9)]);
        assert_eq!(Ranking::Sum.compare(&a, &b), Ordering::Greater);
        assert_eq!(Ranking::Sum.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn lexicographic_falls_through_ties_in_key_order() {
        let a = scores(&[("primary", 1.0), ("secondary", 0.1)]);
        let b = scores(&[("primary", 1.0), ("secondary", 0.2)]);
        let ranking = Ranking::by(["primary", "secondary"]);
        assert_eq!(ranking.compare(&a, &b), Ordering::Less);
        assert_eq!(Ranking::by(["primary"]).compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn default_ranking_uses_sorted_names() {
        // "a" sorts before "b", so it decides.
        let x = scores(&[("a", 2.0), ("b", 0.0)]);
        let y = scores(&[("a", 1.0), ("b", 9.0)]);
        assert_eq!(Ranking::default().compare(&x, &y), Ordering::Greater);
    }

    #[test]
    fn default_ranking_is_lexicographic_over_all_names() {
        assert_eq!(Ranking::default(), Ranking::Lexicographic(Vec::new()));
    }

    #[test]
    fn absent_score_ranks_lowest() {
        let present = scores(&[("s", -100.0)]);
        let absent = Scores::new();
        assert_eq!(
            Ranking::by(["s"]).compare(&present, &absent),
            Ordering::Greater
        );
    }

    #[test]
    fn ordering_is_antisymmetric_over_a_grid() {
        let values = [-1.0, 0.0, 0.25, 0.9, f64::INFINITY];
        for ranking in [Ranking::Sum, Ranking::default()] {
            for &p in &values {
                for &q in &values {
                    let a = scores(&[("s", p), ("t", q)]);
                    let b = scores(&[("s", q), ("t", p)]);
                    assert_eq!(ranking.compare(&a, &b), ranking.compare(&b, &a).reverse());
                }
            }
        }
    }
}
