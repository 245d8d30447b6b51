use std::collections::BTreeSet;

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

/// Score-ordered set of unique members (the in-memory analogue of a Redis ZSET)
///
/// Each member carries an integer score. Iteration order is by score, ties
/// broken by member name.
///
/// # Example
///
/// ```
/// use tallycrab::store::OrderedSet;
///
/// let mut set = OrderedSet::new();
/// set.add("a", 10);
/// set.add("b", 20);
/// set.add("c", 30);
///
/// assert_eq!(set.remove_range_by_score(i64::MIN, 20), 2);
/// assert_eq!(set.count(), 1);
/// assert_eq!(set.oldest_score(), Some(30));
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrderedSet {
    by_score: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

impl OrderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `member` with `score`, or move it to `score` if already present
    ///
    /// Returns `true` if the member was not in the set before.
    pub fn add(&mut self, member: &str, score: i64) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(previous) => {
                self.by_score.remove(&(previous, member.to_string()));
                self.by_score.insert((score, member.to_string()));
                false
            }
            None => {
                self.by_score.insert((score, member.to_string()));
                true
            }
        }
    }

    /// Remove `member`, returning whether it was present
    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.by_score.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Remove every member with `min <= score <= max` and return how many went
    pub fn remove_range_by_score(&mut self, min: i64, max: i64) -> usize {
        if min > max {
            return 0;
        }

        let doomed: Vec<(i64, String)> = self
            .by_score
            .range((min, String::new())..)
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();

        for entry in &doomed {
            self.by_score.remove(entry);
            self.scores.remove(&entry.1);
        }
        doomed.len()
    }

    /// Number of members
    pub fn count(&self) -> u64 {
        self.by_score.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.by_score.is_empty()
    }

    /// Score of `member`, if present
    pub fn score(&self, member: &str) -> Option<i64> {
        self.scores.get(member).copied()
    }

    /// Lowest score in the set
    pub fn oldest_score(&self) -> Option<i64> {
        self.by_score.first().map(|(score, _)| *score)
    }
}
