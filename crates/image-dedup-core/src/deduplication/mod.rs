//! Near-duplicate grouping.
//!
//! [`SimilarityGrouper`] ingests `(path, fingerprint)` pairs one at a time.
//! Each new fingerprint is compared against the representatives seen so far,
//! in the order they were created, and joins the first one that is similar
//! enough. Otherwise it becomes a new representative.
//!
//! Because candidates arrive in sorted path order, the first-seen path of a
//! cluster is always its representative, and that representative is the
//! "original" reported for the group.

use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::config::GroupingStrategy;
use crate::processing::{Fingerprint, FINGERPRINT_BITS};
use crate::types::{DuplicateGroup, ScanResult, SimilarityThreshold};

#[derive(Debug)]
struct Representative {
    path: PathBuf,
    fingerprint: Fingerprint,
    duplicates: Vec<PathBuf>,
}

/// First-match grouping of fingerprints under a similarity threshold
#[derive(Debug)]
pub struct SimilarityGrouper {
    threshold: SimilarityThreshold,
    strategy: GroupingStrategy,
    max_distance: u32,
    representatives: Vec<Representative>,
    /// Fingerprint → index of the representative holding it
    exact_index: HashMap<Fingerprint, usize>,
    seen: HashSet<PathBuf>,
}

impl SimilarityGrouper {
    pub fn new(threshold: SimilarityThreshold, strategy: GroupingStrategy) -> Self {
        let max_distance = match strategy {
            GroupingStrategy::Threshold => threshold.max_distance(FINGERPRINT_BITS),
            GroupingStrategy::ExactHash => 0,
        };

        Self {
            threshold,
            strategy,
            max_distance,
            representatives: Vec::new(),
            exact_index: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn threshold(&self) -> SimilarityThreshold {
        self.threshold
    }

    pub fn strategy(&self) -> GroupingStrategy {
        self.strategy
    }

    /// Number of representatives created so far, including singletons
    pub fn representative_count(&self) -> usize {
        self.representatives.len()
    }

    /// Number of distinct paths observed
    pub fn observed_count(&self) -> usize {
        self.seen.len()
    }

    /// Assign `path` to the first similar representative, or make it one.
    ///
    /// A path that was already observed is ignored, so no path can end up in
    /// two groups.
    pub fn observe(&mut self, path: PathBuf, fingerprint: Fingerprint) {
        if !self.seen.insert(path.clone()) {
            debug!("Ignoring repeated path {}", path.display());
            return;
        }

        match self.find_match(&fingerprint) {
            Some(index) => {
                let representative = &mut self.representatives[index];
                debug!(
                    "{} matches {} (distance {})",
                    path.display(),
                    representative.path.display(),
                    representative.fingerprint.distance(&fingerprint)
                );
                representative.duplicates.push(path);
            }
            None => {
                let index = self.representatives.len();
                self.exact_index.entry(fingerprint).or_insert(index);
                self.representatives.push(Representative {
                    path,
                    fingerprint,
                    duplicates: Vec::new(),
                });
            }
        }
    }

    fn find_match(&self, fingerprint: &Fingerprint) -> Option<usize> {
        if self.max_distance == 0 {
            // Two representatives never share a fingerprint, so the bucket
            // lookup gives the same answer as a linear scan
            return self.exact_index.get(fingerprint).copied();
        }

        self.representatives
            .iter()
            .position(|r| r.fingerprint.distance(fingerprint) <= self.max_distance)
    }

    /// Drop singleton representatives and produce the scan result
    pub fn finalize(self) -> ScanResult {
        let total = self.representatives.len();
        let groups: Vec<DuplicateGroup> = self
            .representatives
            .into_iter()
            .filter(|r| !r.duplicates.is_empty())
            .map(|r| DuplicateGroup {
                original: r.path,
                duplicates: r.duplicates,
            })
            .collect();

        info!(
            "Grouping finished: {} representatives, {} duplicate groups at {}",
            total,
            groups.len(),
            self.threshold
        );

        ScanResult::from_groups(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn grouper(percent: u8) -> SimilarityGrouper {
        SimilarityGrouper::new(
            SimilarityThreshold::new(percent).unwrap(),
            GroupingStrategy::Threshold,
        )
    }

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/photos/{}", name))
    }

    #[test]
    fn test_first_seen_becomes_original() {
        let mut g = grouper(85);
        g.observe(p("a.png"), Fingerprint(0));
        g.observe(p("b.png"), Fingerprint(0));
        g.observe(p("c.jpg"), Fingerprint(0b1));

        let result = g.finalize();
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.duplicates_of(&p("a.png")),
            Some(&[p("b.png"), p("c.jpg")][..])
        );
    }

    #[test]
    fn test_singletons_are_dropped() {
        let mut g = grouper(85);
        g.observe(p("a.png"), Fingerprint(0));
        g.observe(p("d.png"), Fingerprint(u64::MAX));

        assert_eq!(g.representative_count(), 2);
        assert!(g.finalize().is_empty());
    }

    #[test]
    fn test_exact_threshold_requires_zero_distance() {
        let mut g = grouper(100);
        g.observe(p("a.png"), Fingerprint(0));
        g.observe(p("b.png"), Fingerprint(0));
        g.observe(p("c.jpg"), Fingerprint(0b1));

        let result = g.finalize();
        assert_eq!(result.duplicates_of(&p("a.png")), Some(&[p("b.png")][..]));
        assert!(result.duplicates_of(&p("c.jpg")).is_none());
    }

    #[test]
    fn test_first_matching_representative_wins() {
        // b is within reach of both a and c; a was created first
        let mut g = grouper(85);
        g.observe(p("a.png"), Fingerprint(0));
        g.observe(p("c.png"), Fingerprint(0x3ff));
        g.observe(p("b.png"), Fingerprint(0b1_1111));

        let result = g.finalize();
        assert_eq!(result.duplicates_of(&p("a.png")), Some(&[p("b.png")][..]));
        assert!(result.duplicates_of(&p("c.png")).is_none());
    }

    #[test]
    fn test_duplicates_are_not_chained() {
        // c is close to b but too far from the representative a
        let mut g = grouper(85);
        g.observe(p("a.png"), Fingerprint(0));
        g.observe(p("b.png"), Fingerprint(0x1ff));
        g.observe(p("c.png"), Fingerprint(0x3ffff));

        let result = g.finalize();
        assert_eq!(result.duplicates_of(&p("a.png")), Some(&[p("b.png")][..]));
        assert_eq!(result.duplicate_count(), 1);
    }

    #[test]
    fn test_repeated_path_is_ignored() {
        let mut g = grouper(85);
        g.observe(p("a.png"), Fingerprint(0));
        g.observe(p("a.png"), Fingerprint(0));

        assert_eq!(g.observed_count(), 1);
        assert!(g.finalize().is_empty());
    }

    #[test]
    fn test_exact_hash_strategy_ignores_threshold() {
        let mut g = SimilarityGrouper::new(
            SimilarityThreshold::new(70).unwrap(),
            GroupingStrategy::ExactHash,
        );
        g.observe(p("a.png"), Fingerprint(42));
        g.observe(p("b.png"), Fingerprint(43));
        g.observe(p("c.png"), Fingerprint(42));

        let result = g.finalize();
        assert_eq!(result.duplicates_of(&p("a.png")), Some(&[p("c.png")][..]));
        assert_eq!(result.duplicate_count(), 1);
    }

    #[test]
    fn test_no_path_in_two_groups() {
        let fingerprints = [0u64, 0x1, 0xff00, 0xff01, 0x3, u64::MAX, 0xff03, u64::MAX - 1];
        let mut g = grouper(90);
        for (i, fp) in fingerprints.iter().enumerate() {
            g.observe(p(&format!("{:02}.png", i)), Fingerprint(*fp));
        }
        let result = g.finalize();

        let mut all: Vec<&Path> = Vec::new();
        for group in &result {
            assert!(!group.duplicates.contains(&group.original));
            all.push(&group.original);
            all.extend(group.duplicates.iter().map(PathBuf::as_path));
        }
        let unique: HashSet<&Path> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_lower_threshold_finds_at_least_as_many_duplicates() {
        // Two well-separated clusters; members drift further from their
        // centre one bit range at a time
        let drift = [0u32, 2, 6, 11, 15, 19, 25];
        let far = 0xffff_ffff_0000_0000u64;
        let mut fingerprints = Vec::new();
        for (i, bits) in drift.iter().enumerate() {
            let low = (1u64 << bits) - 1;
            fingerprints.push((format!("a{:02}.png", i), low));
            fingerprints.push((format!("b{:02}.png", i), far | low));
        }
        fingerprints.sort();

        let count_at = |percent| {
            let mut g = grouper(percent);
            for (name, fp) in &fingerprints {
                g.observe(p(name), Fingerprint(*fp));
            }
            g.finalize().duplicate_count()
        };

        let mut previous = count_at(100);
        assert_eq!(previous, 0);
        for percent in (70..100).rev() {
            let current = count_at(percent);
            assert!(current >= previous, "{}% found fewer duplicates", percent);
            previous = current;
        }
    }
}
