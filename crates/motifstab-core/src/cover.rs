//! Cover constraints and violation detection.
//!
//! A cover `(a, b)` states that event `a` precedes event `b` in the canonical
//! order. The canonical cover list is fixed; its front / block / early / late
//! subsets drive the classification rules in [`crate::classify`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Identifier of one structural event, `1..=DOMAIN_SIZE` for the canonical domain.
pub type EventId = u32;

/// Size of the canonical event domain.
pub const DOMAIN_SIZE: EventId = 12;

/// Violation count at which a permutation is labelled `GlobalDistortion`.
pub const GLOBAL_DISTORTION_THRESHOLD: usize = 4;

/// Ordered-pair constraint: `before` must appear ahead of `after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cover {
    pub before: EventId,
    pub after: EventId,
}

impl Cover {
    #[must_use]
    pub const fn new(before: EventId, after: EventId) -> Self {
        Self { before, after }
    }
}

impl fmt::Display for Cover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.before, self.after)
    }
}

/// Violated covers of one permutation. Sorted, so rendering is deterministic.
pub type ViolatedSet = BTreeSet<Cover>;

const CANONICAL_COVERS: [Cover; 12] = [
    Cover::new(1, 3),
    Cover::new(1, 4),
    Cover::new(1, 5),
    Cover::new(3, 8),
    Cover::new(4, 8),
    Cover::new(5, 6),
    Cover::new(6, 7),
    Cover::new(7, 8),
    Cover::new(8, 9),
    Cover::new(9, 10),
    Cover::new(10, 11),
    Cover::new(11, 12),
];

const FRONT_COVERS: [Cover; 3] = [Cover::new(1, 3), Cover::new(1, 4), Cover::new(1, 5)];

const BLOCK_COVERS: [Cover; 6] = [
    Cover::new(3, 8),
    Cover::new(4, 8),
    Cover::new(5, 6),
    Cover::new(6, 7),
    Cover::new(7, 8),
    Cover::new(8, 9),
];

const LATE_COVERS: [Cover; 3] = [Cover::new(9, 10), Cover::new(10, 11), Cover::new(11, 12)];

/// The cover list plus the rule subsets derived from it.
///
/// The list order is the baseline check-order used by the priority classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverSet {
    covers: Vec<Cover>,
    front: BTreeSet<Cover>,
    block: BTreeSet<Cover>,
    early: BTreeSet<Cover>,
    late: BTreeSet<Cover>,
    global_threshold: usize,
}

impl CoverSet {
    /// The twelve canonical covers over events `1..=12`. Early covers are the front covers.
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            covers: CANONICAL_COVERS.to_vec(),
            front: FRONT_COVERS.into_iter().collect(),
            block: BLOCK_COVERS.into_iter().collect(),
            early: FRONT_COVERS.into_iter().collect(),
            late: LATE_COVERS.into_iter().collect(),
            global_threshold: GLOBAL_DISTORTION_THRESHOLD,
        }
    }

    /// Build a custom cover configuration. Every subset member must be in `covers`.
    pub fn new(
        covers: Vec<Cover>,
        front: impl IntoIterator<Item = Cover>,
        block: impl IntoIterator<Item = Cover>,
        early: impl IntoIterator<Item = Cover>,
        late: impl IntoIterator<Item = Cover>,
        global_threshold: usize,
    ) -> Result<Self, ConfigError> {
        if global_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        let mut seen = BTreeSet::new();
        for cover in &covers {
            if !seen.insert(*cover) {
                return Err(ConfigError::DuplicateCover(*cover));
            }
        }
        let subset = |name: &'static str, items: BTreeSet<Cover>| {
            match items.iter().find(|c| !seen.contains(*c)) {
                Some(cover) => Err(ConfigError::UnknownSubsetCover {
                    cover: *cover,
                    subset: name,
                }),
                None => Ok(items),
            }
        };
        let front = subset("front", front.into_iter().collect())?;
        let block = subset("block", block.into_iter().collect())?;
        let early = subset("early", early.into_iter().collect())?;
        let late = subset("late", late.into_iter().collect())?;
        Ok(Self {
            covers,
            front,
            block,
            early,
            late,
            global_threshold,
        })
    }

    /// Covers in baseline check-order.
    #[must_use]
    pub fn covers(&self) -> &[Cover] {
        &self.covers
    }

    #[must_use]
    pub fn front(&self) -> &BTreeSet<Cover> {
        &self.front
    }

    #[must_use]
    pub fn block(&self) -> &BTreeSet<Cover> {
        &self.block
    }

    #[must_use]
    pub fn early(&self) -> &BTreeSet<Cover> {
        &self.early
    }

    #[must_use]
    pub fn late(&self) -> &BTreeSet<Cover> {
        &self.late
    }

    #[must_use]
    pub const fn global_threshold(&self) -> usize {
        self.global_threshold
    }

    /// Covers of this set violated by `perm`.
    #[must_use]
    pub fn violated_by(&self, perm: &[EventId]) -> ViolatedSet {
        violated_covers(perm, &self.covers)
    }
}

impl Default for CoverSet {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Covers `(a, b)` with both ends present in `perm` and `a` placed after `b`.
///
/// Covers that mention an event missing from `perm` are skipped. When an
/// event repeats, its last position wins.
#[must_use]
pub fn violated_covers(perm: &[EventId], covers: &[Cover]) -> ViolatedSet {
    let pos: HashMap<EventId, usize> = perm.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    covers
        .iter()
        .filter(|c| match (pos.get(&c.before), pos.get(&c.after)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        })
        .copied()
        .collect()
}

/// `"(a,b);(c,d)"` in sorted cover order; empty string for no violations.
#[must_use]
pub fn format_violated(violated: &ViolatedSet) -> String {
    violated
        .iter()
        .map(Cover::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// Chain covers `(i, i + 1)` for `i` in `1..n`.
#[must_use]
pub fn chain_covers(n: EventId) -> Vec<Cover> {
    (1..n).map(|i| Cover::new(i, i + 1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_permutation_violates_nothing() {
        let covers = CoverSet::canonical();
        let identity: Vec<EventId> = (1..=DOMAIN_SIZE).collect();
        assert!(covers.violated_by(&identity).is_empty());
    }

    #[test]
    fn front_move_detected() {
        let covers = [Cover::new(1, 3), Cover::new(1, 4)];
        let violated = violated_covers(&[3, 1, 2, 4], &covers);
        assert_eq!(violated.into_iter().collect::<Vec<_>>(), vec![Cover::new(1, 3)]);
    }

    #[test]
    fn absent_events_are_not_violations() {
        let covers = [Cover::new(1, 3), Cover::new(20, 2)];
        let violated = violated_covers(&[2, 1], &covers);
        assert!(violated.is_empty());
    }

    #[test]
    fn violated_set_ignores_cover_list_order() {
        let perm = [12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1];
        let forward = violated_covers(&perm, &CANONICAL_COVERS);
        let mut reversed = CANONICAL_COVERS.to_vec();
        reversed.reverse();
        assert_eq!(forward, violated_covers(&perm, &reversed));
        assert_eq!(forward.len(), CANONICAL_COVERS.len());
    }

    #[test]
    fn order_preserving_relabel_keeps_violations() {
        // Shift every identifier by 100; covers shift with them.
        let perm = [2, 1, 3, 5, 4, 6, 7, 9, 8, 10, 12, 11];
        let covers = CoverSet::canonical();
        let base = covers.violated_by(&perm);

        let shifted_perm: Vec<EventId> = perm.iter().map(|v| v + 100).collect();
        let shifted_covers: Vec<Cover> = covers
            .covers()
            .iter()
            .map(|c| Cover::new(c.before + 100, c.after + 100))
            .collect();
        let shifted = violated_covers(&shifted_perm, &shifted_covers);
        let unshifted: ViolatedSet = shifted
            .iter()
            .map(|c| Cover::new(c.before - 100, c.after - 100))
            .collect();
        assert_eq!(base, unshifted);
        assert!(base.iter().all(|c| covers.covers().contains(c)));
    }

    #[test]
    fn format_is_sorted_and_semicolon_joined() {
        let violated: ViolatedSet = [Cover::new(8, 9), Cover::new(1, 3)].into_iter().collect();
        assert_eq!(format_violated(&violated), "(1,3);(8,9)");
        assert_eq!(format_violated(&ViolatedSet::new()), "");
    }

    #[test]
    fn custom_sets_validate_membership() {
        let covers = vec![Cover::new(1, 3), Cover::new(1, 4)];
        let err = CoverSet::new(covers.clone(), [Cover::new(2, 3)], [], [], [], 4).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSubsetCover { subset: "front", .. }));

        let dup = vec![Cover::new(1, 3), Cover::new(1, 3)];
        assert!(matches!(
            CoverSet::new(dup, [], [], [], [], 4),
            Err(ConfigError::DuplicateCover(_))
        ));
        assert!(matches!(
            CoverSet::new(covers, [], [], [], [], 0),
            Err(ConfigError::ZeroThreshold)
        ));
    }

    #[test]
    fn chain_covers_link_neighbours() {
        assert_eq!(
            chain_covers(4),
            vec![Cover::new(1, 2), Cover::new(2, 3), Cover::new(3, 4)]
        );
        assert!(chain_covers(1).is_empty());
    }
}
