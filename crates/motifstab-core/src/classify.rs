//! Motif classification of violated-cover sets.
//!
//! Two classifiers share one rule priority:
//!
//! 1. `GlobalDistortion` when at least `global_threshold` covers are violated.
//! 2. `FrontEndMove` when a front cover is violated.
//! 3. `BlockReorderExtreme` when a block/chain cover is violated.
//! 4. `DualClusterOutlier` when both an early and a late cover are violated.
//! 5. `AnchorPreservingDisorder` when something is violated but no front cover.
//! 6. `Other`.
//!
//! [`classify_first_violated`] walks a caller-supplied check-order to find the
//! cover that triggers rules 2–4, so its answer is tied to that order.
//! [`classify_any_cover`] answers from set membership alone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cover::{Cover, CoverSet, ViolatedSet};

/// Closed set of motif categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MotifLabel {
    GlobalDistortion,
    FrontEndMove,
    BlockReorderExtreme,
    DualClusterOutlier,
    AnchorPreservingDisorder,
    Other,
}

impl MotifLabel {
    /// All labels in rule-priority order.
    pub const ALL: [Self; 6] = [
        Self::GlobalDistortion,
        Self::FrontEndMove,
        Self::BlockReorderExtreme,
        Self::DualClusterOutlier,
        Self::AnchorPreservingDisorder,
        Self::Other,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GlobalDistortion => "GlobalDistortion",
            Self::FrontEndMove => "FrontEndMove",
            Self::BlockReorderExtreme => "BlockReorderExtreme",
            Self::DualClusterOutlier => "DualClusterOutlier",
            Self::AnchorPreservingDisorder => "AnchorPreservingDisorder",
            Self::Other => "Other",
        }
    }

    /// Parse a label name, accepting any casing.
    #[must_use]
    pub fn from_str_loose(raw: &str) -> Option<Self> {
        let needle = raw.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(needle))
    }
}

impl fmt::Display for MotifLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority-classifier output: the label and, for rules 2–4, the cover that fired it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Classification {
    pub label: MotifLabel,
    pub trigger: Option<Cover>,
}

impl Classification {
    const fn untriggered(label: MotifLabel) -> Self {
        Self {
            label,
            trigger: None,
        }
    }
}

/// First cover of `check_order` that is violated and accepted by `member`.
fn first_violated<'a>(
    violated: &ViolatedSet,
    check_order: &'a [Cover],
    member: impl Fn(&Cover) -> bool,
) -> Option<&'a Cover> {
    check_order
        .iter()
        .find(|cover| violated.contains(*cover) && member(*cover))
}

/// Classify by scanning `check_order` for the first matching violated cover.
///
/// Rules 2–4 fire only when the scan reaches a qualifying cover, so a
/// check-order that omits a violated cover can push the result to a later rule.
#[must_use]
pub fn classify_first_violated(
    violated: &ViolatedSet,
    check_order: &[Cover],
    covers: &CoverSet,
) -> Classification {
    if violated.len() >= covers.global_threshold() {
        return Classification::untriggered(MotifLabel::GlobalDistortion);
    }

    if let Some(hit) = first_violated(violated, check_order, |c| covers.front().contains(c)) {
        return Classification {
            label: MotifLabel::FrontEndMove,
            trigger: Some(*hit),
        };
    }

    if let Some(hit) = first_violated(violated, check_order, |c| covers.block().contains(c)) {
        return Classification {
            label: MotifLabel::BlockReorderExtreme,
            trigger: Some(*hit),
        };
    }

    if intersects(violated, covers.early()) && intersects(violated, covers.late()) {
        let dual = |c: &Cover| covers.early().contains(c) || covers.late().contains(c);
        if let Some(hit) = first_violated(violated, check_order, dual) {
            return Classification {
                label: MotifLabel::DualClusterOutlier,
                trigger: Some(*hit),
            };
        }
    }

    Classification::untriggered(fallback_label(violated, covers))
}

/// Classify from set membership only; identical input always yields the same label.
#[must_use]
pub fn classify_any_cover(violated: &ViolatedSet, covers: &CoverSet) -> MotifLabel {
    if violated.len() >= covers.global_threshold() {
        return MotifLabel::GlobalDistortion;
    }
    if intersects(violated, covers.front()) {
        return MotifLabel::FrontEndMove;
    }
    if intersects(violated, covers.block()) {
        return MotifLabel::BlockReorderExtreme;
    }
    if intersects(violated, covers.early()) && intersects(violated, covers.late()) {
        return MotifLabel::DualClusterOutlier;
    }
    fallback_label(violated, covers)
}

// Rules 5 and 6.
fn fallback_label(violated: &ViolatedSet, covers: &CoverSet) -> MotifLabel {
    if !violated.is_empty() && !intersects(violated, covers.front()) {
        MotifLabel::AnchorPreservingDisorder
    } else {
        MotifLabel::Other
    }
}

fn intersects(violated: &ViolatedSet, subset: &std::collections::BTreeSet<Cover>) -> bool {
    subset.iter().any(|c| violated.contains(c))
}
