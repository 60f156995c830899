//! Distance of a permutation from the canonical order `1..=n`.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::MetricsConfig;
use crate::cover::{Cover, EventId};
use crate::perm::is_complete_permutation;

// Weights of the two terms in the directional score.
const KENDALL_WEIGHT: f64 = 0.6;
const DISPLACEMENT_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PermutationMetrics {
    /// Normalised Kendall tau distance to the canonical order.
    pub kendall_distance: f64,
    pub displacement_scaled: f64,
    /// Covers `(a, b)` with `a` not strictly ahead of `b`.
    pub adjacency_violations: usize,
    /// Largest distance any single event moved.
    pub single_move: usize,
    /// Longest run of consecutive canonical events kept contiguous and in order.
    pub max_block: usize,
    /// Kendall distance to the reversed canonical order.
    pub order_dual_proximity: f64,
    pub score_dir: f64,
}

/// Fraction of pairs that `perm` orders differently from `reference`.
///
/// Both slices must hold the same events; events of `perm` missing from
/// `reference` make the result meaningless and are ranked last.
#[must_use]
pub fn kendall_distance(reference: &[EventId], perm: &[EventId]) -> f64 {
    let rank: HashMap<EventId, usize> = reference.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let ranks: Vec<usize> = perm
        .iter()
        .map(|v| rank.get(v).copied().unwrap_or(usize::MAX))
        .collect();
    let n = ranks.len();
    let mut inversions = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            if ranks[i] > ranks[j] {
                inversions += 1;
            }
        }
    }
    let max = n * n.saturating_sub(1) / 2;
    if max == 0 {
        0.0
    } else {
        inversions as f64 / max as f64
    }
}

/// Metrics of one complete permutation of `1..=perm.len()`.
///
/// Returns `None` when `perm` is not a complete permutation. Covers naming
/// events outside the domain are skipped.
#[must_use]
pub fn compute_metrics(
    perm: &[EventId],
    covers: &[Cover],
    config: &MetricsConfig,
) -> Option<PermutationMetrics> {
    let n = EventId::try_from(perm.len()).ok()?;
    if !is_complete_permutation(perm, n) {
        return None;
    }
    let canonical: Vec<EventId> = (1..=n).collect();

    // pos[e - 1] is the slot of event e.
    let mut pos = vec![0usize; perm.len()];
    for (slot, &event) in perm.iter().enumerate() {
        pos[(event - 1) as usize] = slot;
    }

    let kendall = kendall_distance(&canonical, perm);

    let disp: f64 = pos
        .iter()
        .enumerate()
        .map(|(i, &p)| (p.abs_diff(i) as f64).powf(config.displacement_exponent()))
        .sum();
    let displacement_scaled = disp * (1.0 + config.displacement_scale() * disp * disp);

    let in_domain = |e: EventId| e >= 1 && e <= n;
    let adjacency_violations = covers
        .iter()
        .filter(|c| in_domain(c.before) && in_domain(c.after))
        .filter(|c| pos[(c.before - 1) as usize] >= pos[(c.after - 1) as usize])
        .count();

    let single_move = pos.iter().enumerate().map(|(i, &p)| p.abs_diff(i)).max().unwrap_or(0);

    let mut max_block = 1;
    let mut run = 1;
    for w in perm.windows(2) {
        if w[1] == w[0] + 1 {
            run += 1;
            max_block = max_block.max(run);
        } else {
            run = 1;
        }
    }

    let reversed: Vec<EventId> = canonical.iter().rev().copied().collect();
    let order_dual_proximity = kendall_distance(&reversed, perm);

    let score_dir = 1.0
        - (KENDALL_WEIGHT * kendall
            + DISPLACEMENT_WEIGHT * (displacement_scaled / (1.0 + displacement_scaled)));

    Some(PermutationMetrics {
        kendall_distance: kendall,
        displacement_scaled,
        adjacency_violations,
        single_move,
        max_block,
        order_dual_proximity,
        score_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::chain_covers;

    #[test]
    fn identity_is_at_distance_zero() {
        let perm: Vec<EventId> = (1..=6).collect();
        let m = compute_metrics(&perm, &chain_covers(6), &MetricsConfig::default()).unwrap();
        assert_eq!(m.kendall_distance, 0.0);
        assert_eq!(m.displacement_scaled, 0.0);
        assert_eq!(m.adjacency_violations, 0);
        assert_eq!(m.single_move, 0);
        assert_eq!(m.max_block, 6);
        assert_eq!(m.order_dual_proximity, 1.0);
        assert_eq!(m.score_dir, 1.0);
    }

    #[test]
    fn reversal_is_maximally_distant() {
        let perm = [4, 3, 2, 1];
        let m = compute_metrics(&perm, &chain_covers(4), &MetricsConfig::default()).unwrap();
        assert_eq!(m.kendall_distance, 1.0);
        assert_eq!(m.order_dual_proximity, 0.0);
        assert_eq!(m.adjacency_violations, 3);
        assert_eq!(m.single_move, 3);
        assert_eq!(m.max_block, 1);
    }

    #[test]
    fn single_swap_values() {
        let perm = [2, 1, 3];
        let cfg = MetricsConfig::new(1.0, 0.0).unwrap();
        let m = compute_metrics(&perm, &chain_covers(3), &cfg).unwrap();
        assert!((m.kendall_distance - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.displacement_scaled, 2.0);
        assert_eq!(m.adjacency_violations, 1);
        assert_eq!(m.max_block, 1);
        let expected = 1.0 - (0.6 / 3.0 + 0.4 * (2.0 / 3.0));
        assert!((m.score_dir - expected).abs() < 1e-12);
    }

    #[test]
    fn block_move_keeps_contiguous_run() {
        let perm = [4, 5, 6, 1, 2, 3];
        let m = compute_metrics(&perm, &[], &MetricsConfig::default()).unwrap();
        assert_eq!(m.max_block, 3);
        assert_eq!(m.single_move, 3);
    }

    #[test]
    fn incomplete_permutation_skipped() {
        let cfg = MetricsConfig::default();
        assert!(compute_metrics(&[1, 2, 2], &[], &cfg).is_none());
        assert!(compute_metrics(&[1, 3], &[], &cfg).is_none());
    }

    #[test]
    fn out_of_domain_covers_ignored() {
        let covers = [Cover::new(2, 1), Cover::new(1, 40)];
        let m = compute_metrics(&[1, 2], &covers, &MetricsConfig::default()).unwrap();
        assert_eq!(m.adjacency_violations, 1);
    }
}
