//! Monte Carlo stability of the priority classifier under random check-orders.
//!
//! For each permutation the baseline label comes from the cover list's own
//! order. The estimator then draws `K` uniformly random check-orders and
//! reports how often the label (and the triggering cover) matches the
//! baseline, together with the modal label across draws.
//!
//! Randomness is always passed in. [`rng_for_permutation`] derives an
//! independent stream per permutation index from one run seed, so results do
//! not depend on the order permutations are processed in.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::classify::{MotifLabel, classify_any_cover, classify_first_violated};
use crate::config::StabilityConfig;
use crate::cover::{Cover, CoverSet, EventId, ViolatedSet};

/// One permutation's stability result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityRecord {
    pub baseline_label: MotifLabel,
    pub baseline_trigger: Option<Cover>,
    pub any_cover_label: MotifLabel,
    /// Fraction of random check-orders that reproduced `baseline_label`.
    pub stability_fraction: f64,
    /// Fraction of random check-orders that reproduced label and trigger.
    pub trigger_stability: f64,
    pub modal_label: MotifLabel,
    /// Random check-orders drawn; zero when nothing was violated.
    pub samples_drawn: usize,
}

impl StabilityRecord {
    /// True when the priority and any-cover classifiers disagree on the baseline.
    #[must_use]
    pub fn classifiers_disagree(&self) -> bool {
        self.baseline_label != self.any_cover_label
    }
}

/// Independent random stream for permutation `index` under run `seed`.
#[must_use]
pub fn rng_for_permutation(seed: u64, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index);
    rng
}

/// Stability estimator bound to one cover configuration.
#[derive(Debug, Clone)]
pub struct StabilityEstimator {
    covers: CoverSet,
    baseline_order: Vec<Cover>,
    config: StabilityConfig,
}

impl StabilityEstimator {
    /// Baseline check-order is the cover list order of `covers`.
    #[must_use]
    pub fn new(covers: CoverSet, config: StabilityConfig) -> Self {
        let baseline_order = covers.covers().to_vec();
        Self {
            covers,
            baseline_order,
            config,
        }
    }

    /// Replace the baseline check-order.
    #[must_use]
    pub fn with_baseline_order(mut self, order: Vec<Cover>) -> Self {
        self.baseline_order = order;
        self
    }

    #[must_use]
    pub fn covers(&self) -> &CoverSet {
        &self.covers
    }

    #[must_use]
    pub fn baseline_order(&self) -> &[Cover] {
        &self.baseline_order
    }

    #[must_use]
    pub const fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Estimate stability of permutation `index` using its derived stream.
    #[must_use]
    pub fn estimate_indexed(&self, perm: &[EventId], index: u64) -> StabilityRecord {
        let mut rng = rng_for_permutation(self.config.seed(), index);
        self.estimate(perm, &mut rng)
    }

    /// Estimate stability of `perm` drawing check-orders from `rng`.
    pub fn estimate<R: rand::Rng + ?Sized>(&self, perm: &[EventId], rng: &mut R) -> StabilityRecord {
        let violated = self.covers.violated_by(perm);
        self.estimate_violated(&violated, rng)
    }

    /// Estimate stability for an already computed violated set.
    pub fn estimate_violated<R: rand::Rng + ?Sized>(
        &self,
        violated: &ViolatedSet,
        rng: &mut R,
    ) -> StabilityRecord {
        let baseline = classify_first_violated(violated, &self.baseline_order, &self.covers);
        let any_cover_label = classify_any_cover(violated, &self.covers);

        if violated.is_empty() {
            return StabilityRecord {
                baseline_label: baseline.label,
                baseline_trigger: baseline.trigger,
                any_cover_label,
                stability_fraction: 1.0,
                trigger_stability: 1.0,
                modal_label: baseline.label,
                samples_drawn: 0,
            };
        }

        let samples = self.config.samples();
        let mut order = self.covers.covers().to_vec();
        let mut tally = LabelTally::default();
        let mut same_label = 0usize;
        let mut same_classification = 0usize;

        for _ in 0..samples {
            order.shuffle(rng);
            let sampled = classify_first_violated(violated, &order, &self.covers);
            tally.record(sampled.label);
            if sampled.label == baseline.label {
                same_label += 1;
            }
            if sampled == baseline {
                same_classification += 1;
            }
        }

        StabilityRecord {
            baseline_label: baseline.label,
            baseline_trigger: baseline.trigger,
            any_cover_label,
            stability_fraction: same_label as f64 / samples as f64,
            trigger_stability: same_classification as f64 / samples as f64,
            modal_label: tally.modal().unwrap_or(baseline.label),
            samples_drawn: samples,
        }
    }
}

/// Label counts in first-seen order; the mode breaks ties by first appearance.
#[derive(Debug, Default)]
struct LabelTally {
    counts: Vec<(MotifLabel, usize)>,
}

impl LabelTally {
    fn record(&mut self, label: MotifLabel) {
        match self.counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((label, 1)),
        }
    }

    fn modal(&self) -> Option<MotifLabel> {
        let mut best: Option<(MotifLabel, usize)> = None;
        for &(label, n) in &self.counts {
            if best.is_none_or(|(_, top)| n > top) {
                best = Some((label, n));
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Modal label of a slice; ties go to the label seen first.
#[must_use]
pub fn modal_label(labels: &[MotifLabel]) -> Option<MotifLabel> {
    let mut tally = LabelTally::default();
    for &label in labels {
        tally.record(label);
    }
    tally.modal()
}
