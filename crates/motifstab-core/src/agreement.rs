//! Agreement between a canonical labeling and independent cluster labelings.
//!
//! Raw cluster ids are first renamed to canonical labels by majority vote,
//! then compared with the canonical labels through chance-corrected
//! statistics that do not care how clusters were numbered.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

/// Majority-vote map from raw cluster id to canonical label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMapping {
    map: HashMap<String, String>,
}

impl LabelMapping {
    /// Build from `(cluster, canonical_label)` rows in input order.
    ///
    /// Each cluster takes its most frequent canonical label; on a tie the
    /// label seen first among that cluster's rows wins.
    pub fn build_majority<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut tallies: HashMap<&str, Vec<(&str, usize)>> = HashMap::new();
        for (cluster, label) in rows {
            let tally = tallies.entry(cluster).or_default();
            match tally.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => tally.push((label, 1)),
            }
        }

        let map = tallies
            .into_iter()
            .filter_map(|(cluster, tally)| {
                let mut best: Option<(&str, usize)> = None;
                for (label, n) in tally {
                    if best.is_none_or(|(_, top)| n > top) {
                        best = Some((label, n));
                    }
                }
                best.map(|(label, _)| (cluster.to_string(), label.to_string()))
            })
            .collect();
        Self { map }
    }

    #[must_use]
    pub fn apply(&self, cluster: &str) -> Option<&str> {
        self.map.get(cluster).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries ordered by cluster id, numerically when both ids are integers.
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .map
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        out.sort_by(|a, b| cluster_order(a.0, b.0));
        out
    }
}

fn cluster_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn dense_codes<T: Ord>(values: &[T]) -> (Vec<usize>, usize) {
    let distinct: BTreeSet<&T> = values.iter().collect();
    let index: BTreeMap<&T, usize> = distinct.into_iter().enumerate().map(|(i, v)| (v, i)).collect();
    let codes = values.iter().map(|v| index[v]).collect();
    (codes, index.len())
}

/// Adjusted Rand Index of two labelings of the same items.
///
/// Returns `None` for empty input or mismatched lengths. Two labelings that
/// agree on every pair score exactly 1.0.
#[must_use]
pub fn adjusted_rand_index<T: Ord>(truth: &[T], predicted: &[T]) -> Option<f64> {
    if truth.is_empty() || truth.len() != predicted.len() {
        return None;
    }
    let (t, nt) = dense_codes(truth);
    let (p, np) = dense_codes(predicted);

    let mut contingency: HashMap<(usize, usize), i128> = HashMap::new();
    let mut row = vec![0i128; nt];
    let mut col = vec![0i128; np];
    for (&a, &b) in t.iter().zip(&p) {
        *contingency.entry((a, b)).or_insert(0) += 1;
        row[a] += 1;
        col[b] += 1;
    }

    let n = truth.len() as i128;
    let sum_sq: i128 = contingency.values().map(|c| c * c).sum();
    let row_sq: i128 = row.iter().map(|c| c * c).sum();
    let col_sq: i128 = col.iter().map(|c| c * c).sum();

    let tp = sum_sq - n;
    let fp = col_sq - sum_sq;
    let fn_ = row_sq - sum_sq;
    let tn = n * n - fp - fn_ - sum_sq;

    if fp == 0 && fn_ == 0 {
        return Some(1.0);
    }
    let num = 2.0 * ((tp * tn - fn_ * fp) as f64);
    let den = ((tp + fn_) * (fn_ + tn) + (tp + fp) * (fp + tn)) as f64;
    Some(num / den)
}

/// Unweighted Cohen's kappa over the sorted union of observed labels.
///
/// `None` for empty input, mismatched lengths, or when the expected
/// disagreement is zero (a single shared label).
#[must_use]
pub fn cohen_kappa<T: Ord>(a: &[T], b: &[T]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let labels: BTreeSet<&T> = a.iter().chain(b).collect();
    let index: BTreeMap<&T, usize> = labels.into_iter().enumerate().map(|(i, v)| (v, i)).collect();
    let k = index.len();

    let mut cm = vec![vec![0.0f64; k]; k];
    for (x, y) in a.iter().zip(b) {
        cm[index[x]][index[y]] += 1.0;
    }
    let rows: Vec<f64> = cm.iter().map(|r| r.iter().sum()).collect();
    let cols: Vec<f64> = (0..k).map(|j| cm.iter().map(|r| r[j]).sum()).collect();
    let total: f64 = rows.iter().sum();

    let mut observed = 0.0;
    let mut expected = 0.0;
    for i in 0..k {
        for j in 0..k {
            if i != j {
                observed += cm[i][j];
                expected += rows[i] * cols[j] / total;
            }
        }
    }
    if expected == 0.0 {
        return None;
    }
    Some(1.0 - observed / expected)
}

/// ARI and kappa over rows where both labels are present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgreementStats {
    pub n_joined: usize,
    pub ari: Option<f64>,
    pub kappa: Option<f64>,
}

impl AgreementStats {
    /// Drops rows with a missing label on either side before computing.
    #[must_use]
    pub fn from_pairs<'a>(rows: impl IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>) -> Self {
        let (canonical, mapped): (Vec<&str>, Vec<&str>) = rows
            .into_iter()
            .filter_map(|(c, m)| Some((c?, m?)))
            .unzip();
        Self {
            n_joined: canonical.len(),
            ari: adjusted_rand_index(&canonical, &mapped),
            kappa: cohen_kappa(&canonical, &mapped),
        }
    }
}

/// How well one canonical motif survives remapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotifPreservation {
    pub motif: String,
    pub count_in_canonical: usize,
    pub fraction_preserved: f64,
}

/// Per canonical motif, the fraction of its rows whose mapped label equals it.
///
/// Rows without a mapped label count against preservation. Output is sorted
/// by motif.
#[must_use]
pub fn per_motif_preservation<'a>(
    rows: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Vec<MotifPreservation> {
    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (canonical, mapped) in rows {
        let slot = tally.entry(canonical).or_insert((0, 0));
        slot.0 += 1;
        if mapped == Some(canonical) {
            slot.1 += 1;
        }
    }
    tally
        .into_iter()
        .map(|(motif, (total, kept))| MotifPreservation {
            motif: motif.to_string(),
            count_in_canonical: total,
            fraction_preserved: kept as f64 / total as f64,
        })
        .collect()
}

/// Linear-interpolated quantile `q` of `values`; non-finite values are ignored.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Interquartile range `Q3 - Q1`.
#[must_use]
pub fn iqr(values: &[f64]) -> Option<f64> {
    Some(quantile(values, 0.75)? - quantile(values, 0.25)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_relabeled_clusters_agree_perfectly() {
        let canonical = ["FrontEndMove", "FrontEndMove", "Other"];
        let raw = ["7", "7", "3"];
        let mapping = LabelMapping::build_majority(raw.iter().copied().zip(canonical.iter().copied()));
        assert_eq!(mapping.apply("7"), Some("FrontEndMove"));
        assert_eq!(mapping.apply("3"), Some("Other"));

        let mapped: Vec<Option<&str>> = raw.iter().map(|c| mapping.apply(c)).collect();
        let stats = AgreementStats::from_pairs(canonical.iter().map(|c| Some(*c)).zip(mapped.iter().copied()));
        assert_eq!(stats.n_joined, 3);
        assert_eq!(stats.ari, Some(1.0));
        assert_eq!(stats.kappa, Some(1.0));

        let pres = per_motif_preservation(canonical.iter().copied().zip(mapped.iter().copied()));
        assert!(pres.iter().all(|p| p.fraction_preserved == 1.0));
        assert_eq!(pres[0].motif, "FrontEndMove");
        assert_eq!(pres[0].count_in_canonical, 2);
    }

    #[test]
    fn majority_ties_keep_first_seen() {
        let rows = [("1", "B"), ("1", "A"), ("1", "A"), ("1", "B"), ("2", "C")];
        let mapping = LabelMapping::build_majority(rows);
        assert_eq!(mapping.apply("1"), Some("B"));
        assert_eq!(mapping.apply("9"), None);
    }

    #[test]
    fn entries_sort_numeric_ids_numerically() {
        let rows = [("10", "A"), ("2", "B"), ("x", "C")];
        let mapping = LabelMapping::build_majority(rows);
        let keys: Vec<&str> = mapping.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["2", "10", "x"]);
    }

    #[test]
    fn ari_matches_reference_values() {
        // sklearn: adjusted_rand_score([0,0,1,1],[0,0,1,2]) == 0.5714285714285715
        let ari = adjusted_rand_index(&[0, 0, 1, 1], &[0, 0, 1, 2]).unwrap();
        assert!((ari - 0.571_428_571_428_571_5).abs() < 1e-12);
        // Label names do not matter.
        assert_eq!(adjusted_rand_index(&["a", "a", "b"], &["z", "z", "y"]), Some(1.0));
        // Single cluster on both sides is perfect agreement.
        assert_eq!(adjusted_rand_index(&[1, 1, 1], &[2, 2, 2]), Some(1.0));
        assert_eq!(adjusted_rand_index::<u8>(&[], &[]), None);
    }

    #[test]
    fn ari_can_go_negative() {
        let ari = adjusted_rand_index(&[0, 0, 1, 1], &[0, 1, 0, 1]).unwrap();
        assert!(ari < 0.0);
    }

    #[test]
    fn kappa_matches_reference_values() {
        // sklearn: cohen_kappa_score(["a","a","b","b"],["a","b","b","b"]) == 0.5
        let k = cohen_kappa(&["a", "a", "b", "b"], &["a", "b", "b", "b"]).unwrap();
        assert!((k - 0.5).abs() < 1e-12);
        assert_eq!(cohen_kappa(&["a", "a"], &["a", "a"]), None);
        assert_eq!(cohen_kappa::<&str>(&[], &[]), None);
    }

    #[test]
    fn preservation_of_two_motifs_with_one_defector() {
        let canonical = ["A", "A", "B", "B"];
        let mapped = ["A", "B", "B", "B"];
        let pres = per_motif_preservation(canonical.iter().zip(mapped.iter()).map(|(c, m)| (*c, Some(*m))));
        assert_eq!(pres.len(), 2);
        assert_eq!(pres[0].motif, "A");
        assert_eq!(pres[0].count_in_canonical, 2);
        assert_eq!(pres[0].fraction_preserved, 0.5);
        assert_eq!(pres[1].motif, "B");
        assert_eq!(pres[1].count_in_canonical, 2);
        assert_eq!(pres[1].fraction_preserved, 1.0);
    }

    #[test]
    fn missing_side_is_dropped_from_join() {
        let rows = [
            (Some("A"), Some("A")),
            (Some("B"), None),
            (None, Some("B")),
            (Some("B"), Some("B")),
        ];
        let stats = AgreementStats::from_pairs(rows);
        assert_eq!(stats.n_joined, 2);
        assert_eq!(stats.ari, Some(1.0));

        let empty = AgreementStats::from_pairs([(Some("A"), None)]);
        assert_eq!(empty.n_joined, 0);
        assert_eq!(empty.ari, None);
        assert_eq!(empty.kappa, None);
    }

    #[test]
    fn preservation_counts_unmapped_rows_in_denominator() {
        let rows = [("A", Some("A")), ("A", None), ("B", Some("A"))];
        let pres = per_motif_preservation(rows);
        assert_eq!(pres.len(), 2);
        assert_eq!(pres[0].fraction_preserved, 0.5);
        assert_eq!(pres[1].fraction_preserved, 0.0);
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&v), Some(2.5));
        assert_eq!(quantile(&v, 0.25), Some(1.75));
        assert_eq!(iqr(&v), Some(1.5));
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(median(&[0.7]), Some(0.7));
    }
}
