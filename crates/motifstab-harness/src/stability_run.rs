//! `stability` stage: per-permutation labels and check-order stability.

use std::collections::BTreeMap;
use std::path::PathBuf;

use motifstab_core::cover::format_violated;
use motifstab_core::{CoverSet, MotifLabel, StabilityConfig, StabilityEstimator, StabilityRecord, ViolatedSet};

use crate::context::StageContext;
use crate::error::HarnessError;
use crate::permutations::{PermColumns, PermutationRow, load_permutations};
use crate::report::StageReport;
use crate::table::{TableWriter, format_f64};

pub const PER_PERMUTATION_FILE: &str = "motif_stability_per_permutation.csv";
pub const SUMMARY_FILE: &str = "motif_stability_summary.csv";

/// Stability below this marks a permutation as unstable.
pub const DEFAULT_UNSTABLE_THRESHOLD: f64 = 0.40;

#[derive(Debug, Clone)]
pub struct StabilityStageConfig {
    pub input: PathBuf,
    pub columns: PermColumns,
    pub stability: StabilityConfig,
    pub unstable_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct StabilityRow {
    pub index: usize,
    pub orig_motif: String,
    pub perm_str: String,
    pub violated: ViolatedSet,
    pub record: StabilityRecord,
}

/// Per-label count of unstable permutations.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStability {
    pub label: MotifLabel,
    pub total_rows: usize,
    pub unstable_count: usize,
    pub fraction_unstable: f64,
}

/// Estimate every row; each row draws from its own stream keyed by its index.
#[must_use]
pub fn compute_rows(rows: &[PermutationRow], estimator: &StabilityEstimator) -> Vec<StabilityRow> {
    rows.iter()
        .map(|r| {
            let violated = estimator.covers().violated_by(&r.perm);
            let mut rng = motifstab_core::stability::rng_for_permutation(
                estimator.config().seed(),
                r.index as u64,
            );
            let record = estimator.estimate_violated(&violated, &mut rng);
            StabilityRow {
                index: r.index,
                orig_motif: r.orig_motif.clone(),
                perm_str: r.perm_str.clone(),
                violated,
                record,
            }
        })
        .collect()
}

#[must_use]
pub fn per_permutation_table(rows: &[StabilityRow]) -> String {
    let mut w = TableWriter::new(&[
        "index",
        "orig_motif",
        "perm_str",
        "violated_covers",
        "baseline_first_label",
        "baseline_trigger",
        "any_cover_label",
        "stability_fraction_first",
        "trigger_stability_first",
        "modal_label_first",
    ]);
    for r in rows {
        let rec = &r.record;
        w.push_row([
            r.index.to_string(),
            r.orig_motif.clone(),
            r.perm_str.clone(),
            format_violated(&r.violated),
            rec.baseline_label.to_string(),
            rec.baseline_trigger.map(|c| c.to_string()).unwrap_or_default(),
            rec.any_cover_label.to_string(),
            format_f64(rec.stability_fraction),
            format_f64(rec.trigger_stability),
            rec.modal_label.to_string(),
        ]);
    }
    w.finish()
}

/// Group by baseline label; most unstable labels first, ties by label name.
#[must_use]
pub fn summarize_by_label(rows: &[StabilityRow], threshold: f64) -> Vec<LabelStability> {
    let mut groups: BTreeMap<MotifLabel, (usize, usize)> = BTreeMap::new();
    for r in rows {
        let slot = groups.entry(r.record.baseline_label).or_insert((0, 0));
        slot.0 += 1;
        if r.record.stability_fraction < threshold {
            slot.1 += 1;
        }
    }
    let mut out: Vec<LabelStability> = groups
        .into_iter()
        .map(|(label, (total, unstable))| LabelStability {
            label,
            total_rows: total,
            unstable_count: unstable,
            fraction_unstable: unstable as f64 / total as f64,
        })
        .collect();
    out.sort_by(|a, b| {
        b.unstable_count
            .cmp(&a.unstable_count)
            .then_with(|| a.label.as_str().cmp(b.label.as_str()))
    });
    out
}

#[must_use]
pub fn summary_table(summary: &[LabelStability]) -> String {
    let mut w = TableWriter::new(&[
        "baseline_first_label",
        "total_rows",
        "unstable_count",
        "fraction_unstable",
    ]);
    for s in summary {
        w.push_row([
            s.label.to_string(),
            s.total_rows.to_string(),
            s.unstable_count.to_string(),
            format_f64(s.fraction_unstable),
        ]);
    }
    w.finish()
}

pub fn run(config: &StabilityStageConfig, ctx: &mut StageContext) -> Result<StageReport, HarnessError> {
    motifstab_core::config::check_unit_interval("unstable threshold", config.unstable_threshold)?;
    let input = load_permutations(&config.input, &config.columns)?;
    ctx.warn_overlong(&input.origin, &input.overlong)?;
    for r in input.empty_rows() {
        ctx.warn_row("no_event_tokens", &input.origin, r.line, "permutation has no parseable tokens")?;
    }

    let estimator = StabilityEstimator::new(CoverSet::canonical(), config.stability);
    let rows = compute_rows(&input.rows, &estimator);
    let summary = summarize_by_label(&rows, config.unstable_threshold);

    ctx.write_artifact(PER_PERMUTATION_FILE, "table", &per_permutation_table(&rows))?;
    ctx.write_artifact(SUMMARY_FILE, "table", &summary_table(&summary))?;

    let n = rows.len();
    ctx.record_counts(n, input.empty_rows().count());
    let unstable = summary.iter().map(|s| s.unstable_count).sum::<usize>();
    let disagree = rows.iter().filter(|r| r.record.classifiers_disagree()).count();
    let trigger_unstable = rows
        .iter()
        .filter(|r| r.record.trigger_stability < 1.0)
        .count();

    let mut report = StageReport::new("Check-order stability", ctx.stage().as_str());
    report
        .metric("input", &input.origin)
        .metric("permutations", n)
        .metric("samples_per_permutation", config.stability.samples())
        .metric("seed", config.stability.seed())
        .metric("unstable_threshold", format_f64(config.unstable_threshold))
        .metric("unstable_permutations", unstable)
        .metric("baseline_vs_any_cover_disagreements", disagree)
        .metric("disagreement_rate", rate(disagree, n))
        .metric("order_dependent_triggers", trigger_unstable);
    let empty = input.empty_rows().count();
    if empty > 0 {
        report.note(format!("{empty} permutation(s) had no parseable event tokens"));
    }
    if !input.overlong.is_empty() {
        report.note(format!(
            "{} row(s) had more fields than the header; extra fields were dropped",
            input.overlong.len()
        ));
    }
    Ok(report)
}

fn rate(count: usize, total: usize) -> String {
    if total == 0 {
        crate::table::NA.to_string()
    } else {
        format_f64(count as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permutations::from_table;
    use crate::table::Table;

    fn rows_for(text: &str, samples: usize) -> Vec<StabilityRow> {
        let t = Table::parse(text, "mem").unwrap();
        let input = from_table(&t, &PermColumns::default()).unwrap();
        let est = StabilityEstimator::new(
            CoverSet::canonical(),
            StabilityConfig::new(samples, 0).unwrap(),
        );
        compute_rows(&input.rows, &est)
    }

    #[test]
    fn per_permutation_columns_and_values() {
        let rows = rows_for(
            "motif,perm\nFEM,3 1 2 4 5 6 7 8 9 10 11 12\nID,1 2 3 4 5 6 7 8 9 10 11 12\n",
            20,
        );
        let text = per_permutation_table(&rows);
        let t = Table::parse(&text, "out").unwrap();
        assert_eq!(t.headers()[4], "baseline_first_label");
        let first = &t.rows()[0];
        assert_eq!(first.get(3), "(1,3)");
        assert_eq!(first.get(4), "FrontEndMove");
        assert_eq!(first.get(5), "(1,3)");
        assert_eq!(first.get(7), "1");
        let second = &t.rows()[1];
        assert_eq!(second.get(3), "");
        assert_eq!(second.get(4), "Other");
        assert_eq!(second.get(9), "Other");
    }

    #[test]
    fn row_results_do_not_depend_on_neighbours() {
        let text_a = "motif,perm\nA,1 2 3\nB,3 4 1 2 5 6 7 8 9 10 11 12\n";
        let text_b = "motif,perm\nA,9 9 9\nB,3 4 1 2 5 6 7 8 9 10 11 12\n";
        let a = rows_for(text_a, 40);
        let b = rows_for(text_b, 40);
        assert_eq!(a[1].record, b[1].record);
    }

    #[test]
    fn summary_sorted_by_unstable_count() {
        let mut rows = rows_for(
            "motif,perm\nx,3 1 2\ny,1 2 3\nz,2 1 3\n",
            5,
        );
        rows[0].record.stability_fraction = 0.1;
        rows[1].record.stability_fraction = 0.39;
        rows[1].record.baseline_label = MotifLabel::FrontEndMove;
        let summary = summarize_by_label(&rows, 0.40);
        assert_eq!(summary[0].label, MotifLabel::FrontEndMove);
        assert_eq!(summary[0].unstable_count, 2);
        assert_eq!(summary[0].fraction_unstable, 1.0);
        assert!(summary.iter().skip(1).all(|s| s.unstable_count == 0));
    }
}
