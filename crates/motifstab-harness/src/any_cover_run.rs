//! `any-cover` stage: order-invariant labels and violation tallies.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use motifstab_core::cover::format_violated;
use motifstab_core::{Cover, CoverSet, MotifLabel, ViolatedSet, classify_any_cover};

use crate::context::StageContext;
use crate::error::HarnessError;
use crate::permutations::{PermColumns, PermutationRow, load_permutations};
use crate::report::StageReport;
use crate::table::TableWriter;

pub const PER_PERMUTATION_FILE: &str = "any_cover_labels_per_permutation.csv";
pub const COUNTS_FILE: &str = "anycover_motif_summary.csv";
pub const CONFUSION_FILE: &str = "orig_vs_anycover_confusion.csv";
pub const ADJACENCY_FILE: &str = "adjacency_any_occurrence_counts.csv";

#[derive(Debug, Clone)]
pub struct AnyCoverStageConfig {
    pub input: PathBuf,
    pub columns: PermColumns,
}

#[derive(Debug, Clone)]
pub struct AnyCoverRow {
    pub index: usize,
    pub orig_motif: String,
    pub perm_str: String,
    pub violated: ViolatedSet,
    pub label: MotifLabel,
}

#[must_use]
pub fn compute_rows(rows: &[PermutationRow], covers: &CoverSet) -> Vec<AnyCoverRow> {
    rows.iter()
        .map(|r| {
            let violated = covers.violated_by(&r.perm);
            let label = classify_any_cover(&violated, covers);
            AnyCoverRow {
                index: r.index,
                orig_motif: r.orig_motif.clone(),
                perm_str: r.perm_str.clone(),
                violated,
                label,
            }
        })
        .collect()
}

/// `(label, count)` by descending count, ties by label name.
#[must_use]
pub fn label_counts(rows: &[AnyCoverRow]) -> Vec<(MotifLabel, usize)> {
    let mut counts: BTreeMap<MotifLabel, usize> = BTreeMap::new();
    for r in rows {
        *counts.entry(r.label).or_insert(0) += 1;
    }
    let mut out: Vec<_> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    out
}

/// `(cover, permutations violating it)` by descending count, ties by cover.
#[must_use]
pub fn cover_counts(rows: &[AnyCoverRow]) -> Vec<(Cover, usize)> {
    let mut counts: BTreeMap<Cover, usize> = BTreeMap::new();
    for c in rows.iter().flat_map(|r| r.violated.iter()) {
        *counts.entry(*c).or_insert(0) += 1;
    }
    let mut out: Vec<_> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Original motif as a row key: known label names in any casing collapse to
/// their canonical spelling, anything else is kept trimmed.
#[must_use]
pub fn normalize_orig_motif(raw: &str) -> String {
    MotifLabel::from_str_loose(raw).map_or_else(|| raw.trim().to_string(), |l| l.as_str().to_string())
}

/// Cross-tabulation of original motif (rows) by any-cover label (columns).
#[must_use]
pub fn confusion_table(rows: &[AnyCoverRow]) -> String {
    let labels: BTreeSet<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    let mut cells: BTreeMap<String, BTreeMap<&str, usize>> = BTreeMap::new();
    for r in rows {
        *cells
            .entry(normalize_orig_motif(&r.orig_motif))
            .or_default()
            .entry(r.label.as_str())
            .or_insert(0) += 1;
    }

    let mut headers = vec!["orig_motif"];
    headers.extend(labels.iter().copied());
    let mut w = TableWriter::new(&headers);
    for (motif, row) in &cells {
        let mut fields = vec![motif.clone()];
        fields.extend(labels.iter().map(|l| row.get(l).copied().unwrap_or(0).to_string()));
        w.push_row(fields);
    }
    w.finish()
}

pub fn run(config: &AnyCoverStageConfig, ctx: &mut StageContext) -> Result<StageReport, HarnessError> {
    let input = load_permutations(&config.input, &config.columns)?;
    ctx.warn_overlong(&input.origin, &input.overlong)?;
    for r in input.empty_rows() {
        ctx.warn_row("no_event_tokens", &input.origin, r.line, "permutation has no parseable tokens")?;
    }
    let rows = compute_rows(&input.rows, &CoverSet::canonical());
    ctx.record_counts(rows.len(), input.empty_rows().count());

    let mut per = TableWriter::new(&["index", "orig_motif", "perm_str", "violated_covers", "any_cover_label"]);
    for r in &rows {
        per.push_row([
            r.index.to_string(),
            r.orig_motif.clone(),
            r.perm_str.clone(),
            format_violated(&r.violated),
            r.label.to_string(),
        ]);
    }
    ctx.write_artifact(PER_PERMUTATION_FILE, "table", &per.finish())?;

    let labels = label_counts(&rows);
    let mut counts = TableWriter::new(&["any_cover_label", "count"]);
    for (label, n) in &labels {
        counts.push_row([label.to_string(), n.to_string()]);
    }
    ctx.write_artifact(COUNTS_FILE, "table", &counts.finish())?;

    ctx.write_artifact(CONFUSION_FILE, "table", &confusion_table(&rows))?;

    let covers = cover_counts(&rows);
    let mut adj = TableWriter::new(&["adjacency", "count_any_occurrence"]);
    for (cover, n) in &covers {
        adj.push_row([cover.to_string(), n.to_string()]);
    }
    ctx.write_artifact(ADJACENCY_FILE, "table", &adj.finish())?;

    let mut report = StageReport::new("Order-invariant classification", ctx.stage().as_str());
    report.metric("input", &input.origin).metric("permutations", rows.len());
    for (label, n) in &labels {
        report.metric(format!("count_{label}"), n);
    }
    if let Some((cover, n)) = covers.first() {
        report.metric("most_violated_cover", format!("{cover} ({n})"));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permutations::from_table;
    use crate::table::Table;

    fn rows() -> Vec<AnyCoverRow> {
        let t = Table::parse(
            "motif,perm\n\
             FEM,3 1 2 4 5 6 7 8 9 10 11 12\n\
             FEM,4 1 2 3 5 6 7 8 9 10 11 12\n\
             BRE,1 2 3 4 6 5 7 8 9 10 11 12\n\
             APD,1 2 3 4 5 6 7 8 9 11 10 12\n",
            "mem",
        )
        .unwrap();
        let input = from_table(&t, &PermColumns::default()).unwrap();
        compute_rows(&input.rows, &CoverSet::canonical())
    }

    #[test]
    fn labels_follow_violated_sets() {
        let r = rows();
        assert_eq!(r[0].label, MotifLabel::FrontEndMove);
        assert_eq!(r[1].label, MotifLabel::FrontEndMove);
        assert_eq!(r[2].label, MotifLabel::BlockReorderExtreme);
        assert_eq!(r[3].label, MotifLabel::AnchorPreservingDisorder);
    }

    #[test]
    fn counts_sort_by_frequency() {
        let r = rows();
        let labels = label_counts(&r);
        assert_eq!(labels[0], (MotifLabel::FrontEndMove, 2));
        assert_eq!(labels[1].0, MotifLabel::AnchorPreservingDisorder);

        let covers = cover_counts(&r);
        assert_eq!(covers.len(), 4);
        assert!(covers.contains(&(Cover::new(5, 6), 1)));
        assert_eq!(covers[0], (Cover::new(1, 3), 1));
    }

    #[test]
    fn confusion_cross_tabulates() {
        let text = confusion_table(&rows());
        let t = Table::parse(&text, "out").unwrap();
        assert_eq!(
            t.headers(),
            ["orig_motif", "AnchorPreservingDisorder", "BlockReorderExtreme", "FrontEndMove"]
        );
        let fem = t.rows().iter().find(|r| r.get(0) == "FEM").unwrap();
        assert_eq!(fem.get(3), "2");
        assert_eq!(fem.get(1), "0");
    }

    #[test]
    fn confusion_merges_label_spellings() {
        let mut r = rows();
        r[0].orig_motif = "frontendmove ".to_string();
        r[1].orig_motif = "FrontEndMove".to_string();
        let t = Table::parse(&confusion_table(&r), "out").unwrap();
        assert_eq!(t.len(), 3);
        let fem = t.rows().iter().find(|row| row.get(0) == "FrontEndMove").unwrap();
        assert_eq!(fem.get(3), "2");
        assert_eq!(normalize_orig_motif(" BRE "), "BRE");
        assert_eq!(normalize_orig_motif("other"), "Other");
    }
}
