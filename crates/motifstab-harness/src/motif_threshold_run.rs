//! `stability-by-motif` stage: how many rows of each motif fall below a
//! stability threshold in a merged sensitivity table.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::columns::{MOTIF_LABEL_NAMES, find_motif_label_column, resolve};
use crate::context::StageContext;
use crate::error::HarnessError;
use crate::report::StageReport;
use crate::table::{Table, TableWriter, format_f64, parse_f64};

pub const OUTPUT_FILE: &str = "stability_below_threshold_by_motif.csv";
pub const DEFAULT_STABILITY_COLUMN: &str = "stability_fraction";
pub const UNLABELED: &str = "UNLABELED";

#[derive(Debug, Clone)]
pub struct MotifThresholdConfig {
    pub input: PathBuf,
    pub motif_column: Option<String>,
    pub stability_column: Option<String>,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotifBelow {
    pub motif: String,
    pub total_rows: usize,
    pub count_below: usize,
    pub fraction_below: f64,
}

/// Result of [`summarize`], plus rows whose stability could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSummary {
    pub motif_column: String,
    pub rows: Vec<MotifBelow>,
    pub unreadable: Vec<usize>,
}

/// Group rows by motif; a missing or unparseable stability never counts as below.
pub fn summarize(table: &Table, config: &MotifThresholdConfig) -> Result<ThresholdSummary, HarnessError> {
    let headers = table.headers();
    let motif_col = resolve(headers, config.motif_column.as_deref(), find_motif_label_column).ok_or_else(|| {
        HarnessError::MissingColumn {
            origin: table.origin().to_string(),
            expected: config
                .motif_column
                .clone()
                .unwrap_or_else(|| MOTIF_LABEL_NAMES.join(" or ")),
        }
    })?;
    let stability_name = config.stability_column.as_deref().unwrap_or(DEFAULT_STABILITY_COLUMN);
    let stability_col = table.column(stability_name).ok_or_else(|| HarnessError::MissingColumn {
        origin: table.origin().to_string(),
        expected: stability_name.to_string(),
    })?;

    let mut groups: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut unreadable = Vec::new();
    for r in table.rows() {
        let motif = match r.get(motif_col).trim() {
            "" => UNLABELED,
            m => m,
        };
        let slot = groups.entry(motif.to_string()).or_insert((0, 0));
        slot.0 += 1;
        match parse_f64(r.get(stability_col)) {
            Some(v) if v < config.threshold => slot.1 += 1,
            Some(_) => {}
            None => unreadable.push(r.line),
        }
    }

    let mut rows: Vec<MotifBelow> = groups
        .into_iter()
        .map(|(motif, (total, below))| MotifBelow {
            motif,
            total_rows: total,
            count_below: below,
            fraction_below: below as f64 / total as f64,
        })
        .collect();
    rows.sort_by(|a, b| b.count_below.cmp(&a.count_below).then_with(|| a.motif.cmp(&b.motif)));

    Ok(ThresholdSummary {
        motif_column: headers[motif_col].clone(),
        rows,
        unreadable,
    })
}

#[must_use]
pub fn summary_table(rows: &[MotifBelow]) -> String {
    let mut w = TableWriter::new(&["motif", "total_rows", "count_below", "fraction_below"]);
    for r in rows {
        w.push_row([
            r.motif.clone(),
            r.total_rows.to_string(),
            r.count_below.to_string(),
            format_f64(r.fraction_below),
        ]);
    }
    w.finish()
}

pub fn run(config: &MotifThresholdConfig, ctx: &mut StageContext) -> Result<StageReport, HarnessError> {
    motifstab_core::config::check_unit_interval("stability threshold", config.threshold)?;
    if !config.input.exists() {
        return Err(HarnessError::MissingInput(config.input.clone()));
    }
    let table = Table::read(&config.input)?;
    let summary = summarize(&table, config)?;
    ctx.warn_overlong(table.origin(), &table.overlong_rows())?;
    for &line in &summary.unreadable {
        ctx.warn_row(
            "unreadable_stability",
            table.origin(),
            line,
            "stability value is missing or not a number; treated as not below",
        )?;
    }
    ctx.record_counts(table.len(), summary.unreadable.len());
    ctx.write_artifact(OUTPUT_FILE, "table", &summary_table(&summary.rows))?;

    let below: usize = summary.rows.iter().map(|r| r.count_below).sum();
    let mut report = StageReport::new("Stability below threshold by motif", ctx.stage().as_str());
    report
        .metric("input", table.origin())
        .metric("motif_column", &summary.motif_column)
        .metric("threshold", format_f64(config.threshold))
        .metric("rows", table.len())
        .metric("rows_below", below)
        .metric("motifs", summary.rows.len());
    if !summary.unreadable.is_empty() {
        report.note(format!(
            "{} row(s) had no readable stability value",
            summary.unreadable.len()
        ));
    }
    Ok(report)
}
